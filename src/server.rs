use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::backend::DemoBackend;
use crate::config::AppConfig;
use crate::events::{WidgetEvent, sse_event};
use crate::registry::WidgetRegistry;
use crate::relay::HttpRelay;
use crate::render;
use crate::widget::ChatWidget;

/// How often idle widgets are swept.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Build application state from configuration.
///
/// With the demo backend enabled the relay talks to this very server.
pub fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let mut relay_config = config.relay.clone();
    let demo = config.backend.enabled.then(|| {
        relay_config.base_url = format!("http://127.0.0.1:{}", config.server.port);
        DemoBackend::new(config.backend.fallback_answer.clone())
    });

    let relay = HttpRelay::new(&relay_config)?;
    info!(
        name: "relay.config.loaded",
        query_url = %relay.query_url(),
        response_url = %relay.response_url(),
        require_correlation = relay_config.require_correlation,
        "Relay configuration loaded"
    );

    Ok(AppState {
        widgets: WidgetRegistry::new(Arc::new(relay), config.widget.clone()),
        demo,
        config: Arc::new(config.clone()),
    })
}

/// Build the router: widget pages and API, plus the demo backend if enabled.
pub fn router(state: AppState) -> Router {
    let timeout_duration = if state.config.server.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60) // 1 year
    } else {
        Duration::from_secs(state.config.server.request_timeout_secs)
    };

    let mut app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/widgets/{id}", axum::routing::delete(api_close_widget))
        .route("/api/widgets/{id}/load", post(api_load))
        .route("/api/widgets/{id}/send", post(api_send))
        .route(
            "/api/widgets/{id}/cycles/{cycle}/cancel",
            post(api_cancel_cycle),
        )
        .route("/api/widgets/{id}/events", get(api_events))
        .route("/api/widgets/{id}/messages", get(api_get_messages))
        .with_state(state.clone());

    if let Some(demo) = &state.demo {
        app = app.merge(demo.router());
    }

    app.layer(axum::middleware::from_fn(
        move |req: Request, next: Next| {
            let duration = timeout_duration;
            async move {
                match tokio::time::timeout(duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            }
        },
    ))
    .layer(TraceLayer::new_for_http())
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let _sweeper = state.widgets.spawn_sweeper(SWEEP_PERIOD);

    if state.demo.is_some() {
        info!(name: "backend.demo.enabled", "Demo query service mounted on /query and /response");
    }

    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTML Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - One page load, one widget.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let widget = state.widgets.create();
    info!(name: "widget.created", widget_id = %widget.id(), "Widget created");

    let entries = widget.store().entries();
    let html: String = entries.iter().map(crate::store::Entry::html).collect();
    Html(render::page_shell(widget.id(), &html, entries.len()))
}

async fn health_handler() -> &'static str {
    "ok"
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn find_widget(state: &AppState, id: &str) -> Result<ChatWidget, StatusCode> {
    state.widgets.get(id).ok_or_else(|| {
        warn!(widget_id = %id, "Widget not found");
        StatusCode::NOT_FOUND
    })
}

/// Form body of the send action.
#[derive(Debug, Deserialize)]
struct SendForm {
    /// Raw input field value.
    #[serde(default)]
    message: String,
}

/// Response of the send action.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    /// Correlation id of the scheduled relay cycle.
    pub correlation_id: Uuid,
}

/// POST /api/widgets/:id/load - Page finished loading.
async fn api_load(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match find_widget(&state, &id) {
        Ok(widget) => {
            widget.on_load();
            StatusCode::NO_CONTENT
        }
        Err(status) => status,
    }
}

/// POST /api/widgets/:id/send - The send action.
async fn api_send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<SendForm>,
) -> Result<(StatusCode, Json<SendResponse>), StatusCode> {
    let widget = find_widget(&state, &id)?;

    tracing::info!(
        widget_id = %id,
        message_length = form.message.len(),
        "Received send action"
    );

    let cycle = widget.submit(form.message);
    Ok((
        StatusCode::ACCEPTED,
        Json(SendResponse {
            correlation_id: cycle.correlation_id,
        }),
    ))
}

/// POST /api/widgets/:id/cycles/:cycle/cancel - Cancel a pending relay cycle.
async fn api_cancel_cycle(
    State(state): State<AppState>,
    Path((id, cycle)): Path<(String, Uuid)>,
) -> StatusCode {
    match find_widget(&state, &id) {
        Ok(widget) if widget.cancel_cycle(cycle) => StatusCode::NO_CONTENT,
        Ok(_) => StatusCode::NOT_FOUND,
        Err(status) => status,
    }
}

/// DELETE /api/widgets/:id - Close a widget.
async fn api_close_widget(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    match state.widgets.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// Message DTO for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    pub index: usize,
    pub side: String,
    pub text: String,
    pub timestamp: String,
    pub appeared: bool,
}

/// GET /api/widgets/:id/messages - Snapshot of the message list.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageDto>>, StatusCode> {
    let widget = find_widget(&state, &id)?;
    let messages = widget
        .store()
        .entries()
        .into_iter()
        .map(|entry| MessageDto {
            index: entry.index,
            side: entry.message.side.to_string(),
            text: entry.message.text.to_string(),
            timestamp: entry.message.display_time(),
            appeared: entry.appeared,
        })
        .collect();
    Ok(Json(messages))
}

/// Query parameters for the event stream.
#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// First entry index the client does not have yet.
    #[serde(default)]
    after: usize,
}

/// GET /api/widgets/:id/events - SSE stream of widget events.
async fn api_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, StatusCode> {
    let widget = find_widget(&state, &id)?;
    let (replay, mut rx) = widget.store().subscribe_from(query.after);

    tracing::info!(
        widget_id = %id,
        after = query.after,
        replayed = replay.len(),
        "Starting SSE stream"
    );

    let sse_stream = async_stream::stream! {
        for entry in replay {
            let appended = WidgetEvent::EntryAppended {
                index: entry.index,
                side: entry.message.side,
                html: entry.html(),
            };
            yield Ok::<String, Infallible>(sse_event(&appended));
        }

        loop {
            match rx.recv().await {
                Ok(event) => yield Ok::<String, Infallible>(sse_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(widget_id = %id, skipped = skipped, "SSE subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    let body = axum::body::Body::from_stream(sse_stream);
    Ok(build_sse_response(body))
}

fn build_sse_response(body: axum::body::Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}

//! Demo query service.
//!
//! A small stand-in for the remote query service: `POST /query` records an
//! answer, `GET /response` hands it back. Canned questions get canned
//! answers; everything else gets the configured fallback.
//!
//! Answers are kept per correlation id, and the most recent one is also kept
//! for clients that fetch without a correlation id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;
use uuid::Uuid;

use crate::relay::{CORRELATION_HEADER, Query};

/// Answer for questions the demo service has no canned reply for.
pub const DEFAULT_FALLBACK_ANSWER: &str = "I don't know how to answer that yet.";

/// Answered queries.
#[derive(Debug, Clone)]
pub struct DemoBackend {
    inner: Arc<DemoBackendInner>,
}

#[derive(Debug)]
struct DemoBackendInner {
    fallback: String,
    answers: RwLock<HashMap<Uuid, String>>,
    latest: RwLock<Option<String>>,
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_ANSWER)
    }
}

impl DemoBackend {
    #[must_use]
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DemoBackendInner {
                fallback: fallback.into(),
                answers: RwLock::new(HashMap::new()),
                latest: RwLock::new(None),
            }),
        }
    }

    /// Answer a query and remember the answer.
    pub fn record(&self, query: &Query) -> String {
        let answer = canned_answer(&normalize_query(&query.data))
            .map_or_else(|| self.inner.fallback.clone(), str::to_string);

        if let Some(id) = query.correlation_id {
            self.inner
                .answers
                .write()
                .unwrap()
                .insert(id, answer.clone());
        }
        *self.inner.latest.write().unwrap() = Some(answer.clone());
        answer
    }

    /// Take the answer for a correlation id, or read the latest answer
    /// without one. An answer is handed out once per correlation id.
    pub fn take_answer(&self, correlation_id: Option<Uuid>) -> Option<String> {
        match correlation_id {
            Some(id) => self.inner.answers.write().unwrap().remove(&id),
            None => self.inner.latest.read().unwrap().clone(),
        }
    }

    /// Routes for `POST /query` and `GET /response`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/query", post(submit_query))
            .route("/response", get(latest_response))
            .with_state(self.clone())
    }
}

/// Simplify user input before matching: trim, lowercase, drop one trailing
/// `.`, `!` or `?`.
pub fn normalize_query(raw: &str) -> String {
    let mut query = raw.trim().to_lowercase();
    if query.ends_with(['.', '!', '?']) {
        query.pop();
    }
    query
}

/// Canned reply for a normalized query.
pub fn canned_answer(query: &str) -> Option<&'static str> {
    match query {
        "hi!" | "hi" | "hello" | "hello!" | "hello there" => Some("Hello, welcome!"),
        "tell me about yourself" => Some(
            "I am an AI Chatbot interface that is here to help answer questions related to the FireSat (Fire Satellite) mission design. Feel free to ask below!",
        ),
        "what dataset do you interact with" => Some("I interface with the FireSat dataset."),
        _ => None,
    }
}

/// POST /query - Record the answer to a query.
async fn submit_query(State(backend): State<DemoBackend>, Json(query): Json<Query>) -> StatusCode {
    let answer = backend.record(&query);
    info!(
        name: "backend.query.answered",
        correlation_id = ?query.correlation_id,
        answer_length = answer.len(),
        "Query answered"
    );
    StatusCode::NO_CONTENT
}

/// GET /response - Return the answer for the requested cycle as plain text.
async fn latest_response(State(backend): State<DemoBackend>, headers: HeaderMap) -> Response {
    let requested = headers.get(CORRELATION_HEADER).cloned();
    let correlation_id = match requested.as_ref().map(|v| v.to_str().map(str::parse::<Uuid>)) {
        None => None,
        Some(Ok(Ok(id))) => Some(id),
        Some(_) => return (StatusCode::BAD_REQUEST, "invalid correlation id").into_response(),
    };

    let Some(answer) = backend.take_answer(correlation_id) else {
        return (StatusCode::NOT_FOUND, "no response available").into_response();
    };

    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        answer,
    )
        .into_response();
    if let Some(id) = requested {
        response.headers_mut().insert(CORRELATION_HEADER, id);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Hello There!  "), "hello there");
        assert_eq!(normalize_query("What?"), "what");
        assert_eq!(normalize_query("why??"), "why?");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_canned_answers() {
        assert_eq!(canned_answer("hi"), Some("Hello, welcome!"));
        assert_eq!(canned_answer("hello there"), Some("Hello, welcome!"));
        assert!(canned_answer("tell me about yourself").is_some());
        assert_eq!(
            canned_answer("what dataset do you interact with"),
            Some("I interface with the FireSat dataset.")
        );
        assert_eq!(canned_answer("what is the orbit altitude"), None);
    }

    #[test]
    fn test_answers_are_taken_once_per_cycle() {
        let backend = DemoBackend::new("fallback");
        let first = Query::new("Hello!");
        let second = Query::new("something else");

        assert_eq!(backend.record(&first), "Hello, welcome!");
        assert_eq!(backend.record(&second), "fallback");

        assert_eq!(
            backend.take_answer(first.correlation_id).as_deref(),
            Some("Hello, welcome!")
        );
        assert_eq!(backend.take_answer(first.correlation_id), None);
        assert_eq!(
            backend.take_answer(second.correlation_id).as_deref(),
            Some("fallback")
        );
        assert!(backend.inner.answers.read().unwrap().is_empty());

        // The latest answer stays readable for fetches without an id.
        assert_eq!(backend.take_answer(None).as_deref(), Some("fallback"));
        assert_eq!(backend.take_answer(None).as_deref(), Some("fallback"));
        assert_eq!(backend.take_answer(Some(Uuid::new_v4())), None);
    }
}

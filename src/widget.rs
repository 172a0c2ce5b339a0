//! The chat widget.
//!
//! A [`ChatWidget`] is the view-model of one page load. It owns the message
//! list, the input field value and the scheduler for its deferred work, and
//! talks to the remote query service through a [`QueryBackend`].
//!
//! # Flow
//!
//! 1. [`ChatWidget::send`] renders the input as a user message and clears
//!    the input field right away.
//! 2. After the send delay, a relay cycle submits the raw text and then
//!    fetches the answer.
//! 3. The answer is rendered as a bot message. Failures are logged and
//!    otherwise ignored.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::WidgetConfig;
use crate::events::WidgetEvent;
use crate::message::Message;
use crate::relay::{self, CycleError, Query, QueryBackend};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::store::MessageStore;

/// One widget instance.
#[derive(Clone)]
pub struct ChatWidget {
    inner: Arc<WidgetInner>,
}

struct WidgetInner {
    id: String,
    store: MessageStore,
    scheduler: Scheduler,
    backend: Arc<dyn QueryBackend>,
    config: WidgetConfig,
    input: RwLock<String>,
    pending: Mutex<HashMap<Uuid, CancellationToken>>,
    last_activity: RwLock<Instant>,
}

impl fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatWidget")
            .field("id", &self.inner.id)
            .field("messages", &self.inner.store.len())
            .field("pending_cycles", &self.pending_cycles())
            .finish()
    }
}

/// A relay cycle waiting for its send delay or in flight.
#[derive(Debug)]
pub struct PendingCycle {
    pub correlation_id: Uuid,
    widget: ChatWidget,
    handle: TaskHandle,
}

impl PendingCycle {
    /// Cancel the cycle and drop it from the widget's pending set.
    pub fn cancel(&self) {
        self.widget.cancel_cycle(self.correlation_id);
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Wait for the cycle to end. `false` if it was cancelled.
    ///
    /// A cycle that failed still counts as finished.
    pub async fn finished(self) -> bool {
        self.handle.finished().await
    }
}

impl ChatWidget {
    /// Create a widget with a fresh id.
    pub fn new(backend: Arc<dyn QueryBackend>, config: WidgetConfig) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), backend, config)
    }

    pub fn with_id(
        id: impl Into<String>,
        backend: Arc<dyn QueryBackend>,
        config: WidgetConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WidgetInner {
                id: id.into(),
                store: MessageStore::new(),
                scheduler: Scheduler::new(),
                backend,
                config,
                input: RwLock::new(String::new()),
                pending: Mutex::new(HashMap::new()),
                last_activity: RwLock::new(Instant::now()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The message list.
    #[must_use]
    pub fn store(&self) -> &MessageStore {
        &self.inner.store
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────

    /// Append a message to the list and scroll to the bottom.
    ///
    /// The entrance transition is released on the next scheduling tick.
    /// Must be called from within a tokio runtime.
    pub fn render(&self, message: Message) -> usize {
        let side = message.side;
        let index = self.inner.store.append(message);

        let store = self.inner.store.clone();
        // Detached: the tick only flips the entry's state.
        let _tick = self.inner.scheduler.defer(async move {
            store.mark_appeared(index);
        });

        self.inner.store.notify(WidgetEvent::ScrollToBottom {
            duration_ms: self.inner.config.scroll_duration_ms,
        });
        self.touch();

        debug!(
            name: "widget.message.rendered",
            widget_id = %self.inner.id,
            index = index,
            side = %side,
            "Message rendered"
        );
        index
    }

    /// Render user input. Newline sequences become line breaks.
    pub fn show_user_message(&self, raw: &str) -> usize {
        self.render(Message::user(raw))
    }

    /// Render a bot message verbatim.
    pub fn show_bot_message(&self, text: impl Into<String>) -> usize {
        self.render(Message::bot(text))
    }

    /// Page-load lifecycle hook: render the greeting.
    ///
    /// Each call appends another greeting.
    pub fn on_load(&self) -> usize {
        info!(name: "widget.loaded", widget_id = %self.inner.id, "Widget loaded");
        self.show_bot_message(self.inner.config.greeting.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────────────

    /// Current value of the input field.
    #[must_use]
    pub fn input(&self) -> String {
        self.inner.input.read().unwrap().clone()
    }

    /// Replace the value of the input field (the user typing).
    pub fn set_input(&self, value: impl Into<String>) {
        *self.inner.input.write().unwrap() = value.into();
        self.touch();
    }

    fn clear_input(&self) {
        self.inner.input.write().unwrap().clear();
        self.inner.store.notify(WidgetEvent::InputCleared);
    }

    /// The send action.
    ///
    /// Renders the input verbatim as a user message, clears the input field,
    /// and schedules a relay cycle for the raw text after the send delay.
    /// Earlier cycles are left alone; rapid sends overlap.
    pub fn send(&self) -> PendingCycle {
        let raw = self.input();
        self.show_user_message(&raw);
        self.clear_input();
        self.schedule_cycle(raw, self.inner.config.send_delay())
    }

    /// Set the input and send it.
    pub fn submit(&self, value: impl Into<String>) -> PendingCycle {
        self.set_input(value);
        self.send()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Relay cycles
    // ─────────────────────────────────────────────────────────────────────

    fn schedule_cycle(&self, raw: String, delay: Duration) -> PendingCycle {
        let correlation_id = Uuid::new_v4();
        let query = Query {
            data: raw,
            correlation_id: Some(correlation_id),
        };

        // Registered before the task can run, so it cannot forget itself first.
        let mut pending = self.inner.pending.lock().unwrap();
        let widget = self.clone();
        let handle = self.inner.scheduler.schedule(delay, async move {
            widget.relay(query).await;
            widget.forget_cycle(correlation_id);
        });
        pending.insert(correlation_id, handle.token());
        drop(pending);

        PendingCycle {
            correlation_id,
            widget: self.clone(),
            handle,
        }
    }

    /// One relay cycle. Never fails: errors end up in the log only.
    async fn relay(&self, query: Query) {
        let correlation_id = query.correlation_id;
        debug!(
            name: "relay.cycle.started",
            widget_id = %self.inner.id,
            correlation_id = ?correlation_id,
            "Relay cycle started"
        );

        match relay::run_cycle(self.inner.backend.as_ref(), &query).await {
            Ok(answer) => {
                info!(
                    name: "relay.cycle.completed",
                    widget_id = %self.inner.id,
                    correlation_id = ?correlation_id,
                    answer_length = answer.len(),
                    "Relay cycle completed"
                );
                self.show_bot_message(answer);
            }
            Err(err) => {
                let stage = match &err {
                    CycleError::Query(_) => "query",
                    CycleError::Response(_) => "response",
                };
                error!(
                    name: "relay.cycle.failed",
                    widget_id = %self.inner.id,
                    correlation_id = ?correlation_id,
                    stage = stage,
                    "{err}"
                );
            }
        }
    }

    fn forget_cycle(&self, correlation_id: Uuid) {
        self.inner.pending.lock().unwrap().remove(&correlation_id);
    }

    /// Cancel one pending cycle. Returns `false` if it is unknown or over.
    pub fn cancel_cycle(&self, correlation_id: Uuid) -> bool {
        let token = self.inner.pending.lock().unwrap().remove(&correlation_id);
        token.is_some_and(|token| {
            token.cancel();
            info!(
                name: "relay.cycle.cancelled",
                widget_id = %self.inner.id,
                correlation_id = %correlation_id,
                "Relay cycle cancelled"
            );
            true
        })
    }

    /// Number of cycles not yet over.
    #[must_use]
    pub fn pending_cycles(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Tear the widget down: every pending tick and cycle is cancelled.
    pub fn close(&self) {
        self.inner.scheduler.shutdown();
        self.inner.pending.lock().unwrap().clear();
        info!(name: "widget.closed", widget_id = %self.inner.id, "Widget closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.scheduler.is_shutdown()
    }

    fn touch(&self) {
        *self.inner.last_activity.write().unwrap() = Instant::now();
    }

    /// Whether the widget has been idle longer than `timeout`.
    #[must_use]
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.inner.last_activity.read().unwrap().elapsed() > timeout
    }
}

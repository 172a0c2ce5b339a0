//! Live widget instances, one per page load.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::WidgetConfig;
use crate::relay::QueryBackend;
use crate::widget::ChatWidget;

/// Thread-safe store for widgets.
///
/// Provides methods for creating, retrieving, and cleaning up widgets.
#[derive(Clone)]
pub struct WidgetRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    widgets: RwLock<HashMap<String, ChatWidget>>,
    backend: Arc<dyn QueryBackend>,
    config: WidgetConfig,
}

impl std::fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetRegistry")
            .field("widgets", &self.len())
            .finish_non_exhaustive()
    }
}

impl WidgetRegistry {
    /// Create a registry whose widgets share `backend` and `config`.
    #[must_use]
    pub fn new(backend: Arc<dyn QueryBackend>, config: WidgetConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                widgets: RwLock::new(HashMap::new()),
                backend,
                config,
            }),
        }
    }

    /// Create a new widget and return it.
    #[must_use]
    pub fn create(&self) -> ChatWidget {
        let widget = ChatWidget::new(
            Arc::clone(&self.inner.backend),
            self.inner.config.clone(),
        );
        let mut guard = self.inner.widgets.write().unwrap();
        guard.insert(widget.id().to_string(), widget.clone());
        widget
    }

    /// Get a widget by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ChatWidget> {
        let guard = self.inner.widgets.read().unwrap();
        guard.get(id).cloned()
    }

    /// Remove a widget by ID and cancel its pending work.
    pub fn remove(&self, id: &str) -> Option<ChatWidget> {
        let removed = self.inner.widgets.write().unwrap().remove(id);
        if let Some(widget) = &removed {
            widget.close();
        }
        removed
    }

    /// Get the number of live widgets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.widgets.read().unwrap().len()
    }

    /// Check if there are no widgets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and drop widgets that have been idle longer than the timeout.
    ///
    /// Returns the number of widgets removed.
    pub fn cleanup_idle(&self, timeout: Duration) -> usize {
        let mut guard = self.inner.widgets.write().unwrap();
        let before = guard.len();
        guard.retain(|_, widget| {
            let idle = widget.is_idle(timeout) && widget.pending_cycles() == 0;
            if idle {
                widget.close();
            }
            !idle
        });
        before - guard.len()
    }

    /// Spawn a task sweeping idle widgets every `period`.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        let timeout = self.inner.config.idle_timeout();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let removed = registry.cleanup_idle(timeout);
                if removed > 0 {
                    info!(name: "registry.sweep", removed = removed, "Idle widgets removed");
                }
            }
        })
    }
}

//! The widget's message list.
//!
//! [`MessageStore`] is the view-model behind one widget: an append-only list
//! of entries plus the subscribers that render them. Every change is
//! published as a [`WidgetEvent`], both to registered render callbacks and to
//! a broadcast feed that the SSE endpoint drains.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::events::WidgetEvent;
use crate::message::Message;
use crate::render;

/// Capacity of the broadcast feed before slow receivers start lagging.
const EVENT_CAPACITY: usize = 256;

/// Callback invoked for every published event.
pub type RenderSubscriber = Box<dyn Fn(&WidgetEvent) + Send + Sync>;

/// One rendered line of the list.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub index: usize,
    pub message: Message,
    /// Whether the entrance transition has been released.
    pub appeared: bool,
}

impl Entry {
    pub fn html(&self) -> String {
        render::render_entry(self.index, &self.message, self.appeared)
    }
}

/// Append-only, shareable message list.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    entries: RwLock<Vec<Entry>>,
    subscribers: RwLock<Vec<RenderSubscriber>>,
    events: broadcast::Sender<WidgetEvent>,
}

impl fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStore")
            .field("len", &self.len())
            .field("subscribers", &self.inner.subscribers.read().unwrap().len())
            .finish()
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(Vec::new()),
                subscribers: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// Append a message to the end of the list and return its index.
    ///
    /// The `entry.appended` event is published before the list lock is
    /// released, so subscribers always observe entries in list order.
    /// Subscribers must not call back into the store.
    pub fn append(&self, message: Message) -> usize {
        let mut guard = self.inner.entries.write().unwrap();
        let index = guard.len();
        let entry = Entry {
            index,
            message,
            appeared: false,
        };
        let event = WidgetEvent::EntryAppended {
            index,
            side: entry.message.side,
            html: entry.html(),
        };
        guard.push(entry);
        self.publish(&event);
        index
    }

    /// Release the entrance transition of an entry.
    ///
    /// Returns `false` if the entry does not exist or had already appeared.
    pub fn mark_appeared(&self, index: usize) -> bool {
        let mut guard = self.inner.entries.write().unwrap();
        match guard.get_mut(index) {
            Some(entry) if !entry.appeared => {
                entry.appeared = true;
                self.publish(&WidgetEvent::EntryAppeared { index });
                true
            }
            _ => false,
        }
    }

    /// Publish an event that does not change the list itself.
    pub fn notify(&self, event: WidgetEvent) {
        let _guard = self.inner.entries.read().unwrap();
        self.publish(&event);
    }

    fn publish(&self, event: &WidgetEvent) {
        for subscriber in self.inner.subscribers.read().unwrap().iter() {
            subscriber(event);
        }
        // No receivers is fine: nobody is watching this widget right now.
        let _ = self.inner.events.send(event.clone());
    }

    /// Register a render callback.
    pub fn on_render<F>(&self, subscriber: F)
    where
        F: Fn(&WidgetEvent) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .write()
            .unwrap()
            .push(Box::new(subscriber));
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot of entries with `index >= after`, plus a receiver for
    /// everything published afterwards. No event falls between the two.
    pub fn subscribe_from(&self, after: usize) -> (Vec<Entry>, broadcast::Receiver<WidgetEvent>) {
        let guard = self.inner.entries.read().unwrap();
        let rx = self.inner.events.subscribe();
        let replay = guard.iter().skip(after).cloned().collect();
        (replay, rx)
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.entries.read().unwrap().clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Entry> {
        self.inner.entries.read().unwrap().get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! In-process notification bus.
//!
//! Listeners subscribe per [`EventType`]. Events arrive either through a
//! direct [`EventBus::dispatch`] or through the channel returned by
//! [`EventBus::bridge`], which lets any task publish without a handle to the
//! bus itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Error,
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEvent {
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    /// Display time in milliseconds.
    pub timeout: Option<u64>,
}

impl GlobalEvent {
    pub fn new(event_type: EventType, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            event_type,
            timeout: None,
        }
    }
}

pub type EventListener = Arc<dyn Fn(&GlobalEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Listeners {
    by_type: Mutex<HashMap<EventType, Vec<(SubscriptionId, EventListener)>>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        event_type: EventType,
        listener: impl Fn(&GlobalEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.listeners.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .by_type
            .lock()
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> bool {
        let mut by_type = self.listeners.by_type.lock();
        let Some(listeners) = by_type.get_mut(&event_type) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Call every listener of `event_type`, in subscription order.
    pub fn dispatch(&self, event_type: EventType, payload: &GlobalEvent) {
        let listeners: Vec<EventListener> = self
            .listeners
            .by_type
            .lock()
            .get(&event_type)
            .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(payload);
        }
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners
            .by_type
            .lock()
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    pub fn send_event(&self, event: &GlobalEvent) {
        self.dispatch(event.event_type, event);
    }

    /// Sender whose events are dispatched on this bus by a background task.
    /// The task stops once every sender is dropped.
    pub fn bridge(&self) -> mpsc::UnboundedSender<GlobalEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<GlobalEvent>();
        let bus = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                bus.send_event(&event);
            }
            debug!("Event bridge closed");
        });
        tx
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<EventType, usize> = self
            .listeners
            .by_type
            .lock()
            .iter()
            .map(|(event_type, listeners)| (*event_type, listeners.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

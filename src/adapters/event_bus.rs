use crate::domain::events::EventName;
use crate::lifecycle::Lifecycle;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

type HandlerTable = HashMap<EventName, Vec<(u64, EventHandler)>>;

/// In-process publish/subscribe over [`EventName`]s.
///
/// Delivery is synchronous and in subscription order. Handlers are called on
/// a snapshot taken at publish time, so they may subscribe or dispose without
/// deadlocking; a handler attached during a publish first sees the next one.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HandlerTable>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a bus whose handlers are cleared when `lifecycle` shuts down.
    pub fn with_lifecycle(lifecycle: &Lifecycle) -> Arc<Self> {
        let bus = Self::new();
        let weak = Arc::downgrade(&bus);
        lifecycle.on_shutdown("event bus", move || {
            if let Some(bus) = weak.upgrade() {
                bus.clear();
            }
        });
        bus
    }

    pub fn subscribe<F>(self: &Arc<Self>, event: EventName, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table().entry(event).or_default().push((id, Arc::new(handler)));
        debug!("Subscribed handler {} to {}", id, event);
        Subscription {
            bus: Arc::downgrade(self),
            event,
            id,
        }
    }

    /// Deliver `payload` to every handler attached to `event`.
    ///
    /// Handler panics propagate to the publisher.
    pub fn publish(&self, event: EventName, payload: &Value) {
        let snapshot: Vec<EventHandler> = self
            .table()
            .get(&event)
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in snapshot {
            handler(payload);
        }
    }

    /// Detach every handler.
    pub fn clear(&self) {
        self.table().clear();
    }

    pub fn handler_count(&self, event: EventName) -> usize {
        self.table().get(&event).map_or(0, Vec::len)
    }

    fn detach(&self, event: EventName, id: u64) {
        let mut table = self.table();
        if let Some(handlers) = table.get_mut(&event) {
            handlers.retain(|(existing, _)| *existing != id);
            if handlers.is_empty() {
                table.remove(&event);
            }
        }
    }

    fn table(&self) -> MutexGuard<'_, HandlerTable> {
        // Handlers never run under the lock, so a poisoned table is intact.
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to one attached handler.
#[must_use = "dropping a Subscription keeps the handler attached; call dispose() to detach"]
pub struct Subscription {
    bus: Weak<EventBus>,
    event: EventName,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> EventName {
        self.event
    }

    /// Detach the handler. A no-op if the bus is gone or was cleared.
    pub fn dispose(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(self.event, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}

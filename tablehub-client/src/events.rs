//! Handler registries for server push events and lifecycle callbacks
//!
//! Server push events are invocations without an id. The connection's
//! receive loop hands each one to [`EventRegistry::dispatch`], which calls
//! every handler registered for the target, in registration order. Several
//! handlers per event are the normal case: each subscriber registers its
//! own, and each receives every occurrence.
//!
//! Event names match case-insensitively, the way hub servers treat method
//! names.
//!
//! # Locking
//!
//! The registries use a synchronous mutex so that handlers can be removed
//! from `Drop` implementations. Handlers are cloned out of the lock before
//! they run, so a handler may register or remove handlers itself.

use crate::hub::{
    CloseCallback, EventHandler, HandlerId, ReconnectedCallback, ReconnectingCallback,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tablehub_core::Error;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of server push event handlers
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event
    pub fn register(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers)
            .entry(event.to_lowercase())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove one handler
    pub fn unregister(&self, event: &str, id: HandlerId) -> bool {
        let key = event.to_lowercase();
        let mut handlers = lock(&self.handlers);

        let Some(list) = handlers.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(&key);
        }
        removed
    }

    /// Call every handler of `event`; returns how many ran
    pub fn dispatch(&self, event: &str, args: &[Value]) -> usize {
        let snapshot: Vec<EventHandler> = match lock(&self.handlers).get(&event.to_lowercase()) {
            Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
            None => Vec::new(),
        };

        if snapshot.is_empty() {
            tracing::debug!(event, "No handler registered for event");
        }

        for handler in &snapshot {
            handler(args);
        }
        snapshot.len()
    }

    /// Number of handlers registered for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.handlers)
            .get(&event.to_lowercase())
            .map_or(0, Vec::len)
    }

    /// Lower-cased names of all events with at least one handler
    pub fn events(&self) -> Vec<String> {
        lock(&self.handlers).keys().cloned().collect()
    }
}

/// Registered close/reconnecting/reconnected callbacks
#[derive(Default)]
pub struct LifecycleCallbacks {
    close: Mutex<Vec<CloseCallback>>,
    reconnecting: Mutex<Vec<ReconnectingCallback>>,
    reconnected: Mutex<Vec<ReconnectedCallback>>,
}

impl LifecycleCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_close(&self, callback: CloseCallback) {
        lock(&self.close).push(callback);
    }

    pub fn add_reconnecting(&self, callback: ReconnectingCallback) {
        lock(&self.reconnecting).push(callback);
    }

    pub fn add_reconnected(&self, callback: ReconnectedCallback) {
        lock(&self.reconnected).push(callback);
    }

    pub fn fire_close(&self, error: Option<Error>) {
        let callbacks = lock(&self.close).clone();
        for callback in callbacks {
            callback(error.clone());
        }
    }

    pub fn fire_reconnecting(&self, error: Option<Error>) {
        let callbacks = lock(&self.reconnecting).clone();
        for callback in callbacks {
            callback(error.clone());
        }
    }

    pub fn fire_reconnected(&self, connection_id: Option<String>) {
        let callbacks = lock(&self.reconnected).clone();
        for callback in callbacks {
            callback(connection_id.clone());
        }
    }
}

//! Event subscription facade
//!
//! An [`EventSubscription`] keeps one handler registered for a server push
//! event on whatever connection the manager currently holds. It registers
//! while the manager reports the connection as connected, moves to the new
//! connection when the manager replaces it, and removes its handler when the
//! connection goes away or the subscription is dropped.
//!
//! Every subscription registers its own handler, so several subscriptions
//! to the same event each receive every occurrence.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{EventSubscription, ManagerHandle};
//! use std::sync::Arc;
//!
//! # async fn example(manager: ManagerHandle) -> tablehub_core::Result<()> {
//! let mut updates = EventSubscription::with_handler(
//!     &manager,
//!     "ReceiveNotification",
//!     Arc::new(|args: &[serde_json::Value]| println!("notification: {:?}", args)),
//! )?;
//!
//! updates.changed().await?;
//! let message: Option<String> = updates.argument(0)?;
//! # Ok(())
//! # }
//! ```

use crate::hub::{EventHandler, HandlerId, Hub};
use crate::manager::{read_context, ConnectionContext, ManagerHandle};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tablehub_core::{Error, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Registration {
    connection: Arc<dyn Hub>,
    generation: u64,
    id: HandlerId,
}

#[derive(Default)]
struct SlotState {
    registration: Option<Registration>,
    /// Set when the subscription is dropped; nothing registers afterwards
    closed: bool,
}

type Slot = Arc<Mutex<SlotState>>;

fn lock(slot: &Slot) -> MutexGuard<'_, SlotState> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A handler registration that follows the manager's connection
pub struct EventSubscription {
    event: String,
    data: watch::Receiver<Vec<Value>>,
    context: watch::Receiver<ConnectionContext>,
    registration: Slot,
    task: JoinHandle<()>,
}

impl EventSubscription {
    /// Subscribe to `event`, keeping only the latest arguments
    ///
    /// # Errors
    ///
    /// `Error::OutsideScope` if the manager has shut down.
    pub fn new(manager: &ManagerHandle, event: impl Into<String>) -> Result<Self> {
        Self::subscribe(manager, event.into(), None)
    }

    /// Subscribe to `event` and call `handler` with every occurrence
    pub fn with_handler(
        manager: &ManagerHandle,
        event: impl Into<String>,
        handler: EventHandler,
    ) -> Result<Self> {
        Self::subscribe(manager, event.into(), Some(handler))
    }

    fn subscribe(
        manager: &ManagerHandle,
        event: String,
        handler: Option<EventHandler>,
    ) -> Result<Self> {
        let mut context = manager.subscribe();
        read_context(&context)?;

        let (data_tx, data) = watch::channel(Vec::new());
        let callback: EventHandler = Arc::new(move |args: &[Value]| {
            data_tx.send_replace(args.to_vec());
            if let Some(handler) = &handler {
                handler(args);
            }
        });

        let registration: Slot = Arc::new(Mutex::new(SlotState::default()));
        let current = context.borrow_and_update().clone();
        sync(&registration, &event, &callback, &current);

        let task = tokio::spawn({
            let mut context = context.clone();
            let registration = Arc::clone(&registration);
            let event = event.clone();
            async move {
                while context.changed().await.is_ok() {
                    let current = context.borrow_and_update().clone();
                    sync(&registration, &event, &callback, &current);
                }
                detach(&registration, &event);
            }
        });

        Ok(Self {
            event,
            data,
            context,
            registration,
            task,
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Arguments of the latest occurrence; empty before the first one
    pub fn data(&self) -> Vec<Value> {
        self.data.borrow().clone()
    }

    /// The latest arguments deserialized as one value, typically a tuple
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let data = Value::Array(self.data());
        Ok(serde_json::from_value(data)?)
    }

    /// One argument of the latest occurrence; `None` if it was not sent
    pub fn argument<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        let value = self.data.borrow().get(index).cloned();
        value
            .map(|value| serde_json::from_value(value).map_err(Error::from))
            .transpose()
    }

    /// Wait for the next occurrence
    ///
    /// # Errors
    ///
    /// `Error::OutsideScope` once the manager has shut down and the handler
    /// was removed.
    pub async fn changed(&mut self) -> Result<()> {
        self.data.changed().await.map_err(|_| Error::OutsideScope)
    }

    /// The manager's current connection
    pub fn connection(&self) -> Option<Arc<dyn Hub>> {
        self.context.borrow().connection.clone()
    }

    /// Whether the handler is currently registered on a connection
    pub fn is_active(&self) -> bool {
        lock(&self.registration).registration.is_some()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.task.abort();
        close(&self.registration, &self.event);
    }
}

/// Bring the registration in line with `context`
fn sync(registration: &Slot, event: &str, callback: &EventHandler, context: &ConnectionContext) {
    let target = context
        .connection
        .as_ref()
        .filter(|_| context.is_connected());

    let mut slot = lock(registration);
    if slot.closed {
        return;
    }
    if let (Some(current), Some(_)) = (slot.registration.as_ref(), target) {
        if current.generation == context.generation {
            return;
        }
    }

    if let Some(previous) = slot.registration.take() {
        previous.connection.off(event, previous.id);
        tracing::debug!(event, generation = previous.generation, "Event handler removed");
    }

    if let Some(connection) = target {
        let id = connection.on(event, Arc::clone(callback));
        tracing::debug!(event, generation = context.generation, "Event handler registered");
        slot.registration = Some(Registration {
            connection: Arc::clone(connection),
            generation: context.generation,
            id,
        });
    }
}

fn detach(registration: &Slot, event: &str) {
    if let Some(previous) = lock(registration).registration.take() {
        previous.connection.off(event, previous.id);
    }
}

/// Detach for good; the watcher task may still be inside `sync`
fn close(registration: &Slot, event: &str) {
    let mut slot = lock(registration);
    slot.closed = true;
    if let Some(previous) = slot.registration.take() {
        previous.connection.off(event, previous.id);
    }
}

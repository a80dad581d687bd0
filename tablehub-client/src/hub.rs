//! The hub connection seam
//!
//! [`Hub`] is the interface the connection manager and both facades depend
//! on. The WebSocket implementation is [`crate::HubConnection`]; tests drive
//! the manager with in-memory fakes through the same trait.
//!
//! # Callbacks
//!
//! Event handlers and lifecycle callbacks are plain synchronous closures.
//! They run on the connection's receive task and must not block; anything
//! longer belongs in a task spawned by the callback or behind a channel.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{Hub, HubConnectionBuilder};
//! use std::sync::Arc;
//!
//! # async fn example() -> tablehub_core::Result<()> {
//! let hub = HubConnectionBuilder::new("https://pos.example.com/hub/ws-order-table-area")
//!     .access_token_factory(|| "token".to_string())
//!     .with_automatic_reconnect()
//!     .build();
//!
//! let id = hub.on("TableUpdated", Arc::new(|args: &[serde_json::Value]| println!("tables: {:?}", args)));
//! hub.start().await?;
//! hub.invoke("JoinArea", vec![3.into()]).await?;
//! hub.off("TableUpdated", id);
//! # Ok(())
//! # }
//! ```

use crate::connection_state::HubConnectionState;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tablehub_core::{Error, Result};

/// Handler for a server push event, called with the event's arguments
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Called once the connection has closed for good, with the cause if any
pub type CloseCallback = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// Called when a lost connection starts reconnecting
pub type ReconnectingCallback = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// Called after a successful reconnect, with the new connection id if known
pub type ReconnectedCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Supplies the bearer token; invoked on every connect and reconnect attempt
pub type AccessTokenFactory = Arc<dyn Fn() -> String + Send + Sync>;

/// Identifies one registered event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// A hub connection
#[async_trait]
pub trait Hub: Send + Sync {
    /// Current native state
    fn state(&self) -> HubConnectionState;

    /// Open the connection
    ///
    /// Only valid from `Disconnected`.
    async fn start(&self) -> Result<()>;

    /// Close the connection; a no-op when already disconnected
    async fn stop(&self) -> Result<()>;

    /// Call a remote method and wait for its completion
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Call a remote method without waiting for a result
    async fn send(&self, method: &str, args: Vec<Value>) -> Result<()>;

    /// Register a handler for a server push event
    fn on(&self, event: &str, handler: EventHandler) -> HandlerId;

    /// Remove one handler; returns whether it was registered
    fn off(&self, event: &str, id: HandlerId) -> bool;

    fn on_close(&self, callback: CloseCallback);

    fn on_reconnecting(&self, callback: ReconnectingCallback);

    fn on_reconnected(&self, callback: ReconnectedCallback);
}

/// Builds connections for the connection manager
///
/// The factory owns the endpoint and transport options; the manager only
/// supplies the token source for each new connection.
pub trait HubFactory: Send + Sync {
    fn build(&self, access_token_factory: AccessTokenFactory) -> Arc<dyn Hub>;
}

impl<F> HubFactory for F
where
    F: Fn(AccessTokenFactory) -> Arc<dyn Hub> + Send + Sync,
{
    fn build(&self, access_token_factory: AccessTokenFactory) -> Arc<dyn Hub> {
        self(access_token_factory)
    }
}

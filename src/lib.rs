//! tablehub - live order, table and area updates for restaurant clients
//!
//! This is the main convenience crate that re-exports the tablehub
//! sub-crates. Use this crate if you want a single dependency for the hub
//! protocol and the client built on it.
//!
//! # Architecture
//!
//! tablehub is organized into modular crates:
//!
//! - **tablehub-core**: Hub protocol types, codec, error handling, observability
//! - **tablehub-client**: WebSocket hub connection, connection manager,
//!   subscription and invocation facades, typed feeds
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tablehub::{
//!     init_observability, session_channel, ConnectionManager, EventSubscription, HubConfig,
//!     ManagerConfig, ObservabilityConfig, Session, WebSocketHubFactory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     init_observability(ObservabilityConfig::new("tablehub"))?;
//!
//!     let (session_tx, session_rx) = session_channel(Session::anonymous());
//!     let factory = WebSocketHubFactory::new(HubConfig::from_env()?);
//!     let manager = ConnectionManager::spawn(ManagerConfig::default(), factory, session_rx);
//!     session_tx.send(Session::new("eyJhbGciOi..."))?;
//!
//!     let mut notifications = EventSubscription::new(&manager, "ReceiveNotification")?;
//!     notifications.changed().await?;
//!     println!("notification: {:?}", notifications.data());
//!
//!     Ok(())
//! }
//! ```

// Re-export the sub-crates so everything is reachable through `tablehub::`
pub use tablehub_client as client;
pub use tablehub_core as core;

// Convenience re-exports of the most commonly used types
pub use tablehub_client::{
    session_channel, ConnectionContext, ConnectionManager, EventSubscription, Hub,
    HubConfig, HubConnection, HubConnectionBuilder, Invoker, ManagerConfig, ManagerHandle,
    Session, WebSocketHubFactory,
};
pub use tablehub_core::{init_observability, shutdown_observability, Error, ObservabilityConfig, Result};

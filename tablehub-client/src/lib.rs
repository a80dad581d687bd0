//! Authenticated, auto-reconnecting hub client over WebSocket
//!
//! This crate keeps one push connection per process to the restaurant
//! backend's order/table/area hub and exposes it to the rest of the
//! application. It includes:
//!
//! - **Hub Connection**: JSON hub protocol over WebSocket with bearer auth,
//!   keep-alive, server timeout and automatic reconnection
//! - **Connection Manager**: Builds, starts, replaces and tears down the
//!   connection as the session's credential changes
//! - **Connection State**: A serial reducer over connect/disconnect/error
//!   actions, observable through a `watch` channel
//! - **Retry**: Bounded exponential backoff for transient failures
//! - **Subscriptions**: Per-subscriber event handlers that follow the
//!   manager's connection
//! - **Invocations**: Precondition-checked, retried remote calls
//! - **Feeds**: Typed table and dish feeds scoped by hub groups
//! - **Observability**: OpenTelemetry metrics and `tracing` spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tablehub_client::feeds::{TableUpdate, AreaTableFeed};
//! use tablehub_client::{
//!     session_channel, ConnectionManager, HubConfig, Invoker, ManagerConfig, Session,
//!     WebSocketHubFactory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (session_tx, session_rx) = session_channel(Session::anonymous());
//!     let factory = WebSocketHubFactory::new(HubConfig::from_env()?);
//!     let manager = ConnectionManager::spawn(ManagerConfig::default(), factory, session_rx);
//!
//!     // The auth layer logs in
//!     session_tx.send(Session::new("eyJhbGciOi..."))?;
//!
//!     let _tables = AreaTableFeed::open(&manager, 2, |tables: Vec<TableUpdate>| {
//!         println!("{} tables updated", tables.len());
//!     })?;
//!
//!     let invoker = Invoker::new(&manager);
//!     let mut context = manager.subscribe();
//!     context.wait_for(|context| context.is_connected()).await?;
//!     invoker.invoke("SubscribeToTopic", vec!["orders".into()]).await?;
//!
//!     Ok(())
//! }
//! ```

mod client_builder;
mod config;
mod connection;
pub mod connection_state;
mod events;
pub mod feeds;
pub mod groups;
mod hub;
mod invocation;
mod invoke;
mod manager;
mod metrics;
mod reconnect;
pub mod retry;
mod session;
mod subscription;

pub use client_builder::{HubConnectionBuilder, WebSocketHubFactory};
pub use config::{HubConfig, ManagerConfig, HUB_PATH};
pub use connection::{websocket_url, HubConnection};
pub use connection_state::{ConnectionAction, ConnectionState, HubConnectionState};
pub use events::{EventRegistry, LifecycleCallbacks};
pub use groups::{GroupKind, GroupMembership};
pub use hub::{
    AccessTokenFactory, CloseCallback, EventHandler, HandlerId, Hub, HubFactory,
    ReconnectedCallback, ReconnectingCallback,
};
pub use invocation::InvocationTracker;
pub use invoke::Invoker;
pub use manager::{
    ConnectionContext, ConnectionManager, ManagerHandle, CONNECTION_CLOSED, NO_ACCESS_TOKEN,
    RECONNECTING,
};
pub use metrics::ClientMetrics;
pub use reconnect::{
    DefaultReconnectPolicy, ExponentialBackoff, FixedDelay, NoReconnect, ReconnectPolicy,
    RetryContext,
};
pub use retry::{is_retryable, retry, RetryPolicy};
pub use session::{session_channel, Session, Token};
pub use subscription::EventSubscription;

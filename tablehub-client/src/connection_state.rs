//! Connection state
//!
//! Two related but distinct pieces of state live here:
//!
//! - [`HubConnectionState`]: the native state of one hub connection, owned by
//!   the connection itself and the source of truth.
//! - [`ConnectionState`]: the observable projection the connection manager
//!   publishes to the rest of the application, updated only through
//!   [`reduce`].
//!
//! # Store Transitions
//!
//! | Action           | New state                                            |
//! |------------------|------------------------------------------------------|
//! | `Connecting`     | `is_connecting = true`, `error = None`, `is_connected` unchanged |
//! | `Connected`      | `is_connected = true`, `is_connecting = false`, `error = None` |
//! | `Disconnect(r)`  | `is_connected = false`, `is_connecting = false`, `error = r` |
//! | `Error(m)`       | `is_connecting = false`, `error = m`, `is_connected` unchanged |
//!
//! Every action is accepted from every state. The store never rejects a
//! transition; it mirrors what the connection reports.

use std::fmt;

/// Native lifecycle state of a hub connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HubConnectionState {
    /// Not connected; `start()` is allowed
    #[default]
    Disconnected,
    /// Socket opening or handshake in progress
    Connecting,
    /// Handshake completed, invocations allowed
    Connected,
    /// `stop()` in progress
    Disconnecting,
    /// Connection lost, automatic reconnect in progress
    Reconnecting,
}

impl HubConnectionState {
    /// State name as shown in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            HubConnectionState::Disconnected => "Disconnected",
            HubConnectionState::Connecting => "Connecting",
            HubConnectionState::Connected => "Connected",
            HubConnectionState::Disconnecting => "Disconnecting",
            HubConnectionState::Reconnecting => "Reconnecting",
        }
    }
}

impl fmt::Display for HubConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable connection status published by the manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// The connection is established and usable
    pub is_connected: bool,
    /// A start is in progress
    pub is_connecting: bool,
    /// Last human-readable fault, if any
    pub error: Option<String>,
}

/// Transitions of the connection state store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    Connecting,
    Connected,
    Disconnect(String),
    Error(String),
}

/// Apply one action to the store
///
/// Pure and total: any action is accepted from any state.
pub fn reduce(state: &ConnectionState, action: ConnectionAction) -> ConnectionState {
    match action {
        ConnectionAction::Connecting => ConnectionState {
            is_connecting: true,
            error: None,
            ..state.clone()
        },
        ConnectionAction::Connected => ConnectionState {
            is_connected: true,
            is_connecting: false,
            error: None,
        },
        ConnectionAction::Disconnect(reason) => ConnectionState {
            is_connected: false,
            is_connecting: false,
            error: Some(reason),
        },
        ConnectionAction::Error(message) => ConnectionState {
            is_connected: state.is_connected,
            is_connecting: false,
            error: Some(message),
        },
    }
}

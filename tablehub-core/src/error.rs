//! Error types for tablehub
//!
//! This module provides the single error taxonomy shared by the protocol
//! layer and the client. It uses `thiserror` for the `std::error::Error`
//! implementation and display messages.
//!
//! # Error Categories
//!
//! - **Transport errors**: WebSocket, ConnectionClosed, Timeout
//! - **Protocol errors**: Serialization, Protocol, Handshake
//! - **Remote errors**: Hub (the server rejected an invocation)
//! - **Usage errors**: ConnectionNotEstablished, InvalidState, OutsideScope
//!
//! # Messages
//!
//! The display message of an error is what the retry classifier inspects and
//! what the connection state store records in its `error` field, so the
//! wording of transport failures is part of the contract: a transport
//! failure mentions the transport, a timeout mentions the timeout.
//!
//! # Examples
//!
//! ```rust
//! use tablehub_core::Error;
//!
//! let error = Error::InvalidState {
//!     method: "JoinTable".into(),
//!     state: "Connecting".into(),
//! };
//! assert_eq!(
//!     error.message(),
//!     "Cannot invoke \"JoinTable\". Connection state: Connecting"
//! );
//! ```

use thiserror::Error;

/// Result type for tablehub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for tablehub operations
///
/// The enum is `Clone` so that one failure can be delivered to every
/// pending invocation when a connection drops, and so that the retry
/// executor can hand the last error back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// WebSocket transport layer error
    ///
    /// Covers socket connect failures, TLS failures and frame errors below
    /// the hub protocol.
    #[error("WebSocket transport error: {0}")]
    WebSocket(String),

    /// Serialization or deserialization error
    ///
    /// Occurs when a payload cannot be converted between Rust types and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed hub protocol record
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server rejected or never answered the protocol handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A remote method completed with an error
    ///
    /// The message is the server's own error text, unchanged.
    #[error("{0}")]
    Hub(String),

    /// Connection was closed
    ///
    /// Pending invocations fail with this error when the connection stops or
    /// drops before their completion arrives.
    #[error("Invocation canceled due to the underlying connection being closed")]
    ConnectionClosed,

    /// No connection object exists yet
    ///
    /// Raised by the invocation facade before any network action when the
    /// manager has not built a connection (for example, no credential).
    #[error("Connection not established")]
    ConnectionNotEstablished,

    /// A connection exists but is not in the state the operation needs
    #[error("Cannot invoke \"{method}\". Connection state: {state}")]
    InvalidState {
        /// The operation or remote method that was refused
        method: String,
        /// Name of the connection state at the time of the call
        state: String,
    },

    /// The connection manager is no longer running
    ///
    /// Reading the connection context after the manager shut down is a
    /// usage error, the same as reading it outside of the manager's scope.
    #[error("Connection context read outside of a running connection manager")]
    OutsideScope,

    /// Operation timeout
    #[error("Server timeout elapsed without receiving a message from the server")]
    Timeout,

    /// Internal error
    ///
    /// Unexpected conditions that don't fit another category.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Human-readable message for this error
    ///
    /// Equivalent to `to_string()`; exists so call sites that feed the state
    /// store read as intent rather than formatting.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether this error is a caller-side usage error
    ///
    /// Usage errors are raised before any network action and are never
    /// retried.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::ConnectionNotEstablished | Error::InvalidState { .. } | Error::OutsideScope
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

//! Core hub protocol types and codec for tablehub
//!
//! This crate provides the foundation shared by the tablehub client:
//!
//! - **Protocol**: JSON hub protocol records (invocations, completions, pings, close)
//! - **Codec**: Record-separator framing and handshake encoding
//! - **Error handling**: The error taxonomy every client operation returns
//! - **Observability**: `tracing` + OpenTelemetry initialization
//!
//! # Architecture
//!
//! The crate is transport-agnostic: it turns hub records into text frames
//! and back but never opens a socket. `tablehub-client` owns the WebSocket
//! transport, the connection manager and the facades built on top of it.
//!
//! # Example
//!
//! ```rust
//! use tablehub_core::{codec, HubMessage, Invocation};
//!
//! let frame = codec::encode(&HubMessage::Invocation(Invocation::call("0", "JoinTable", vec![12.into()]))).unwrap();
//! let decoded = codec::decode_records(&frame).unwrap();
//! assert_eq!(decoded[0].message_type(), 1);
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod protocol;

pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use protocol::{Close, Completion, HandshakeRequest, HandshakeResponse, HubMessage, Invocation};

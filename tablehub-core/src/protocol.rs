//! JSON hub protocol message types
//!
//! The push channel speaks the JSON hub protocol: after a one-time handshake,
//! every record is a JSON object with an integer `type` discriminator.
//!
//! # Message Kinds
//!
//! | `type` | Kind        | Direction        |
//! |--------|-------------|------------------|
//! | 1      | Invocation  | both             |
//! | 3      | Completion  | server → client  |
//! | 6      | Ping        | both             |
//! | 7      | Close       | server → client  |
//!
//! An Invocation without `invocationId` is a server push event (or a
//! client fire-and-forget send); with an id it expects a Completion carrying
//! the same id. Stream items, stream invocations and cancellations are not
//! used by this client and decode as [`HubMessage::Other`].
//!
//! # Why Not `#[serde(tag = "type")]`?
//!
//! Serde's internally-tagged enums match string tags only, while the hub
//! protocol discriminates with integers. Records are therefore decoded in two
//! steps: read `type` from a generic value, then deserialize the body.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol name sent in the handshake
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// Integer discriminators of hub records
pub mod message_type {
    /// Invoke a method on the other side
    pub const INVOCATION: u64 = 1;
    /// Item of a streaming result
    pub const STREAM_ITEM: u64 = 2;
    /// Result of an invocation
    pub const COMPLETION: u64 = 3;
    /// Invocation that yields a stream
    pub const STREAM_INVOCATION: u64 = 4;
    /// Cancel a streaming invocation
    pub const CANCEL_INVOCATION: u64 = 5;
    /// Keep-alive
    pub const PING: u64 = 6;
    /// Server is closing the connection
    pub const CLOSE: u64 = 7;
}

/// First record sent by the client after the socket opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}

/// Server answer to the handshake; an empty object means success
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Method call, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Present when the caller awaits a completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Method or event name
    pub target: String,
    /// Positional arguments
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Invocation {
    /// An invocation that expects a completion with `invocation_id`
    pub fn call(invocation_id: impl Into<String>, target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        }
    }

    /// A fire-and-forget invocation (also the shape of server push events)
    pub fn send(target: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            invocation_id: None,
            target: target.into(),
            arguments,
        }
    }
}

/// Outcome of an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Completion {
    pub fn success(invocation_id: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result,
            error: None,
        }
    }

    pub fn failure(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Server-initiated close
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Close {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reconnect: Option<bool>,
}

/// A decoded hub record
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation(Invocation),
    Completion(Completion),
    Ping,
    Close(Close),
    /// A record kind this client does not act on, kept by its discriminator
    Other(u64),
}

impl HubMessage {
    /// Integer discriminator written to the `type` field
    pub fn message_type(&self) -> u64 {
        match self {
            HubMessage::Invocation(_) => message_type::INVOCATION,
            HubMessage::Completion(_) => message_type::COMPLETION,
            HubMessage::Ping => message_type::PING,
            HubMessage::Close(_) => message_type::CLOSE,
            HubMessage::Other(kind) => *kind,
        }
    }

    /// Convert to a JSON object with its `type` field set
    pub fn to_value(&self) -> Result<Value> {
        let body = match self {
            HubMessage::Invocation(inner) => serde_json::to_value(inner)?,
            HubMessage::Completion(inner) => serde_json::to_value(inner)?,
            HubMessage::Close(inner) => serde_json::to_value(inner)?,
            HubMessage::Ping | HubMessage::Other(_) => Value::Object(Map::new()),
        };

        let mut object = match body {
            Value::Object(object) => object,
            other => {
                return Err(Error::Protocol(format!(
                    "hub record must be an object, got {}",
                    other
                )))
            }
        };
        object.insert("type".to_string(), Value::from(self.message_type()));
        Ok(Value::Object(object))
    }

    /// Parse a JSON object carrying a `type` discriminator
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Protocol(format!("record without integer type: {}", value)))?;

        let message = match kind {
            message_type::INVOCATION => HubMessage::Invocation(serde_json::from_value(value)?),
            message_type::COMPLETION => HubMessage::Completion(serde_json::from_value(value)?),
            message_type::PING => HubMessage::Ping,
            message_type::CLOSE => HubMessage::Close(serde_json::from_value(value)?),
            message_type::STREAM_ITEM
            | message_type::STREAM_INVOCATION
            | message_type::CANCEL_INVOCATION => HubMessage::Other(kind),
            unknown => {
                return Err(Error::Protocol(format!("unknown message type {}", unknown)));
            }
        };

        Ok(message)
    }
}

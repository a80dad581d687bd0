//! Session state and the credential it carries
//!
//! The session is owned by the application's auth layer. The connection
//! manager only reads it through a `tokio::sync::watch` channel: every value
//! published on the channel is treated as a fresh look at the credential.
//!
//! The serialized shape matches the persisted auth state:
//!
//! ```json
//! { "isAuthenticated": true, "token": { "accessToken": "...", "refreshToken": "..." } }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Token pair issued at login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Bearer credential; empty when logged out
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Authenticated session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub token: Token,
}

impl Session {
    /// A session holding `access_token`
    pub fn new(access_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        Self {
            is_authenticated: !access_token.is_empty(),
            token: Token {
                access_token,
                refresh_token: None,
            },
        }
    }

    /// The logged-out session
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The bearer credential, or `None` when the token is empty
    pub fn credential(&self) -> Option<&str> {
        let token = self.token.access_token.as_str();
        (!token.is_empty()).then_some(token)
    }
}

/// Create the channel the auth layer publishes sessions on
pub fn session_channel(initial: Session) -> (watch::Sender<Session>, watch::Receiver<Session>) {
    watch::channel(initial)
}

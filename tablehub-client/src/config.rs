//! Connection and manager configuration
//!
//! [`HubConfig`] describes the endpoint and transport options of every hub
//! connection the manager builds. [`ManagerConfig`] holds the retry policy
//! the manager applies to `start()`.
//!
//! # Environment Variables
//!
//! - `TABLEHUB_SOCKET_URL`: Full hub URL; takes precedence
//! - `TABLEHUB_API_URL`: API base URL; the hub lives at
//!   `{TABLEHUB_API_URL}/hub/ws-order-table-area`
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::HubConfig;
//! use std::time::Duration;
//!
//! let config = HubConfig::from_env()
//!     .unwrap_or_else(|_| HubConfig::new("http://localhost:5000/hub/ws-order-table-area"))
//!     .with_keep_alive_interval(Duration::from_secs(10));
//! ```

use crate::retry::{is_retryable, RetryPolicy};
use std::time::Duration;
use tablehub_core::{Error, Result};

/// Path of the order/table/area hub under the API base URL
pub const HUB_PATH: &str = "/hub/ws-order-table-area";

const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Endpoint and transport options for hub connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Hub URL; `http(s)` is rewritten to `ws(s)` when connecting
    pub url: String,
    /// Reconnect with the default policy when an established connection drops
    pub automatic_reconnect: bool,
    /// Interval between client pings
    pub keep_alive_interval: Duration,
    /// Silence from the server after which the connection is considered lost
    pub server_timeout: Duration,
    /// Time allowed for the protocol handshake
    pub handshake_timeout: Duration,
}

impl HubConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            automatic_reconnect: true,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Build from `TABLEHUB_SOCKET_URL` or `TABLEHUB_API_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty("TABLEHUB_SOCKET_URL") {
            return Ok(Self::new(url));
        }
        if let Some(api_url) = non_empty("TABLEHUB_API_URL") {
            return Ok(Self::new(format!(
                "{}{}",
                api_url.trim_end_matches('/'),
                HUB_PATH
            )));
        }

        Err(Error::Internal(
            "TABLEHUB_SOCKET_URL or TABLEHUB_API_URL must be set".to_string(),
        ))
    }

    pub fn with_automatic_reconnect(mut self, enable: bool) -> Self {
        self.automatic_reconnect = enable;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Policy for `start()`: 3 retries, 1 s initial delay, doubling, transient
    /// failures only
    pub start_retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            start_retry: RetryPolicy::new(3, Duration::from_millis(1000), 2.0)
                .with_should_retry(is_retryable::<Error>),
        }
    }
}

impl ManagerConfig {
    pub fn with_start_retry(mut self, policy: RetryPolicy) -> Self {
        self.start_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HubConfig::new("http://localhost:5000/hub/ws-order-table-area");
        assert!(config.automatic_reconnect);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(15));
        assert_eq!(config.server_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_socket_url_wins() {
        let config = HubConfig::from_lookup(lookup(&[
            ("TABLEHUB_SOCKET_URL", "wss://hub.example.com/custom"),
            ("TABLEHUB_API_URL", "https://api.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.url, "wss://hub.example.com/custom");
    }

    #[test]
    fn test_api_url_gets_hub_path() {
        let config =
            HubConfig::from_lookup(lookup(&[("TABLEHUB_API_URL", "https://api.example.com/")])).unwrap();
        assert_eq!(config.url, "https://api.example.com/hub/ws-order-table-area");
    }

    #[test]
    fn test_missing_url() {
        assert!(HubConfig::from_lookup(lookup(&[("TABLEHUB_SOCKET_URL", "  ")])).is_err());
        assert!(HubConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_manager_start_policy() {
        let config = ManagerConfig::default();
        assert_eq!(config.start_retry.max_retries, 3);
        assert_eq!(config.start_retry.initial_delay, Duration::from_millis(1000));
        assert!(config.start_retry.should_retry(&Error::Internal("network timeout".into())));
        assert!(!config.start_retry.should_retry(&Error::Handshake("Unauthorized".into())));
    }
}

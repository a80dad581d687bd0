//! Builder for hub connections
//!
//! [`HubConnectionBuilder`] configures a [`HubConnection`] before it is
//! started. It allows you to:
//! - Supply the bearer token source
//! - Enable automatic reconnection with the default or a custom policy
//! - Tune keep-alive, server timeout and handshake timeout
//! - Attach OpenTelemetry metrics
//!
//! Building never touches the network; the connection opens on `start()`.
//!
//! [`WebSocketHubFactory`] is the production [`HubFactory`]: it builds one
//! such connection per credential for the connection manager.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{FixedDelay, HubConnectionBuilder};
//! use std::time::Duration;
//!
//! let hub = HubConnectionBuilder::new("https://pos.example.com/hub/ws-order-table-area")
//!     .access_token_factory(|| std::env::var("TOKEN").unwrap_or_default())
//!     .with_reconnect_policy(Box::new(FixedDelay::new(Duration::from_secs(5)).with_max_attempts(10)))
//!     .server_timeout(Duration::from_secs(60))
//!     .build();
//! ```

use crate::config::HubConfig;
use crate::connection::{HubConnection, HubOptions};
use crate::hub::{AccessTokenFactory, Hub, HubFactory};
use crate::metrics::ClientMetrics;
use crate::reconnect::{DefaultReconnectPolicy, ReconnectPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a [`HubConnection`]
pub struct HubConnectionBuilder {
    url: String,
    access_token_factory: Option<AccessTokenFactory>,
    reconnect_policy: Option<Box<dyn ReconnectPolicy>>,
    keep_alive_interval: Duration,
    server_timeout: Duration,
    handshake_timeout: Duration,
    metrics: Option<Arc<ClientMetrics>>,
}

impl HubConnectionBuilder {
    /// Create a builder for `url`; automatic reconnect is off
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = HubConfig::new(String::new());
        Self {
            url: url.into(),
            access_token_factory: None,
            reconnect_policy: None,
            keep_alive_interval: defaults.keep_alive_interval,
            server_timeout: defaults.server_timeout,
            handshake_timeout: defaults.handshake_timeout,
            metrics: None,
        }
    }

    /// Create a builder from a [`HubConfig`]
    pub fn from_config(config: &HubConfig) -> Self {
        let builder = Self::new(config.url.clone())
            .keep_alive_interval(config.keep_alive_interval)
            .server_timeout(config.server_timeout)
            .handshake_timeout(config.handshake_timeout);

        if config.automatic_reconnect {
            builder.with_automatic_reconnect()
        } else {
            builder
        }
    }

    /// Supply the bearer token; called on every connect and reconnect attempt
    pub fn access_token_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.access_token_factory = Some(Arc::new(factory));
        self
    }

    /// [`Self::access_token_factory`] with an already shared factory
    pub fn shared_access_token_factory(mut self, factory: AccessTokenFactory) -> Self {
        self.access_token_factory = Some(factory);
        self
    }

    /// Reconnect with the default policy (0 s, 2 s, 10 s, 30 s)
    pub fn with_automatic_reconnect(mut self) -> Self {
        self.reconnect_policy = Some(Box::new(DefaultReconnectPolicy::default()));
        self
    }

    /// Reconnect with a custom policy
    pub fn with_reconnect_policy(mut self, policy: Box<dyn ReconnectPolicy>) -> Self {
        self.reconnect_policy = Some(policy);
        self
    }

    /// Disable automatic reconnect (default)
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_policy = None;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    pub fn server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Record connection metrics
    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the connection; it starts out `Disconnected`
    pub fn build(self) -> HubConnection {
        HubConnection::new(HubOptions {
            url: self.url,
            access_token_factory: self.access_token_factory,
            reconnect_policy: self.reconnect_policy,
            keep_alive_interval: self.keep_alive_interval,
            server_timeout: self.server_timeout,
            handshake_timeout: self.handshake_timeout,
            metrics: self.metrics,
        })
    }
}

/// Builds WebSocket hub connections for the connection manager
#[derive(Clone)]
pub struct WebSocketHubFactory {
    config: HubConfig,
    metrics: Option<Arc<ClientMetrics>>,
}

impl WebSocketHubFactory {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Attach metrics to every connection this factory builds
    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

impl HubFactory for WebSocketHubFactory {
    fn build(&self, access_token_factory: AccessTokenFactory) -> Arc<dyn Hub> {
        let mut builder = HubConnectionBuilder::from_config(&self.config)
            .shared_access_token_factory(access_token_factory);
        if let Some(metrics) = &self.metrics {
            builder = builder.with_metrics(Arc::clone(metrics));
        }
        Arc::new(builder.build())
    }
}

//! Client metrics definitions
//!
//! OpenTelemetry instruments for monitoring the hub connection. They are
//! exported through whatever meter provider `tablehub_core::init_observability`
//! installed; without one, recording is a no-op.
//!
//! # Metrics Collected
//!
//! - **tablehub.client.connection.state**: Native connection state (gauge)
//! - **tablehub.client.invocations.total**: Remote invocations (counter)
//! - **tablehub.client.invocation.duration**: Invocation latency (histogram)
//! - **tablehub.client.errors.total**: Errors by kind (counter)
//! - **tablehub.client.reconnect.attempts**: Reconnect attempts (counter)
//! - **tablehub.client.reconnect.success**: Successful reconnects (counter)
//! - **tablehub.client.events.received**: Server push events (counter)
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::{ClientMetrics, HubConnectionBuilder};
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(ClientMetrics::new("floor-tablet"));
//! let hub = HubConnectionBuilder::new("wss://pos.example.com/hub/ws-order-table-area")
//!     .with_metrics(metrics)
//!     .build();
//! ```

use crate::connection_state::HubConnectionState;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Connection state (0=disconnected, 1=connecting, 2=connected, 3=disconnecting, 4=reconnecting)
    pub connection_state: Gauge<i64>,
    pub invocations_total: Counter<u64>,
    /// Invocation duration in seconds
    pub invocation_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub reconnect_attempts: Counter<u64>,
    pub reconnect_success: Counter<u64>,
    pub events_received: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into()).build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a specific meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("tablehub.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connecting, 2=connected, 3=disconnecting, 4=reconnecting)")
                .build(),
            invocations_total: meter
                .u64_counter("tablehub.client.invocations.total")
                .with_description("Total number of remote invocations")
                .build(),
            invocation_duration: meter
                .f64_histogram("tablehub.client.invocation.duration")
                .with_description("Invocation duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("tablehub.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnect_attempts: meter
                .u64_counter("tablehub.client.reconnect.attempts")
                .with_description("Total number of reconnect attempts")
                .build(),
            reconnect_success: meter
                .u64_counter("tablehub.client.reconnect.success")
                .with_description("Total number of successful reconnects")
                .build(),
            events_received: meter
                .u64_counter("tablehub.client.events.received")
                .with_description("Total number of server push events received")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: HubConnectionState) {
        let value = match state {
            HubConnectionState::Disconnected => 0,
            HubConnectionState::Connecting => 1,
            HubConnectionState::Connected => 2,
            HubConnectionState::Disconnecting => 3,
            HubConnectionState::Reconnecting => 4,
        };
        self.connection_state.record(value, &[]);
    }

    pub fn record_invocation(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.invocations_total.add(1, attributes);
        self.invocation_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.add(1, &[]);
    }

    pub fn record_reconnect_success(&self) {
        self.reconnect_success.add(1, &[]);
    }

    pub fn record_event(&self, event: &str) {
        let attributes = &[KeyValue::new("event", event.to_string())];
        self.events_received.add(1, attributes);
    }
}

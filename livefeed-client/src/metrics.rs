//! Feed metrics definitions
//!
//! OpenTelemetry instruments recorded by connections and the supervisor.
//! They are exported through whatever meter provider
//! `livefeed_core::init_observability` installed; without one they are
//! no-ops.
//!
//! # Metrics Collected
//!
//! - **livefeed.connection.state**: last state per subscription (gauge,
//!   0=idle .. 4=closed)
//! - **livefeed.events.received**: change events delivered to handlers, by
//!   resource and kind
//! - **livefeed.events.dropped**: events discarded, by reason
//! - **livefeed.reconnection.attempts**: reconnects started, by trigger
//! - **livefeed.reconnection.success**: reconnects that reached live
//! - **livefeed.reconnection.deferred**: backoff timers that fired while the
//!   app was in the background
//! - **livefeed.supervised.handles**: handles currently supervised
//!
//! # Examples
//!
//! ```rust,no_run
//! use livefeed_client::FeedMetrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(FeedMetrics::new("coach-app"));
//! // pass to SupervisorBuilder::with_metrics or FeedClient::with_metrics
//! ```

use livefeed_core::{ChangeKind, ConnectionState};
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter, UpDownCounter},
    InstrumentationScope, KeyValue,
};

/// What started a reconnection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectTrigger {
    /// The backoff timer fired while in the foreground
    Backoff,
    /// The app returned to the foreground with a reconnect pending
    Foreground,
    /// The caller asked for it
    Manual,
}

impl ReconnectTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconnectTrigger::Backoff => "backoff",
            ReconnectTrigger::Foreground => "foreground",
            ReconnectTrigger::Manual => "manual",
        }
    }
}

/// Change-feed metrics
pub struct FeedMetrics {
    pub connection_state: Gauge<i64>,
    pub events_received: Counter<u64>,
    pub events_dropped: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
    pub deferred_reconnects: Counter<u64>,
    pub supervised_handles: UpDownCounter<i64>,
}

impl FeedMetrics {
    /// Create instruments on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into()).build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("livefeed.connection.state")
                .with_description("Connection state (0=idle, 1=connecting, 2=live, 3=degraded, 4=closed)")
                .build(),
            events_received: meter
                .u64_counter("livefeed.events.received")
                .with_description("Change events delivered to handlers")
                .build(),
            events_dropped: meter
                .u64_counter("livefeed.events.dropped")
                .with_description("Change events discarded before reaching handlers")
                .build(),
            reconnection_attempts: meter
                .u64_counter("livefeed.reconnection.attempts")
                .with_description("Reconnection attempts started")
                .build(),
            reconnection_success: meter
                .u64_counter("livefeed.reconnection.success")
                .with_description("Reconnections that reached the live state")
                .build(),
            deferred_reconnects: meter
                .u64_counter("livefeed.reconnection.deferred")
                .with_description("Reconnections deferred until the app is foregrounded")
                .build(),
            supervised_handles: meter
                .i64_up_down_counter("livefeed.supervised.handles")
                .with_description("Handles currently under supervision")
                .build(),
        }
    }

    pub fn update_connection_state(&self, subscription: &str, state: ConnectionState) {
        self.connection_state.record(
            state.as_gauge(),
            &[KeyValue::new("subscription", subscription.to_string())],
        );
    }

    pub fn record_event(&self, resource: &str, kind: ChangeKind) {
        let attributes = &[
            KeyValue::new("resource", resource.to_string()),
            KeyValue::new("kind", kind.as_str()),
        ];
        self.events_received.add(1, attributes);
    }

    /// Record a dropped event; `reason` is a short stable tag
    pub fn record_dropped(&self, reason: &'static str) {
        self.events_dropped.add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_reconnection_attempt(&self, trigger: ReconnectTrigger) {
        self.reconnection_attempts
            .add(1, &[KeyValue::new("trigger", trigger.as_str())]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    pub fn record_deferred_reconnect(&self) {
        self.deferred_reconnects.add(1, &[]);
    }

    pub fn handle_started(&self) {
        self.supervised_handles.add(1, &[]);
    }

    pub fn handle_stopped(&self) {
        self.supervised_handles.add(-1, &[]);
    }
}

//! OpenTelemetry instruments for the monitor
//!
//! Recorded only when observability is enabled on the builder. Without a
//! registered meter provider the instruments are no-ops.
//!
//! # Metrics Collected
//!
//! - **connection.state**: current `ConnectionState` as a number (gauge)
//! - **sessions.started**: sessions opened, first one included (counter)
//! - **reconnect.attempts**: delayed reconnects scheduled (counter)
//! - **auth.failures**: `auth_invalid` frames received (counter)
//! - **frames.received**: inbound text frames, by frame type (counter)
//! - **events.dispatched**: events handed to the callback, by outcome (counter)
//! - **events.dropped**: events for unknown subscription ids (counter)
//! - **errors.total**: protocol and transport errors, by kind (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Meter},
    KeyValue,
};

pub struct MonitorMetrics {
    pub connection_state: Gauge<i64>,
    pub sessions_started: Counter<u64>,
    pub reconnect_attempts: Counter<u64>,
    pub auth_failures: Counter<u64>,
    pub frames_received: Counter<u64>,
    pub events_dispatched: Counter<u64>,
    pub events_dropped: Counter<u64>,
    pub errors_total: Counter<u64>,
}

impl MonitorMetrics {
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("hassmon.connection.state")
                .with_description(
                    "Connection state (0=disconnected, 1=connecting, 2=authenticating, 3=subscribing, 4=live)",
                )
                .build(),
            sessions_started: meter
                .u64_counter("hassmon.sessions.started")
                .with_description("Total number of connection sessions opened")
                .build(),
            reconnect_attempts: meter
                .u64_counter("hassmon.reconnect.attempts")
                .with_description("Total number of scheduled reconnects")
                .build(),
            auth_failures: meter
                .u64_counter("hassmon.auth.failures")
                .with_description("Total number of rejected access tokens")
                .build(),
            frames_received: meter
                .u64_counter("hassmon.frames.received")
                .with_description("Total number of inbound frames")
                .build(),
            events_dispatched: meter
                .u64_counter("hassmon.events.dispatched")
                .with_description("Total number of state change events delivered to the callback")
                .build(),
            events_dropped: meter
                .u64_counter("hassmon.events.dropped")
                .with_description("Total number of events for unknown subscription ids")
                .build(),
            errors_total: meter
                .u64_counter("hassmon.errors.total")
                .with_description("Total number of protocol and transport errors")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.add(1, &[]);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.add(1, &[]);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.add(1, &[]);
    }

    pub fn record_frame(&self, frame_type: &'static str) {
        self.frames_received
            .add(1, &[KeyValue::new("frame_type", frame_type)]);
    }

    /// `outcome` is `delivered`, `failed` or `panicked`
    pub fn record_dispatch(&self, entity_id: &str, outcome: &'static str) {
        let attributes = &[
            KeyValue::new("entity_id", entity_id.to_string()),
            KeyValue::new("outcome", outcome),
        ];
        self.events_dispatched.add(1, attributes);
    }

    pub fn record_dropped_event(&self) {
        self.events_dropped.add(1, &[]);
    }

    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type)]);
    }
}

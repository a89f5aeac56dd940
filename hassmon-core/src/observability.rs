//! Logging, tracing and metrics setup
//!
//! The monitor logs through `tracing` everywhere. This module installs the
//! subscriber that turns those events into output, and optionally wires an
//! OpenTelemetry pipeline that exports spans and metrics to an OTLP collector.
//!
//! Nothing here is required: a library user who already installs their own
//! `tracing` subscriber should simply skip `init_observability`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hassmon_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Local logs only, human readable.
//!     let config = ObservabilityConfig::new("hassmon")
//!         .with_traces(false)
//!         .with_metrics(false)
//!         .with_json_logs(false);
//!
//!     hassmon_core::init_observability(config).expect("failed to init logging");
//!     tracing::info!("monitor starting");
//!     hassmon_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//! - `RUST_LOG`: filter directives, takes precedence over `log_level`

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often the meter provider pushes metrics to the collector
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Handles to the providers registered globally, kept so they can be shut down
struct Providers {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

static PROVIDERS: Mutex<Providers> = Mutex::new(Providers {
    tracer: None,
    meter: None,
});

fn providers() -> MutexGuard<'static, Providers> {
    PROVIDERS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Observability configuration
///
/// Defaults: service name `hassmon`, crate version, endpoint from
/// `OTEL_EXPORTER_OTLP_ENDPOINT` (or `http://localhost:4317`), traces and
/// metrics exported, JSON logs on stdout at `$RUST_LOG` (or `info`).
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,
    pub service_version: String,
    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,
    /// Export spans to the collector
    pub enable_traces: bool,
    /// Export metrics to the collector
    pub enable_metrics: bool,
    /// Print log events to stdout
    pub enable_logs: bool,
    /// Format stdout logs as JSON lines instead of plain text
    pub json_logs: bool,
    /// Fallback filter when `RUST_LOG` is unset, e.g. `info` or `hassmon_client=debug`
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "hassmon".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            json_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Default configuration under a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    pub fn with_json_logs(mut self, enable: bool) -> Self {
        self.json_logs = enable;
        self
    }
}

/// Install the global `tracing` subscriber and OpenTelemetry providers
///
/// Call once at startup. A second call fails because the global subscriber
/// is already set.
///
/// # Errors
///
/// - the OTLP exporters cannot be built
/// - `log_level` is not a valid filter directive
/// - a global subscriber is already installed
pub fn init_observability(config: ObservabilityConfig) -> Result<(), BoxError> {
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        "Observability initialized"
    );

    Ok(())
}

fn service_resource(config: &ObservabilityConfig) -> Resource {
    Resource::builder_empty()
        .with_attributes(vec![
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                config.service_version.clone(),
            ),
        ])
        .build()
}

/// Build the batch span exporter and register the tracer provider globally
fn init_tracer(config: &ObservabilityConfig) -> Result<opentelemetry_sdk::trace::Tracer, BoxError> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(service_resource(config))
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    // The subscriber layer needs a tracer from this provider before it goes global.
    let tracer = provider.tracer(config.service_name.clone());
    register_tracer_provider(provider);

    Ok(tracer)
}

/// Register a periodic OTLP meter provider globally
fn init_metrics(config: &ObservabilityConfig) -> Result<(), BoxError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(service_resource(config))
        .build();

    register_meter_provider(provider);
    Ok(())
}

fn register_tracer_provider(provider: SdkTracerProvider) {
    global::set_tracer_provider(provider.clone());
    providers().tracer = Some(provider);
}

fn register_meter_provider(provider: SdkMeterProvider) {
    global::set_meter_provider(provider.clone());
    providers().meter = Some(provider);
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let json_layer = (config.enable_logs && config.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .json()
    });

    let plain_layer = (config.enable_logs && !config.json_logs)
        .then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .try_init()?;

    Ok(())
}

/// Flush and shut down the providers installed by `init_observability`
///
/// Exports pending spans and metrics before returning. Safe to call more
/// than once; later calls do nothing.
pub fn shutdown_observability() {
    let (tracer, meter) = {
        let mut guard = providers();
        (guard.tracer.take(), guard.meter.take())
    };

    if let Some(provider) = tracer {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Failed to shut down tracer provider");
        }
    }
    if let Some(provider) = meter {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Failed to shut down meter provider");
        }
    }

    tracing::info!("Observability shut down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "hassmon");
        assert_eq!(config.service_version, env!("CARGO_PKG_VERSION"));
        assert!(config.enable_traces);
        assert!(config.enable_metrics);
        assert!(config.enable_logs);
        assert!(config.json_logs);
    }

    #[test]
    fn test_builder_methods() {
        let config = ObservabilityConfig::new("garage-door-watcher")
            .with_endpoint("http://collector:4317")
            .with_log_level("hassmon_client=debug")
            .with_version("9.9.9")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(true)
            .with_json_logs(false);

        assert_eq!(config.service_name, "garage-door-watcher");
        assert_eq!(config.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.log_level, "hassmon_client=debug");
        assert_eq!(config.service_version, "9.9.9");
        assert!(!config.enable_traces);
        assert!(!config.enable_metrics);
        assert!(config.enable_logs);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_init_local_only_and_second_init_fails() {
        let config = ObservabilityConfig::new("test-local")
            .with_traces(false)
            .with_metrics(false)
            .with_logs(false)
            .with_log_level("warn");

        assert!(init_observability(config.clone()).is_ok());
        assert!(init_observability(config).is_err());
    }

    #[test]
    fn test_shutdown_flushes_registered_providers() {
        let tracer = SdkTracerProvider::builder().build();
        let meter = SdkMeterProvider::builder().build();
        register_tracer_provider(tracer.clone());
        register_meter_provider(meter.clone());

        shutdown_observability();
        assert!(providers().tracer.is_none());
        assert!(providers().meter.is_none());
        // Already shut down by the call above.
        assert!(tracer.shutdown().is_err());
        assert!(meter.shutdown().is_err());

        shutdown_observability();
    }
}

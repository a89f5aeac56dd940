//! hassmon - print Home Assistant state changes as they happen
//!
//! ```bash
//! export HA_HOSTNAME=homeassistant.local:8123
//! export HA_TOKEN=...
//! hassmon sensor.outdoor_temperature=numeric sun.sun=str binary_sensor.door=bool
//! ```
//!
//! Each argument is `entity_id=type`; the type defaults to `str` when omitted.
//! Runs until Ctrl-C.

use clap::Parser;
use hassmon::client::{CallbackError, MonitorBuilder, MonitorConfig};
use hassmon::core::{ObservabilityConfig, SemanticType, StateChangeEvent, StateValue};
use std::time::Duration;

/// Monitor Home Assistant entity states over WebSocket
#[derive(Parser)]
#[command(name = "hassmon")]
#[command(about = "Print Home Assistant entity state changes in real time")]
#[command(version)]
struct Args {
    /// Entities to monitor, as `entity_id=type` (numeric, integer, bool, datetime, str)
    #[arg(required = true, value_name = "ENTITY=TYPE")]
    entities: Vec<String>,

    /// Home Assistant host or URL
    #[arg(long, env = "HA_HOSTNAME")]
    endpoint: String,

    /// Long-lived access token
    #[arg(long, env = "HA_TOKEN", hide_env_values = true)]
    token: String,

    /// IANA time zone timestamps are converted into
    #[arg(long, env = "HA_TIMEZONE")]
    timezone: Option<String>,

    /// Seconds to wait between reconnects
    #[arg(long, default_value_t = 5)]
    reconnect_delay: u64,

    /// Exit instead of retrying when the token is rejected
    #[arg(long)]
    stop_on_auth_failure: bool,

    /// Print each event as a JSON line
    #[arg(long)]
    json: bool,

    /// Export traces and metrics to the OTLP collector
    #[arg(long)]
    otlp: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_entity(arg: &str) -> (&str, &str) {
    match arg.split_once('=') {
        Some((entity_id, type_name)) => (entity_id.trim(), type_name.trim()),
        None => (arg.trim(), "str"),
    }
}

fn print_event(event: &StateChangeEvent) {
    println!("Entity {} ({}) changed:", event.entity_id, event.data_type);
    println!("  Old state: {}", display(&event.old_state));
    println!("  New state: {}", display(&event.new_state));
    println!("  Raw old: {}", event.old_state_raw.as_deref().unwrap_or("-"));
    println!("  Raw new: {}", event.new_state_raw.as_deref().unwrap_or("-"));
    if let Some(ref updated) = event.last_updated {
        println!("  Last updated: {}", updated);
    }

    match (event.data_type, &event.old_state, &event.new_state) {
        (SemanticType::Numeric | SemanticType::Integer, Some(old), Some(new)) => {
            if let (Some(old), Some(new)) = (old.as_f64(), new.as_f64()) {
                println!("  Numeric change: {:+}", new - old);
            }
        }
        (SemanticType::Datetime, Some(StateValue::Datetime(old)), Some(StateValue::Datetime(new))) => {
            if let (Some(old), Some(new)) = (old.to_utc(), new.to_utc()) {
                println!("  Time difference: {}s", (new - old).num_seconds());
            }
        }
        _ => {}
    }
}

fn display(value: &Option<StateValue>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = MonitorConfig::new(&args.endpoint, &args.token);
    config.stop_on_auth_failure = args.stop_on_auth_failure;

    let observability = ObservabilityConfig::new("hassmon")
        .with_traces(args.otlp)
        .with_metrics(args.otlp)
        .with_json_logs(false)
        .with_log_level(&args.log_level);

    let mut builder = MonitorBuilder::from_config(config)
        .reconnect_delay(Duration::from_secs(args.reconnect_delay))
        .with_observability(observability);
    if let Some(ref tz) = args.timezone {
        builder = builder.timezone_name(tz);
    }
    for arg in &args.entities {
        let (entity_id, type_name) = parse_entity(arg);
        builder = builder.entity_typed(entity_id, type_name);
    }

    let json = args.json;
    let mut monitor = builder
        .on_state_change(move |event| async move {
            if json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                print_event(&event);
            }
            Ok::<(), CallbackError>(())
        })
        .build()?;

    monitor.start()?;
    tracing::info!(url = %monitor.url(), "Monitoring, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    monitor.stop().await;

    hassmon::core::shutdown_observability();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity() {
        assert_eq!(parse_entity("sensor.temp=numeric"), ("sensor.temp", "numeric"));
        assert_eq!(parse_entity(" sun.sun = str "), ("sun.sun", "str"));
        assert_eq!(parse_entity("light.hall"), ("light.hall", "str"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "hassmon",
            "--endpoint",
            "ha:8123",
            "--token",
            "secret",
            "--json",
            "sensor.a=numeric",
            "sensor.b=bool",
        ])
        .unwrap();
        assert_eq!(args.entities, vec!["sensor.a=numeric", "sensor.b=bool"]);
        assert_eq!(args.reconnect_delay, 5);
        assert!(args.json);
        assert!(!args.stop_on_auth_failure);
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&None), "-");
        assert_eq!(display(&Some(StateValue::Numeric(21.5))), "21.5");
    }
}

//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
mod metrics;

pub use self::logging::{init_logging, LogFormat};
pub use self::metrics::{
    increment, init_metrics, record_error, record_tick_duration, set_gauge, CounterMetric,
    GaugeMetric,
};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
///
/// Must run inside a Tokio runtime when metrics are enabled.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level, config.log_format)?;

    if config.metrics_enabled {
        init_metrics(config.metrics_port)?;
    }

    Ok(())
}

//! Prometheus metrics
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the engine records unconditionally.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMetric {
    /// Completed scheduler ticks
    Ticks,
    /// Probabilities at or above the entry threshold
    Signals,
    /// Paper positions opened
    PositionsOpened,
    /// Paper positions closed
    PositionsClosed,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeMetric {
    /// Open position count across events
    OpenPositions,
    /// Events still being polled
    ActiveEvents,
    /// Session realized P&L
    RealizedPnl,
}

impl CounterMetric {
    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::Ticks => "scoreline_ticks_total",
            CounterMetric::Signals => "scoreline_signals_total",
            CounterMetric::PositionsOpened => "scoreline_positions_opened_total",
            CounterMetric::PositionsClosed => "scoreline_positions_closed_total",
        }
    }
}

impl GaugeMetric {
    pub fn name(&self) -> &'static str {
        match self {
            GaugeMetric::OpenPositions => "scoreline_open_positions",
            GaugeMetric::ActiveEvents => "scoreline_active_events",
            GaugeMetric::RealizedPnl => "scoreline_realized_pnl_usd",
        }
    }
}

/// Increment a counter
pub fn increment(metric: CounterMetric, by: u64) {
    metrics::counter!(metric.name()).increment(by);
}

/// Count a recoverable error by kind
pub fn record_error(kind: &'static str) {
    metrics::counter!("scoreline_errors_total", "kind" => kind).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Record how long a tick took
pub fn record_tick_duration(duration: Duration) {
    metrics::histogram!("scoreline_tick_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Install the Prometheus recorder and its scrape endpoint
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}

//! Per-tick status line

use crate::error::Error;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use std::collections::BTreeMap;
use std::time::Duration;

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub events_polled: usize,
    pub samples_appended: usize,
    pub signals: usize,
    pub positions_opened: usize,
    pub positions_closed: usize,
    /// Recoverable errors by kind
    pub errors: BTreeMap<&'static str, usize>,
    pub active_events: usize,
    pub open_positions: usize,
    pub duration: Duration,
}

impl TickReport {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Count a recoverable error against this tick
    pub fn record_error(&mut self, error: &Error) {
        let kind = error.kind();
        *self.errors.entry(kind).or_default() += 1;
        telemetry::record_error(kind);
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().sum()
    }

    /// Emit the status line and publish tick metrics
    pub fn publish(&self) {
        telemetry::increment(CounterMetric::Ticks, 1);
        telemetry::increment(CounterMetric::Signals, self.signals as u64);
        telemetry::increment(CounterMetric::PositionsOpened, self.positions_opened as u64);
        telemetry::increment(CounterMetric::PositionsClosed, self.positions_closed as u64);
        telemetry::set_gauge(GaugeMetric::ActiveEvents, self.active_events as f64);
        telemetry::set_gauge(GaugeMetric::OpenPositions, self.open_positions as f64);
        telemetry::record_tick_duration(self.duration);

        tracing::info!(
            tick = self.tick,
            polled = self.events_polled,
            appended = self.samples_appended,
            signals = self.signals,
            opened = self.positions_opened,
            closed = self.positions_closed,
            errors = self.error_count(),
            error_kinds = ?self.errors,
            active_events = self.active_events,
            open_positions = self.open_positions,
            elapsed_ms = self.duration.as_millis() as u64,
            "Tick complete"
        );
    }
}

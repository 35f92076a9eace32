//! Persistence module
//!
//! Write-only sink for samples, signals, trades and the session summary.
//! Recording never blocks or fails the trading loop; a rejected record is a
//! [`PersistenceFailure`](crate::Error::PersistenceFailure) the caller logs.

mod parquet;
mod recorder;

pub use self::parquet::{ParquetReader, ParquetWriter};
pub use recorder::{DataRecorder, RecorderStats};

use crate::engine::SessionSummary;
use crate::error::Result;
use crate::feed::{EventSnapshot, Sample};
use crate::position::{Side, Trade};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A probability at or above the entry threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub event_id: String,
    pub side: Side,
    pub probability: f64,
    /// Held-contract price when the signal fired
    pub price: Decimal,
    /// Whether a position was opened
    pub accepted: bool,
    pub predicted_hold_minutes: Option<u32>,
    /// Why an unaccepted signal was discarded
    pub reason: Option<String>,
}

/// Fire-and-forget persistence collaborator
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    fn record_sample(&self, sample: &Sample) -> Result<()>;

    /// Last game state of a settled event
    fn record_snapshot(&self, snapshot: &EventSnapshot) -> Result<()>;

    fn record_signal(&self, signal: &SignalRecord) -> Result<()>;

    fn record_trade(&self, trade: &Trade) -> Result<()>;

    fn record_session(&self, summary: &SessionSummary) -> Result<()>;

    /// Flush everything buffered and stop accepting records
    async fn close(&self) -> Result<()>;
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    fn record_sample(&self, _sample: &Sample) -> Result<()> {
        Ok(())
    }

    fn record_snapshot(&self, _snapshot: &EventSnapshot) -> Result<()> {
        Ok(())
    }

    fn record_signal(&self, _signal: &SignalRecord) -> Result<()> {
        Ok(())
    }

    fn record_trade(&self, _trade: &Trade) -> Result<()> {
        Ok(())
    }

    fn record_session(&self, _summary: &SessionSummary) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

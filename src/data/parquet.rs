//! Parquet writer and reader for session records
//!
//! Decimals are stored as strings to keep their exact precision.

use super::SignalRecord;
use crate::engine::SessionSummary;
use crate::feed::{EventSnapshot, EventStatus, Quote, Sample};
use crate::position::Trade;
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn timestamp_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )
}

fn timestamps<I: IntoIterator<Item = DateTime<Utc>>>(values: I) -> ArrayRef {
    let micros: Vec<i64> = values.into_iter().map(|t| t.timestamp_micros()).collect();
    Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))
}

fn strings<S: AsRef<str>, I: IntoIterator<Item = S>>(values: I) -> ArrayRef {
    let owned: Vec<String> = values.into_iter().map(|s| s.as_ref().to_string()).collect();
    Arc::new(StringArray::from(owned))
}

fn decimals<I: IntoIterator<Item = Decimal>>(values: I) -> ArrayRef {
    strings(values.into_iter().map(|d| d.to_string()))
}

/// Quote + game state sample schema
pub fn sample_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("event_id", DataType::Utf8, false),
        Field::new("bid", DataType::Utf8, false),
        Field::new("ask", DataType::Utf8, false),
        Field::new("mid", DataType::Utf8, false),
        timestamp_field("state_timestamp"),
        Field::new("score_home", DataType::UInt32, false),
        Field::new("score_away", DataType::UInt32, false),
        Field::new("period", DataType::UInt32, false),
        Field::new("clock_remaining_secs", DataType::Float64, false),
        Field::new("status", DataType::Utf8, false),
    ])
}

/// Game state snapshot schema (final snapshots)
pub fn snapshot_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("event_id", DataType::Utf8, false),
        Field::new("score_home", DataType::UInt32, false),
        Field::new("score_away", DataType::UInt32, false),
        Field::new("period", DataType::UInt32, false),
        Field::new("clock_remaining_secs", DataType::Float64, false),
        Field::new("status", DataType::Utf8, false),
    ])
}

/// Signal schema
pub fn signal_schema() -> Schema {
    Schema::new(vec![
        timestamp_field("timestamp"),
        Field::new("event_id", DataType::Utf8, false),
        Field::new("side", DataType::Utf8, false),
        Field::new("probability", DataType::Float64, false),
        Field::new("price", DataType::Utf8, false),
        Field::new("accepted", DataType::Boolean, false),
        Field::new("predicted_hold_minutes", DataType::UInt32, true),
        Field::new("reason", DataType::Utf8, true),
    ])
}

/// Closed trade schema
pub fn trade_schema() -> Schema {
    Schema::new(vec![
        Field::new("position_id", DataType::Utf8, false),
        Field::new("event_id", DataType::Utf8, false),
        Field::new("side", DataType::Utf8, false),
        timestamp_field("entry_time"),
        timestamp_field("exit_time"),
        Field::new("entry_price", DataType::Utf8, false),
        Field::new("exit_price", DataType::Utf8, false),
        Field::new("contracts", DataType::UInt32, false),
        Field::new("gross_pnl", DataType::Utf8, false),
        Field::new("entry_fee", DataType::Utf8, false),
        Field::new("exit_fee", DataType::Utf8, false),
        Field::new("net_pnl", DataType::Utf8, false),
        Field::new("won", DataType::Boolean, false),
        Field::new("exit_override", DataType::Boolean, false),
        Field::new("exit_reason", DataType::Utf8, false),
        Field::new("probability", DataType::Float64, false),
        Field::new("predicted_hold_minutes", DataType::UInt32, false),
    ])
}

/// Session summary schema
pub fn session_schema() -> Schema {
    Schema::new(vec![
        Field::new("session_id", DataType::Utf8, false),
        timestamp_field("started_at"),
        timestamp_field("ended_at"),
        Field::new("events_monitored", DataType::UInt64, false),
        Field::new("ticks", DataType::UInt64, false),
        Field::new("signals", DataType::UInt64, false),
        Field::new("discarded_signals", DataType::UInt64, false),
        Field::new("trades", DataType::UInt64, false),
        Field::new("wins", DataType::UInt64, false),
        Field::new("losses", DataType::UInt64, false),
        Field::new("gross_pnl", DataType::Utf8, false),
        Field::new("total_fees", DataType::Utf8, false),
        Field::new("net_pnl", DataType::Utf8, false),
        Field::new("overrides_used", DataType::UInt64, false),
    ])
}

/// Writes one Parquet file per flush
pub struct ParquetWriter {
    output_dir: PathBuf,
    /// Disambiguates files flushed within the same second
    sequence: AtomicU64,
}

impl ParquetWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            sequence: AtomicU64::new(0),
        }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Next file path for a prefix
    pub fn file_path(&self, prefix: &str, timestamp: DateTime<Utc>) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let filename = format!(
            "{}_{}_{:04}.parquet",
            prefix,
            timestamp.format("%Y%m%d_%H%M%S"),
            seq
        );
        self.output_dir.join(filename)
    }

    fn write_batch(&self, path: &Path, schema: Schema, columns: Vec<ArrayRef>) -> anyhow::Result<()> {
        self.ensure_dir()?;

        let schema = Arc::new(schema);
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        let batch = RecordBatch::try_new(schema, columns)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write quote samples
    pub fn write_samples(&self, path: &Path, samples: &[Sample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            timestamps(samples.iter().map(|s| s.quote.timestamp)),
            strings(samples.iter().map(|s| s.quote.event_id.as_str())),
            decimals(samples.iter().map(|s| s.quote.bid)),
            decimals(samples.iter().map(|s| s.quote.ask)),
            decimals(samples.iter().map(|s| s.quote.mid)),
            timestamps(samples.iter().map(|s| s.snapshot.timestamp)),
            Arc::new(UInt32Array::from_iter_values(samples.iter().map(|s| s.snapshot.score_home))),
            Arc::new(UInt32Array::from_iter_values(samples.iter().map(|s| s.snapshot.score_away))),
            Arc::new(UInt32Array::from_iter_values(samples.iter().map(|s| s.snapshot.period))),
            Arc::new(Float64Array::from_iter_values(
                samples.iter().map(|s| s.snapshot.clock_remaining.as_secs_f64()),
            )),
            strings(samples.iter().map(|s| s.snapshot.status.as_str())),
        ];
        self.write_batch(path, sample_schema(), columns)?;
        tracing::debug!(path = ?path, count = samples.len(), "Wrote samples to Parquet");
        Ok(())
    }

    /// Write game state snapshots
    pub fn write_snapshots(&self, path: &Path, snapshots: &[EventSnapshot]) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            timestamps(snapshots.iter().map(|s| s.timestamp)),
            strings(snapshots.iter().map(|s| s.event_id.as_str())),
            Arc::new(UInt32Array::from_iter_values(snapshots.iter().map(|s| s.score_home))),
            Arc::new(UInt32Array::from_iter_values(snapshots.iter().map(|s| s.score_away))),
            Arc::new(UInt32Array::from_iter_values(snapshots.iter().map(|s| s.period))),
            Arc::new(Float64Array::from_iter_values(
                snapshots.iter().map(|s| s.clock_remaining.as_secs_f64()),
            )),
            strings(snapshots.iter().map(|s| s.status.as_str())),
        ];
        self.write_batch(path, snapshot_schema(), columns)?;
        tracing::debug!(path = ?path, count = snapshots.len(), "Wrote snapshots to Parquet");
        Ok(())
    }

    /// Write signal records
    pub fn write_signals(&self, path: &Path, signals: &[SignalRecord]) -> anyhow::Result<()> {
        if signals.is_empty() {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            timestamps(signals.iter().map(|s| s.timestamp)),
            strings(signals.iter().map(|s| s.event_id.as_str())),
            strings(signals.iter().map(|s| s.side.as_str())),
            Arc::new(Float64Array::from_iter_values(signals.iter().map(|s| s.probability))),
            decimals(signals.iter().map(|s| s.price)),
            Arc::new(BooleanArray::from(
                signals.iter().map(|s| s.accepted).collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                signals.iter().map(|s| s.predicted_hold_minutes).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                signals.iter().map(|s| s.reason.as_deref()).collect::<Vec<_>>(),
            )),
        ];
        self.write_batch(path, signal_schema(), columns)?;
        tracing::debug!(path = ?path, count = signals.len(), "Wrote signals to Parquet");
        Ok(())
    }

    /// Write closed trades
    pub fn write_trades(&self, path: &Path, trades: &[Trade]) -> anyhow::Result<()> {
        if trades.is_empty() {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            strings(trades.iter().map(|t| t.position_id.to_string())),
            strings(trades.iter().map(|t| t.event_id.as_str())),
            strings(trades.iter().map(|t| t.side.as_str())),
            timestamps(trades.iter().map(|t| t.entry_time)),
            timestamps(trades.iter().map(|t| t.exit_time)),
            decimals(trades.iter().map(|t| t.entry_price)),
            decimals(trades.iter().map(|t| t.exit_price)),
            Arc::new(UInt32Array::from_iter_values(trades.iter().map(|t| t.contracts))),
            decimals(trades.iter().map(|t| t.gross_pnl)),
            decimals(trades.iter().map(|t| t.entry_fee)),
            decimals(trades.iter().map(|t| t.exit_fee)),
            decimals(trades.iter().map(|t| t.net_pnl)),
            Arc::new(BooleanArray::from(trades.iter().map(|t| t.won).collect::<Vec<_>>())),
            Arc::new(BooleanArray::from(
                trades.iter().map(|t| t.exit_override).collect::<Vec<_>>(),
            )),
            strings(trades.iter().map(|t| t.exit_reason.as_str())),
            Arc::new(Float64Array::from_iter_values(trades.iter().map(|t| t.probability))),
            Arc::new(UInt32Array::from_iter_values(
                trades.iter().map(|t| t.predicted_hold_minutes),
            )),
        ];
        self.write_batch(path, trade_schema(), columns)?;
        tracing::debug!(path = ?path, count = trades.len(), "Wrote trades to Parquet");
        Ok(())
    }

    /// Write session summaries
    pub fn write_sessions(&self, path: &Path, sessions: &[SessionSummary]) -> anyhow::Result<()> {
        if sessions.is_empty() {
            return Ok(());
        }
        let counts = |f: fn(&SessionSummary) -> u64| -> ArrayRef {
            Arc::new(UInt64Array::from_iter_values(sessions.iter().map(f)))
        };
        let columns: Vec<ArrayRef> = vec![
            strings(sessions.iter().map(|s| s.session_id.to_string())),
            timestamps(sessions.iter().map(|s| s.started_at)),
            timestamps(sessions.iter().map(|s| s.ended_at)),
            counts(|s| s.events_monitored as u64),
            counts(|s| s.ticks),
            counts(|s| s.signals),
            counts(|s| s.discarded_signals),
            counts(|s| s.trades),
            counts(|s| s.wins),
            counts(|s| s.losses),
            decimals(sessions.iter().map(|s| s.gross_pnl)),
            decimals(sessions.iter().map(|s| s.total_fees)),
            decimals(sessions.iter().map(|s| s.net_pnl)),
            counts(|s| s.overrides_used),
        ];
        self.write_batch(path, session_schema(), columns)?;
        tracing::debug!(path = ?path, count = sessions.len(), "Wrote session summary to Parquet");
        Ok(())
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Invalid {} column", name))
}

fn micros(value: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value).ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))
}

fn parse_status(raw: &str) -> anyhow::Result<EventStatus> {
    match raw {
        "scheduled" => Ok(EventStatus::Scheduled),
        "live" => Ok(EventStatus::Live),
        "final" => Ok(EventStatus::Final),
        other => Err(anyhow::anyhow!("Invalid status {}", other)),
    }
}

/// Reader for recorded sample files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read samples written by [`ParquetWriter::write_samples`]
    pub fn read_samples(&self) -> anyhow::Result<Vec<Sample>> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut samples = Vec::new();
        for batch in reader {
            let batch = batch?;
            let ts = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
            let event_ids = column::<StringArray>(&batch, "event_id")?;
            let bids = column::<StringArray>(&batch, "bid")?;
            let asks = column::<StringArray>(&batch, "ask")?;
            let mids = column::<StringArray>(&batch, "mid")?;
            let state_ts = column::<TimestampMicrosecondArray>(&batch, "state_timestamp")?;
            let home = column::<UInt32Array>(&batch, "score_home")?;
            let away = column::<UInt32Array>(&batch, "score_away")?;
            let period = column::<UInt32Array>(&batch, "period")?;
            let clock = column::<Float64Array>(&batch, "clock_remaining_secs")?;
            let status = column::<StringArray>(&batch, "status")?;

            for i in 0..batch.num_rows() {
                let event_id = event_ids.value(i).to_string();
                let clock_secs = clock.value(i);
                if !clock_secs.is_finite() || clock_secs < 0.0 {
                    return Err(anyhow::anyhow!("Invalid clock {}", clock_secs));
                }
                samples.push(Sample {
                    quote: Quote {
                        event_id: event_id.clone(),
                        timestamp: micros(ts.value(i))?,
                        bid: Decimal::from_str(bids.value(i))?,
                        ask: Decimal::from_str(asks.value(i))?,
                        mid: Decimal::from_str(mids.value(i))?,
                    },
                    snapshot: EventSnapshot {
                        event_id,
                        timestamp: micros(state_ts.value(i))?,
                        score_home: home.value(i),
                        score_away: away.value(i),
                        period: period.value(i),
                        clock_remaining: Duration::from_secs_f64(clock_secs),
                        status: parse_status(status.value(i))?,
                    },
                });
            }
        }

        Ok(samples)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

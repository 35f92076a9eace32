//! Channel-backed Parquet recorder
//!
//! Callers hand records to a bounded channel with `try_send`; a single
//! writer task buffers them per kind and flushes on size, on an interval,
//! and on close. A full channel drops the record instead of blocking.

use super::parquet::ParquetWriter;
use super::{PersistenceSink, SignalRecord};
use crate::config::DataConfig;
use crate::engine::SessionSummary;
use crate::error::{Error, Result};
use crate::feed::{EventSnapshot, Sample};
use crate::position::Trade;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

enum Record {
    Sample(Sample),
    Snapshot(EventSnapshot),
    Signal(SignalRecord),
    Trade(Trade),
    Session(SessionSummary),
    Close(oneshot::Sender<()>),
}

/// Recording statistics
#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub records_received: u64,
    pub records_written: u64,
    pub records_dropped: u64,
    pub files_written: u64,
    pub write_errors: u64,
    pub last_flush: Option<chrono::DateTime<Utc>>,
}

#[derive(Default)]
struct Buffers {
    samples: Vec<Sample>,
    snapshots: Vec<EventSnapshot>,
    signals: Vec<SignalRecord>,
    trades: Vec<Trade>,
    sessions: Vec<SessionSummary>,
}

impl Buffers {
    fn push(&mut self, record: Record) {
        match record {
            Record::Sample(r) => self.samples.push(r),
            Record::Snapshot(r) => self.snapshots.push(r),
            Record::Signal(r) => self.signals.push(r),
            Record::Trade(r) => self.trades.push(r),
            Record::Session(r) => self.sessions.push(r),
            Record::Close(_) => {}
        }
    }

    fn largest(&self) -> usize {
        [
            self.samples.len(),
            self.snapshots.len(),
            self.signals.len(),
            self.trades.len(),
            self.sessions.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    async fn flush_all(&mut self, writer: &ParquetWriter, stats: &RwLock<RecorderStats>) {
        flush(&mut self.samples, "samples", writer, stats, ParquetWriter::write_samples).await;
        flush(&mut self.snapshots, "final_snapshots", writer, stats, ParquetWriter::write_snapshots).await;
        flush(&mut self.signals, "signals", writer, stats, ParquetWriter::write_signals).await;
        flush(&mut self.trades, "trades", writer, stats, ParquetWriter::write_trades).await;
        flush(&mut self.sessions, "sessions", writer, stats, ParquetWriter::write_sessions).await;
    }
}

/// Write one buffer to a new file and clear it
async fn flush<T>(
    buffer: &mut Vec<T>,
    prefix: &str,
    writer: &ParquetWriter,
    stats: &RwLock<RecorderStats>,
    write: fn(&ParquetWriter, &Path, &[T]) -> anyhow::Result<()>,
) {
    if buffer.is_empty() {
        return;
    }

    let now = Utc::now();
    let path = writer.file_path(prefix, now);
    let count = buffer.len();

    match write(writer, &path, buffer) {
        Ok(()) => {
            let mut s = stats.write().await;
            s.records_written += count as u64;
            s.files_written += 1;
            s.last_flush = Some(now);
            tracing::debug!(count, path = ?path, "Flushed {}", prefix);
        }
        Err(e) => {
            stats.write().await.write_errors += 1;
            crate::telemetry::record_error("persistence_failure");
            tracing::error!(error = %e, count, "Failed to write {}", prefix);
        }
    }

    buffer.clear();
}

/// Records session data to Parquet files
pub struct DataRecorder {
    output_dir: PathBuf,
    tx: mpsc::Sender<Record>,
    stats: Arc<RwLock<RecorderStats>>,
    dropped: AtomicU64,
}

impl DataRecorder {
    /// Create a recorder and spawn its writer task
    pub fn new(config: DataConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let writer = ParquetWriter::new(config.output_dir.clone());
        let writer_stats = stats.clone();
        let writer_config = config.clone();
        tokio::spawn(async move {
            Self::run_writer(rx, writer, writer_config, writer_stats).await;
        });

        Self {
            output_dir: config.output_dir,
            tx,
            stats,
            dropped: AtomicU64::new(0),
        }
    }

    async fn run_writer(
        mut rx: mpsc::Receiver<Record>,
        writer: ParquetWriter,
        config: DataConfig,
        stats: Arc<RwLock<RecorderStats>>,
    ) {
        let mut buffers = Buffers::default();
        let mut interval = tokio::time::interval(Duration::from_secs(config.flush_interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                record = rx.recv() => {
                    match record {
                        Some(Record::Close(ack)) => {
                            buffers.flush_all(&writer, &stats).await;
                            let _ = ack.send(());
                            tracing::info!("Recorder closed");
                            break;
                        }
                        Some(record) => {
                            stats.write().await.records_received += 1;
                            buffers.push(record);
                            if buffers.largest() >= config.buffer_size {
                                buffers.flush_all(&writer, &stats).await;
                            }
                        }
                        None => {
                            buffers.flush_all(&writer, &stats).await;
                            tracing::info!("Recorder channel dropped, writer shutting down");
                            break;
                        }
                    }
                }

                _ = interval.tick() => {
                    buffers.flush_all(&writer, &stats).await;
                }
            }
        }
    }

    fn send(&self, record: Record) -> Result<()> {
        self.tx.try_send(record).map_err(|e| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "recorder channel full, record dropped",
                mpsc::error::TrySendError::Closed(_) => "recorder closed, record dropped",
            };
            Error::PersistenceFailure(reason.to_string())
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Get current statistics
    pub async fn stats(&self) -> RecorderStats {
        let mut stats = self.stats.read().await.clone();
        stats.records_dropped = self.dropped.load(Ordering::Relaxed);
        stats
    }
}

#[async_trait]
impl PersistenceSink for DataRecorder {
    fn record_sample(&self, sample: &Sample) -> Result<()> {
        self.send(Record::Sample(sample.clone()))
    }

    fn record_snapshot(&self, snapshot: &EventSnapshot) -> Result<()> {
        self.send(Record::Snapshot(snapshot.clone()))
    }

    fn record_signal(&self, signal: &SignalRecord) -> Result<()> {
        self.send(Record::Signal(signal.clone()))
    }

    fn record_trade(&self, trade: &Trade) -> Result<()> {
        self.send(Record::Trade(trade.clone()))
    }

    fn record_session(&self, summary: &SessionSummary) -> Result<()> {
        self.send(Record::Session(summary.clone()))
    }

    async fn close(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Record::Close(ack_tx))
            .await
            .map_err(|_| Error::PersistenceFailure("recorder already closed".to_string()))?;
        ack_rx
            .await
            .map_err(|_| Error::PersistenceFailure("writer exited before flushing".to_string()))
    }
}

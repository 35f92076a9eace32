//! Recording a replayed session to Parquet and reading it back

use crate::common::*;
use rust_decimal_macros::dec;
use scoreline::config::DataConfig;
use scoreline::data::{DataRecorder, ParquetReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn files_with_prefix(dir: &TempDir, prefix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_replayed_session_is_recorded() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(DataRecorder::new(DataConfig {
        capture_enabled: true,
        output_dir: dir.path().to_path_buf(),
        buffer_size: 1_000,
        flush_interval_secs: 3_600,
        channel_capacity: 1_000,
    }));

    let mut samples = flat_game("g1", 0..=15, dec!(0.50));
    samples.extend(flat_game("g1", 16..=23, dec!(0.55)));
    let scheduler = replay_scheduler(
        &config(),
        samples.clone(),
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
        8,
        recorder.clone(),
    )
    .with_tick_interval(Duration::ZERO);

    let summary = scheduler.run(CancellationToken::new()).await;
    assert_eq!(summary.trades, 1);

    let sample_files = files_with_prefix(&dir, "samples_");
    assert_eq!(sample_files.len(), 1);
    let read_back = ParquetReader::new(sample_files[0].clone()).read_samples().unwrap();
    assert_eq!(read_back, samples);

    for prefix in ["signals_", "trades_", "sessions_", "final_snapshots_"] {
        assert_eq!(files_with_prefix(&dir, prefix).len(), 1, "missing {} file", prefix);
    }

    let stats = recorder.stats().await;
    assert_eq!(stats.records_dropped, 0);
    assert_eq!(stats.write_errors, 0);
    // 24 samples, 1 final snapshot, 1 signal, 1 trade, 1 session
    assert_eq!(stats.records_written, 28);
}

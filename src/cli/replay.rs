//! Replay command implementation

use super::{build_sink, cancel_on_ctrl_c};
use crate::config::Config;
use crate::data::ParquetReader;
use crate::engine::{Collaborators, Scheduler};
use crate::feed::{EventDescriptor, ReplayFeed, Sample};
use crate::model::build_models;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Recorded samples Parquet files
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Record the replayed session like a live one
    #[arg(long)]
    pub capture: bool,
}

impl ReplayArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        let mut samples: Vec<Sample> = Vec::new();
        for path in &self.input {
            let loaded = ParquetReader::new(path.clone()).read_samples()?;
            tracing::info!(path = ?path, count = loaded.len(), "Loaded samples");
            samples.extend(loaded);
        }
        if samples.is_empty() {
            anyhow::bail!("No samples found in {:?}", self.input);
        }

        // Recorded data has no rate limits to respect
        config.engine.min_request_spacing_ms = 0;
        config.data.capture_enabled = self.capture;

        let feed = Arc::new(ReplayFeed::from_samples(samples));
        let events: Vec<EventDescriptor> = feed
            .event_ids()
            .await
            .into_iter()
            .map(|id| match config.events.iter().find(|e| e.id == id) {
                Some(configured) => EventDescriptor::from(configured),
                None => EventDescriptor::from_id(id),
            })
            .collect();

        let (classifier, estimator) = build_models(&config.model)?;
        let parts = Collaborators {
            market: feed.clone(),
            state: feed,
            classifier,
            estimator,
            sink: build_sink(&config.data),
        };

        tracing::info!(events = events.len(), "Starting replay");
        let scheduler = Scheduler::new(&config, events, parts)?.with_tick_interval(Duration::ZERO);
        let summary = scheduler.run(cancel_on_ctrl_c()).await;
        println!("{}", summary.format_table());
        Ok(())
    }
}

//! Run command implementation

use super::{build_sink, cancel_on_ctrl_c};
use crate::config::Config;
use crate::engine::{Collaborators, Scheduler};
use crate::feed::{EventDescriptor, HttpEventFeed, HttpMarketFeed};
use crate::model::build_models;
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many minutes
    #[arg(long)]
    pub max_minutes: Option<u64>,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if config.events.is_empty() {
            anyhow::bail!("No [[events]] configured");
        }
        if self.max_minutes.is_some() {
            config.engine.max_session_minutes = self.max_minutes;
        }

        let (classifier, estimator) = build_models(&config.model)?;
        let events: Vec<EventDescriptor> = config.events.iter().map(EventDescriptor::from).collect();
        let parts = Collaborators {
            market: Arc::new(HttpMarketFeed::new(&config.feed)?),
            state: Arc::new(HttpEventFeed::new(&config.feed)?),
            classifier,
            estimator,
            sink: build_sink(&config.data),
        };

        let scheduler = Scheduler::new(&config, events, parts)?;
        tracing::info!(
            events = config.events.len(),
            entry_threshold = config.decision.entry_threshold,
            contracts = config.decision.position_size_contracts,
            "Starting paper trading"
        );

        let summary = scheduler.run(cancel_on_ctrl_c()).await;
        println!("{}", summary.format_table());
        Ok(())
    }
}

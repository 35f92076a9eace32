//! Shared fixtures: scripted samples, fake models and a recording sink

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scoreline::config::Config;
use scoreline::data::{PersistenceSink, SignalRecord};
use scoreline::engine::{Collaborators, Scheduler, SessionSummary};
use scoreline::feed::{EventDescriptor, EventSnapshot, EventStatus, Quote, ReplayFeed, Sample};
use scoreline::model::{Classifier, FixedHoldEstimator, HoldEstimate, HoldEstimator};
use scoreline::position::Trade;
use scoreline::window::FeatureVector;
use scoreline::{Error, Result};
use std::sync::{Arc, Mutex};

pub fn t(minute: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minute)
}

/// One paired sample at `minute`
pub fn sample(
    event_id: &str,
    minute: i64,
    mid: Decimal,
    score: (u32, u32),
    period: u32,
    clock_secs: u64,
) -> Sample {
    Sample {
        quote: Quote::new(event_id, t(minute), mid, mid),
        snapshot: EventSnapshot {
            event_id: event_id.to_string(),
            timestamp: t(minute),
            score_home: score.0,
            score_away: score.1,
            period,
            clock_remaining: std::time::Duration::from_secs(clock_secs),
            status: EventStatus::Live,
        },
    }
}

/// Same sample with the game marked final
pub fn final_sample(event_id: &str, minute: i64, score: (u32, u32)) -> Sample {
    let mut s = sample(event_id, minute, dec!(0.50), score, 4, 0);
    s.snapshot.status = EventStatus::Final;
    s
}

/// Flat-priced second-quarter game, one sample a minute
pub fn flat_game(event_id: &str, minutes: std::ops::RangeInclusive<i64>, mid: Decimal) -> Vec<Sample> {
    minutes
        .map(|m| sample(event_id, m, mid, (30, 28), 2, 600))
        .collect()
}

/// Test configuration without request spacing
pub fn config() -> Config {
    let mut config = Config::default();
    config.engine.min_request_spacing_ms = 0;
    config
}

pub struct ConstantClassifier(pub f64);

#[async_trait]
impl Classifier for ConstantClassifier {
    async fn predict(&self, _features: &FeatureVector) -> Result<f64> {
        Ok(self.0)
    }
}

/// Fires only when the current price is at or below `max_price`
pub struct CheapEntryClassifier {
    pub max_price: f64,
}

#[async_trait]
impl Classifier for CheapEntryClassifier {
    async fn predict(&self, features: &FeatureVector) -> Result<f64> {
        Ok(if features.price <= self.max_price { 0.8 } else { 0.1 })
    }
}

pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn predict(&self, _features: &FeatureVector) -> Result<f64> {
        Err(Error::ModelInferenceFailure("model offline".into()))
    }
}

/// Keeps every record in memory
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<Sample>>,
    pub snapshots: Mutex<Vec<EventSnapshot>>,
    pub signals: Mutex<Vec<SignalRecord>>,
    pub trades: Mutex<Vec<Trade>>,
    pub sessions: Mutex<Vec<SessionSummary>>,
    pub closed: Mutex<bool>,
}

impl RecordingSink {
    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<SignalRecord> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    fn record_sample(&self, sample: &Sample) -> Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    fn record_snapshot(&self, snapshot: &EventSnapshot) -> Result<()> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn record_signal(&self, signal: &SignalRecord) -> Result<()> {
        self.signals.lock().unwrap().push(signal.clone());
        Ok(())
    }

    fn record_trade(&self, trade: &Trade) -> Result<()> {
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }

    fn record_session(&self, summary: &SessionSummary) -> Result<()> {
        self.sessions.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Sink that rejects everything
pub struct BrokenSink;

#[async_trait]
impl PersistenceSink for BrokenSink {
    fn record_sample(&self, _sample: &Sample) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }

    fn record_snapshot(&self, _snapshot: &EventSnapshot) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }

    fn record_signal(&self, _signal: &SignalRecord) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }

    fn record_trade(&self, _trade: &Trade) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }

    fn record_session(&self, _summary: &SessionSummary) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }

    async fn close(&self) -> Result<()> {
        Err(Error::PersistenceFailure("disk full".into()))
    }
}

/// Scheduler over recorded samples with a fixed hold estimate
pub fn replay_scheduler(
    config: &Config,
    samples: Vec<Sample>,
    classifier: Arc<dyn Classifier>,
    hold_minutes: u32,
    sink: Arc<dyn PersistenceSink>,
) -> Scheduler {
    let estimator: Arc<dyn HoldEstimator> = Arc::new(FixedHoldEstimator::new(hold_minutes));
    replay_scheduler_with(config, samples, classifier, estimator, sink)
}

pub fn replay_scheduler_with(
    config: &Config,
    samples: Vec<Sample>,
    classifier: Arc<dyn Classifier>,
    estimator: Arc<dyn HoldEstimator>,
    sink: Arc<dyn PersistenceSink>,
) -> Scheduler {
    let mut ids: Vec<String> = samples.iter().map(|s| s.event_id().to_string()).collect();
    ids.sort();
    ids.dedup();
    let feed = Arc::new(ReplayFeed::from_samples(samples));
    let parts = Collaborators {
        market: feed.clone(),
        state: feed,
        classifier,
        estimator,
        sink,
    };
    Scheduler::new(config, ids.into_iter().map(EventDescriptor::from_id).collect(), parts).unwrap()
}

pub struct BrokenEstimator;

#[async_trait]
impl HoldEstimator for BrokenEstimator {
    async fn estimate(&self, _features: &FeatureVector) -> Result<HoldEstimate> {
        Err(Error::ModelInferenceFailure("estimator offline".into()))
    }
}

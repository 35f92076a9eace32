//! Feed states as seen through the scheduler

use crate::common::*;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use scoreline::engine::{Collaborators, Scheduler};
use scoreline::feed::{
    EventDescriptor, EventSnapshot, EventStateFeed, FeedResponse, MarketFeed, Quote, Sample,
};
use scoreline::model::{Classifier, FixedHoldEstimator};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-event queues of canned responses
#[derive(Default)]
struct ScriptedFeed {
    quotes: Mutex<HashMap<String, VecDeque<FeedResponse<Quote>>>>,
    states: Mutex<HashMap<String, VecDeque<FeedResponse<EventSnapshot>>>>,
}

impl ScriptedFeed {
    fn state(self, event_id: &str, response: FeedResponse<EventSnapshot>) -> Self {
        self.states
            .lock()
            .unwrap()
            .entry(event_id.to_string())
            .or_default()
            .push_back(response);
        self
    }

    fn quote(self, event_id: &str, response: FeedResponse<Quote>) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .entry(event_id.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Both feeds ready with the sample at `minute`
    fn ready(self, event_id: &str, minute: i64) -> Self {
        self.paired(sample(event_id, minute, dec!(0.50), (10, 8), 1, 600))
    }

    fn paired(self, s: Sample) -> Self {
        let event_id = s.event_id().to_string();
        self.state(&event_id, FeedResponse::Ready(s.snapshot))
            .quote(&event_id, FeedResponse::Ready(s.quote))
    }
}

fn next<T>(queues: &Mutex<HashMap<String, VecDeque<FeedResponse<T>>>>, id: &str) -> FeedResponse<T> {
    queues
        .lock()
        .unwrap()
        .get_mut(id)
        .and_then(|q| q.pop_front())
        .unwrap_or(FeedResponse::TransientError("script exhausted".into()))
}

#[async_trait]
impl MarketFeed for ScriptedFeed {
    async fn fetch_quote(&self, event: &EventDescriptor) -> FeedResponse<Quote> {
        next(&self.quotes, &event.id)
    }
}

#[async_trait]
impl EventStateFeed for ScriptedFeed {
    async fn fetch_state(&self, event: &EventDescriptor) -> FeedResponse<EventSnapshot> {
        next(&self.states, &event.id)
    }
}

fn scheduler(feed: ScriptedFeed, events: Vec<EventDescriptor>) -> Scheduler {
    scheduler_with(feed, events, Arc::new(ConstantClassifier(0.10)))
}

fn scheduler_with(
    feed: ScriptedFeed,
    events: Vec<EventDescriptor>,
    classifier: Arc<dyn Classifier>,
) -> Scheduler {
    let feed = Arc::new(feed);
    let parts = Collaborators {
        market: feed.clone(),
        state: feed,
        classifier,
        estimator: Arc::new(FixedHoldEstimator::new(8)),
        sink: Arc::new(RecordingSink::default()),
    };
    Scheduler::new(&config(), events, parts).unwrap()
}

#[tokio::test]
async fn test_rate_limited_event_backs_off() {
    let feed = ScriptedFeed::default().state(
        "g1",
        FeedResponse::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        },
    );
    let mut scheduler = scheduler(feed, vec![EventDescriptor::from_id("g1")]);

    let first = scheduler.run_tick().await;
    assert_eq!(first.errors.get("rate_limited"), Some(&1));

    // Still inside the backoff, so the feed is not asked again
    let second = scheduler.run_tick().await;
    assert_eq!(second.error_count(), 0);
    assert_eq!(second.samples_appended, 0);
    assert_eq!(scheduler.active_events(), vec!["g1"]);
}

#[tokio::test]
async fn test_failure_isolated_to_event() {
    let feed = ScriptedFeed::default()
        .state("g1", FeedResponse::TransientError("502".into()))
        .ready("g2", 0);
    let mut scheduler = scheduler(
        feed,
        vec![EventDescriptor::from_id("g1"), EventDescriptor::from_id("g2")],
    );

    let report = scheduler.run_tick().await;

    assert_eq!(report.events_polled, 2);
    assert_eq!(report.samples_appended, 1);
    assert_eq!(report.errors.get("data_unavailable"), Some(&1));
    assert_eq!(scheduler.window("g1").map(|w| w.len()), Some(0));
    assert_eq!(scheduler.window("g2").map(|w| w.len()), Some(1));
}

#[tokio::test]
async fn test_malformed_response_counted() {
    let feed = ScriptedFeed::default()
        .state("g1", FeedResponse::Malformed("bad clock".into()));
    let mut scheduler = scheduler(feed, vec![EventDescriptor::from_id("g1")]);

    let report = scheduler.run_tick().await;
    assert_eq!(report.errors.get("malformed_feed_response"), Some(&1));
    assert_eq!(report.samples_appended, 0);
}

#[tokio::test]
async fn test_not_yet_available_is_silent() {
    let feed = ScriptedFeed::default().state("g1", FeedResponse::NotYetAvailable);
    let mut scheduler = scheduler(feed, vec![EventDescriptor::from_id("g1")]);

    let report = scheduler.run_tick().await;
    assert_eq!(report.events_polled, 1);
    assert_eq!(report.error_count(), 0);
    assert_eq!(scheduler.active_events(), vec!["g1"]);
}

#[tokio::test]
async fn test_pre_game_event_not_polled() {
    let mut descriptor = EventDescriptor::from_id("g1");
    descriptor.start_time = Some(Utc::now() + chrono::Duration::hours(2));
    let mut scheduler = scheduler(ScriptedFeed::default(), vec![descriptor]);

    let report = scheduler.run_tick().await;
    assert_eq!(report.events_polled, 0);
    assert_eq!(report.error_count(), 0);
    assert_eq!(scheduler.active_events(), vec!["g1"]);
}

#[tokio::test]
async fn test_stale_sample_not_appended() {
    let feed = ScriptedFeed::default().ready("g1", 0).ready("g1", 0).ready("g1", 1);
    let mut scheduler = scheduler(feed, vec![EventDescriptor::from_id("g1")]);

    assert_eq!(scheduler.run_tick().await.samples_appended, 1);
    assert_eq!(scheduler.run_tick().await.samples_appended, 0);
    assert_eq!(scheduler.run_tick().await.samples_appended, 1);
    assert_eq!(scheduler.window("g1").map(|w| w.len()), Some(2));
}

#[tokio::test]
async fn test_market_settled_retires_idle_event() {
    let feed = ScriptedFeed::default()
        .ready("g1", 0)
        .ready("g1", 1)
        .quote("g1", FeedResponse::Settled);
    let feed = feed.state("g1", FeedResponse::Ready(sample("g1", 2, dec!(0.50), (12, 8), 1, 500).snapshot));
    let mut scheduler = scheduler(feed, vec![EventDescriptor::from_id("g1")]);

    scheduler.run_tick().await;
    scheduler.run_tick().await;
    assert_eq!(scheduler.active_events(), vec!["g1"]);

    scheduler.run_tick().await;
    assert!(scheduler.active_events().is_empty());
}

#[tokio::test]
async fn test_exit_rules_ignore_scores_without_a_fresh_quote() {
    let mut feed = ScriptedFeed::default();
    for s in flat_game("g1", 0..=15, dec!(0.50)) {
        feed = feed.paired(s);
    }
    // Rich price, but the game is not yet in its final period
    feed = feed.paired(sample("g1", 16, dec!(0.96), (95, 70), 2, 600));
    // Late blowout arrives while the market call fails
    let late = sample("g1", 17, dec!(0.96), (95, 70), 4, 120);
    feed = feed
        .state("g1", FeedResponse::Ready(late.snapshot))
        .quote("g1", FeedResponse::TransientError("502".into()));

    let mut scheduler = scheduler_with(
        feed,
        vec![EventDescriptor::from_id("g1")],
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
    );
    for _ in 0..17 {
        scheduler.run_tick().await;
    }
    let book = scheduler.book("g1").unwrap();
    assert_eq!(book.open_count(), 1);
    assert!(!book.positions()[0].exit_override);

    let report = scheduler.run_tick().await;
    assert_eq!(report.errors.get("data_unavailable"), Some(&1));
    assert_eq!(report.positions_closed, 0);
    let book = scheduler.book("g1").unwrap();
    assert_eq!(book.open_count(), 1);
    assert!(!book.positions()[0].exit_override);
}

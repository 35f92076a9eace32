//! Per-event feed synchronization
//!
//! One call per event per tick: poll game state, then the market, and
//! append the paired sample to the event's window when it is new. Every
//! feed state maps onto a [`SyncOutcome`]; nothing here can fail the tick.

use super::spacer::RequestSpacer;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::feed::{
    Event, EventSnapshot, EventStateFeed, EventStatus, FeedResponse, MarketFeed, Sample,
};
use crate::window::FeatureWindow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-event polling state
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    backoff_until: Option<Instant>,
    consecutive_rate_limits: u32,
    settled: bool,
}

impl SyncState {
    /// Event resolved; polling has stopped
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    pub fn consecutive_rate_limits(&self) -> u32 {
        self.consecutive_rate_limits
    }
}

/// Result of synchronizing one event
#[derive(Debug)]
pub enum SyncOutcome {
    /// New sample appended to the window
    Appended(Sample),
    /// Feeds answered but nothing newer than the window
    Duplicate,
    /// Pre-game
    NotYetAvailable,
    /// Event resolved this tick; carries the final snapshot
    Settled(EventSnapshot),
    /// Skipped, still inside a rate-limit backoff
    BackingOff,
    /// Rate limited this tick; next poll after `retry_in`
    RateLimited { retry_in: Duration },
    /// Recoverable failure for this event this tick
    Failed(Error),
}

/// Polls both feeds for an event
pub struct EventSynchronizer {
    market: Arc<dyn MarketFeed>,
    state: Arc<dyn EventStateFeed>,
    spacer: Arc<RequestSpacer>,
    base_backoff: Duration,
    max_backoff: Duration,
}

enum Step<T> {
    Continue(T),
    Done(SyncOutcome),
}

impl EventSynchronizer {
    pub fn new(
        market: Arc<dyn MarketFeed>,
        state: Arc<dyn EventStateFeed>,
        spacer: Arc<RequestSpacer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            market,
            state,
            spacer,
            base_backoff: Duration::from_secs(config.rate_limit_backoff_seconds),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
        }
    }

    /// Backoff after the `n`th consecutive rate limit
    pub fn backoff_for(&self, retry_after: Option<Duration>, n: u32) -> Duration {
        match retry_after {
            Some(retry_after) => retry_after,
            None => {
                let factor = 2u32.saturating_pow(n.saturating_sub(1));
                self.base_backoff.saturating_mul(factor).min(self.max_backoff)
            }
        }
    }

    /// Synchronize one event
    pub async fn sync(
        &self,
        event: &mut Event,
        window: &mut FeatureWindow,
        state: &mut SyncState,
    ) -> SyncOutcome {
        if state.settled {
            return SyncOutcome::Duplicate;
        }
        if state.is_backing_off(Instant::now()) {
            return SyncOutcome::BackingOff;
        }

        self.spacer.acquire().await;
        let response = self.state.fetch_state(&event.descriptor).await;
        let snapshot = match self.accept(response, event, state) {
            Step::Continue(snapshot) => snapshot,
            Step::Done(outcome) => return outcome,
        };

        // Out-of-order state never replaces what the event already holds
        let snapshot = if event.apply(&snapshot) {
            if snapshot.status == EventStatus::Final {
                return Self::settle(event, state);
            }
            snapshot
        } else {
            event.snapshot()
        };

        self.spacer.acquire().await;
        let response = self.market.fetch_quote(&event.descriptor).await;
        let quote = match self.accept(response, event, state) {
            Step::Continue(quote) => quote,
            Step::Done(outcome) => return outcome,
        };

        state.consecutive_rate_limits = 0;
        state.backoff_until = None;

        if !quote.is_tradeable() {
            return SyncOutcome::Failed(Error::DataUnavailable {
                event_id: event.id().to_string(),
                reason: format!("quote not tradeable (bid {} ask {})", quote.bid, quote.ask),
            });
        }

        let sample = Sample { quote, snapshot };
        if window.push(sample.clone()) {
            SyncOutcome::Appended(sample)
        } else {
            SyncOutcome::Duplicate
        }
    }

    /// Map non-ready feed states onto outcomes
    fn accept<T>(&self, response: FeedResponse<T>, event: &mut Event, state: &mut SyncState) -> Step<T> {
        let event_id = event.id().to_string();
        match response {
            FeedResponse::Ready(value) => Step::Continue(value),
            FeedResponse::NotYetAvailable => Step::Done(SyncOutcome::NotYetAvailable),
            FeedResponse::Settled => Step::Done(Self::settle(event, state)),
            FeedResponse::RateLimited { retry_after } => {
                state.consecutive_rate_limits += 1;
                let retry_in = self.backoff_for(retry_after, state.consecutive_rate_limits);
                state.backoff_until = Some(Instant::now() + retry_in);
                tracing::warn!(
                    event_id = %event_id,
                    retry_in_secs = retry_in.as_secs(),
                    attempt = state.consecutive_rate_limits,
                    "Rate limited, backing off"
                );
                Step::Done(SyncOutcome::RateLimited { retry_in })
            }
            FeedResponse::TransientError(reason) => {
                Step::Done(SyncOutcome::Failed(Error::DataUnavailable { event_id, reason }))
            }
            FeedResponse::Malformed(detail) => {
                Step::Done(SyncOutcome::Failed(Error::MalformedFeedResponse { event_id, detail }))
            }
        }
    }

    fn settle(event: &mut Event, state: &mut SyncState) -> SyncOutcome {
        state.settled = true;
        state.backoff_until = None;
        event.status = EventStatus::Final;
        let snapshot = event.snapshot();
        tracing::info!(
            event_id = %event.id(),
            score_home = snapshot.score_home,
            score_away = snapshot.score_away,
            "Event settled, polling stopped"
        );
        SyncOutcome::Settled(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{EventDescriptor, Quote};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        quotes: Mutex<VecDeque<FeedResponse<Quote>>>,
        states: Mutex<VecDeque<FeedResponse<EventSnapshot>>>,
    }

    #[async_trait]
    impl MarketFeed for Scripted {
        async fn fetch_quote(&self, _event: &EventDescriptor) -> FeedResponse<Quote> {
            self.quotes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(FeedResponse::TransientError("script exhausted".into()))
        }
    }

    #[async_trait]
    impl EventStateFeed for Scripted {
        async fn fetch_state(&self, _event: &EventDescriptor) -> FeedResponse<EventSnapshot> {
            self.states
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(FeedResponse::TransientError("script exhausted".into()))
        }
    }

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap()
    }

    fn quote(minute: i64) -> FeedResponse<Quote> {
        FeedResponse::Ready(Quote::new("g1", ts(minute), dec!(0.50), dec!(0.52)))
    }

    fn state(minute: i64, status: EventStatus) -> FeedResponse<EventSnapshot> {
        FeedResponse::Ready(EventSnapshot {
            event_id: "g1".into(),
            timestamp: ts(minute),
            score_home: 30,
            score_away: 25,
            period: 2,
            clock_remaining: Duration::from_secs(300),
            status,
        })
    }

    fn scored(minute: i64, score: (u32, u32), period: u32) -> FeedResponse<EventSnapshot> {
        scored_with_status(minute, score, period, EventStatus::Live)
    }

    fn scored_with_status(
        minute: i64,
        score: (u32, u32),
        period: u32,
        status: EventStatus,
    ) -> FeedResponse<EventSnapshot> {
        FeedResponse::Ready(EventSnapshot {
            event_id: "g1".into(),
            timestamp: ts(minute),
            score_home: score.0,
            score_away: score.1,
            period,
            clock_remaining: Duration::from_secs(300),
            status,
        })
    }

    fn setup(
        quotes: Vec<FeedResponse<Quote>>,
        states: Vec<FeedResponse<EventSnapshot>>,
    ) -> (EventSynchronizer, Event, FeatureWindow, SyncState) {
        let feed = Arc::new(Scripted {
            quotes: Mutex::new(quotes.into()),
            states: Mutex::new(states.into()),
        });
        let sync = EventSynchronizer::new(
            feed.clone(),
            feed,
            Arc::new(RequestSpacer::new(Duration::ZERO)),
            &EngineConfig::default(),
        );
        let event = Event::new(EventDescriptor {
            id: "g1".into(),
            home: "BOS".into(),
            away: "NYK".into(),
            market_ticker: "T".into(),
            start_time: None,
        });
        (sync, event, FeatureWindow::new(chrono::Duration::minutes(30)), SyncState::default())
    }

    #[tokio::test]
    async fn test_appends_then_dedupes() {
        let (sync, mut event, mut window, mut st) = setup(
            vec![quote(1), quote(1)],
            vec![state(1, EventStatus::Live), state(1, EventStatus::Live)],
        );
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Appended(_)
        ));
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Duplicate
        ));
        assert_eq!(window.len(), 1);
        assert_eq!(event.score_home, 30);
    }

    #[tokio::test]
    async fn test_stale_state_does_not_roll_back_window() {
        let (sync, mut event, mut window, mut st) = setup(
            vec![quote(5), quote(6)],
            vec![scored(5, (60, 40), 3), scored(2, (30, 25), 2)],
        );
        sync.sync(&mut event, &mut window, &mut st).await;

        // Fresh quote, stale game state: paired with the state already held
        match sync.sync(&mut event, &mut window, &mut st).await {
            SyncOutcome::Appended(sample) => {
                assert_eq!(sample.snapshot.timestamp, ts(5));
                assert_eq!(sample.quote.timestamp, ts(6));
            }
            other => panic!("expected appended, got {:?}", other),
        }

        let newest = window.newest().unwrap();
        assert_eq!((newest.snapshot.score_home, newest.snapshot.score_away), (60, 40));
        assert_eq!(newest.snapshot.period, 3);
        assert_eq!((event.score_home, event.period), (60, 3));
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_final_does_not_settle() {
        let (sync, mut event, mut window, mut st) = setup(
            vec![quote(3), quote(4)],
            vec![
                scored(3, (40, 38), 3),
                scored_with_status(1, (30, 25), 2, EventStatus::Final),
            ],
        );
        sync.sync(&mut event, &mut window, &mut st).await;

        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Appended(_)
        ));
        assert!(!st.is_settled());
        assert_eq!(event.status, EventStatus::Live);
    }

    #[tokio::test]
    async fn test_not_yet_available() {
        let (sync, mut event, mut window, mut st) =
            setup(vec![], vec![FeedResponse::NotYetAvailable]);
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::NotYetAvailable
        ));
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn test_final_snapshot_settles() {
        let (sync, mut event, mut window, mut st) =
            setup(vec![], vec![state(50, EventStatus::Final)]);
        match sync.sync(&mut event, &mut window, &mut st).await {
            SyncOutcome::Settled(snapshot) => {
                assert_eq!(snapshot.status, EventStatus::Final);
                assert_eq!(snapshot.score_home, 30);
            }
            other => panic!("expected settled, got {:?}", other),
        }
        assert!(st.is_settled());
        // No further polling once settled
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Duplicate
        ));
    }

    #[tokio::test]
    async fn test_market_settled() {
        let (sync, mut event, mut window, mut st) =
            setup(vec![FeedResponse::Settled], vec![state(3, EventStatus::Live)]);
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Settled(_)
        ));
        assert_eq!(event.status, EventStatus::Final);
    }

    #[tokio::test]
    async fn test_transient_and_malformed_are_recoverable() {
        let (sync, mut event, mut window, mut st) = setup(
            vec![FeedResponse::Malformed("bad json".into()), quote(2)],
            vec![
                FeedResponse::TransientError("timeout".into()),
                state(1, EventStatus::Live),
                state(2, EventStatus::Live),
            ],
        );
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Failed(Error::DataUnavailable { .. })
        ));
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Failed(Error::MalformedFeedResponse { .. })
        ));
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Appended(_)
        ));
    }

    #[tokio::test]
    async fn test_settled_quote_never_appended() {
        let zero = FeedResponse::Ready(Quote::new("g1", ts(4), dec!(0), dec!(0)));
        let (sync, mut event, mut window, mut st) =
            setup(vec![zero], vec![state(4, EventStatus::Live)]);
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Failed(Error::DataUnavailable { .. })
        ));
        assert!(window.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backoff() {
        let (sync, mut event, mut window, mut st) = setup(
            vec![quote(1)],
            vec![
                FeedResponse::RateLimited { retry_after: None },
                state(1, EventStatus::Live),
            ],
        );
        match sync.sync(&mut event, &mut window, &mut st).await {
            SyncOutcome::RateLimited { retry_in } => assert_eq!(retry_in, Duration::from_secs(30)),
            other => panic!("expected rate limited, got {:?}", other),
        }
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::BackingOff
        ));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(matches!(
            sync.sync(&mut event, &mut window, &mut st).await,
            SyncOutcome::Appended(_)
        ));
        assert_eq!(st.consecutive_rate_limits(), 0);
    }

    #[test]
    fn test_backoff_growth() {
        let (sync, ..) = setup(vec![], vec![]);
        assert_eq!(sync.backoff_for(None, 1), Duration::from_secs(30));
        assert_eq!(sync.backoff_for(None, 2), Duration::from_secs(60));
        assert_eq!(sync.backoff_for(None, 3), Duration::from_secs(120));
        assert_eq!(sync.backoff_for(None, 5), Duration::from_secs(300));
        assert_eq!(sync.backoff_for(None, 40), Duration::from_secs(300));
        assert_eq!(
            sync.backoff_for(Some(Duration::from_secs(7)), 3),
            Duration::from_secs(7)
        );
    }
}

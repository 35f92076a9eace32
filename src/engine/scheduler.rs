//! Tick-driven orchestrator
//!
//! Each tick runs three phases in order: a bounded fan-out that syncs every
//! pollable event, then decisions and exits sequentially in event-id order.
//! Every event's state has a single writer, so no phase needs a lock.

use super::report::TickReport;
use super::session::{Session, SessionSummary};
use crate::config::Config;
use crate::data::{PersistenceSink, SignalRecord};
use crate::decision::{Decision, DecisionEngine, SkipReason};
use crate::error::{Error, Result};
use crate::feed::{Event, EventDescriptor, EventStateFeed, EventStatus, MarketFeed};
use crate::fees::FeeCalculator;
use crate::model::{Classifier, HoldEstimator};
use crate::position::{ExitPolicy, Observation, PositionBook, Trade};
use crate::sync::{EventSynchronizer, RequestSpacer, SyncOutcome, SyncState};
use crate::telemetry::{self, GaugeMetric};
use crate::window::{FeatureEngine, FeatureWindow};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Everything the engine owns for one event
struct EventSlot {
    event: Event,
    window: FeatureWindow,
    sync: SyncState,
    book: PositionBook,
}

impl EventSlot {
    fn should_poll(&self, now: chrono::DateTime<Utc>, lead: chrono::Duration) -> bool {
        if self.sync.is_settled() {
            return false;
        }
        match self.event.descriptor.start_time {
            Some(start) => start - lead <= now,
            None => true,
        }
    }
}

/// External collaborators the scheduler drives
pub struct Collaborators {
    pub market: Arc<dyn MarketFeed>,
    pub state: Arc<dyn EventStateFeed>,
    pub classifier: Arc<dyn Classifier>,
    pub estimator: Arc<dyn HoldEstimator>,
    pub sink: Arc<dyn PersistenceSink>,
}

/// Sink failures are counted and logged, never propagated
fn persist(result: Result<()>, report: &mut TickReport) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Persistence failed, continuing");
        report.record_error(&e);
    }
}

/// Paper-trading scheduler
pub struct Scheduler {
    slots: BTreeMap<String, EventSlot>,
    synchronizer: EventSynchronizer,
    decisions: DecisionEngine,
    exits: ExitPolicy,
    sink: Arc<dyn PersistenceSink>,
    session: Session,
    tick: u64,
    tick_interval: Duration,
    max_parallel_syncs: usize,
    pre_game_poll: chrono::Duration,
    max_session: Option<Duration>,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Build a scheduler for the given events
    ///
    /// Fails with a configuration error before any polling happens.
    pub fn new(config: &Config, events: Vec<EventDescriptor>, parts: Collaborators) -> Result<Self> {
        config.validate_engine()?;

        let fees = FeeCalculator::taker(&config.fees);
        let spacer = Arc::new(RequestSpacer::new(Duration::from_millis(
            config.engine.min_request_spacing_ms,
        )));
        let synchronizer = EventSynchronizer::new(parts.market, parts.state, spacer, &config.engine);
        let decisions = DecisionEngine::new(
            &config.decision,
            FeatureEngine::new(config.window.clone(), config.game.clone()),
            parts.classifier,
            parts.estimator,
        );
        let exits = ExitPolicy::new(config.hold_to_settlement.clone(), config.game.clone(), fees);

        let mut session = Session::new(Utc::now());
        let mut slots = BTreeMap::new();
        for descriptor in events {
            let id = descriptor.id.clone();
            if slots.contains_key(&id) {
                return Err(Error::config(format!("duplicate event id {}", id)));
            }
            session.track_event(&id);
            slots.insert(
                id.clone(),
                EventSlot {
                    event: Event::new(descriptor),
                    window: FeatureWindow::new(chrono::Duration::minutes(config.window.horizon_minutes)),
                    sync: SyncState::default(),
                    book: PositionBook::new(id, config.decision.max_concurrent_positions_per_event),
                },
            );
        }

        Ok(Self {
            slots,
            synchronizer,
            decisions,
            exits,
            sink: parts.sink,
            session,
            tick: 0,
            tick_interval: Duration::from_secs(config.engine.tick_interval_seconds),
            max_parallel_syncs: config.engine.max_parallel_syncs,
            pre_game_poll: chrono::Duration::minutes(config.engine.pre_game_poll_minutes),
            max_session: config.engine.max_session_minutes.map(|m| Duration::from_secs(m * 60)),
            shutdown_timeout: Duration::from_secs(config.engine.shutdown_timeout_seconds),
        })
    }

    /// Override the tick interval; zero runs ticks back to back
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Events still being tracked, in tick order
    pub fn active_events(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    pub fn open_positions(&self) -> usize {
        self.slots.values().map(|slot| slot.book.open_count()).sum()
    }

    pub fn book(&self, event_id: &str) -> Option<&PositionBook> {
        self.slots.get(event_id).map(|slot| &slot.book)
    }

    pub fn window(&self, event_id: &str) -> Option<&FeatureWindow> {
        self.slots.get(event_id).map(|slot| &slot.window)
    }

    /// Drive ticks until cancelled, out of time, or out of events
    pub async fn run(mut self, cancel: CancellationToken) -> SessionSummary {
        tracing::info!(
            session_id = %self.session.id(),
            events = self.slots.len(),
            tick_interval_secs = self.tick_interval.as_secs(),
            "Scheduler started"
        );

        let deadline = self.max_session.map(|d| Instant::now() + d);
        let session_end = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(session_end);

        // tokio intervals reject a zero period
        let mut ticker = (!self.tick_interval.is_zero()).then(|| {
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            match ticker.as_mut() {
                Some(interval) => {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => {
                            tracing::info!("Stop requested");
                            break;
                        }

                        _ = &mut session_end => {
                            tracing::info!("Session time limit reached");
                            break;
                        }

                        _ = interval.tick() => {}
                    }
                }
                None => {
                    if cancel.is_cancelled() {
                        tracing::info!("Stop requested");
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }

            self.run_tick().await;

            if self.slots.is_empty() {
                tracing::info!("All events settled");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::info!("Session time limit reached");
                break;
            }
        }

        self.shutdown().await
    }

    /// Run one full tick
    pub async fn run_tick(&mut self) -> TickReport {
        let started = std::time::Instant::now();
        self.tick += 1;
        self.session.record_tick();
        let mut report = TickReport::new(self.tick);

        let appended = self.sync_all(&mut report).await;
        self.decide_all(&appended, &mut report).await;
        self.evaluate_exits(&mut report);
        self.retire_settled();

        report.active_events = self.slots.len();
        report.open_positions = self.open_positions();
        report.duration = started.elapsed();
        telemetry::set_gauge(
            GaugeMetric::RealizedPnl,
            self.session.realized_pnl().to_f64().unwrap_or(0.0),
        );
        report.publish();
        report
    }

    /// Phase 1: bounded fan-out over every pollable event
    async fn sync_all(&mut self, report: &mut TickReport) -> BTreeSet<String> {
        let now = Utc::now();
        let lead = self.pre_game_poll;
        let synchronizer = &self.synchronizer;

        let mut outcomes: Vec<(String, SyncOutcome)> = stream::iter(
            self.slots
                .iter_mut()
                .filter(|(_, slot)| slot.should_poll(now, lead)),
        )
        .map(move |(id, slot)| async move {
            let outcome = synchronizer
                .sync(&mut slot.event, &mut slot.window, &mut slot.sync)
                .await;
            (id.clone(), outcome)
        })
        .buffer_unordered(self.max_parallel_syncs)
        .collect()
        .await;

        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        report.events_polled = outcomes.len();

        let mut appended = BTreeSet::new();
        for (event_id, outcome) in outcomes {
            match outcome {
                SyncOutcome::Appended(sample) => {
                    report.samples_appended += 1;
                    persist(self.sink.record_sample(&sample), report);
                    appended.insert(event_id);
                }
                SyncOutcome::Settled(snapshot) => {
                    persist(self.sink.record_snapshot(&snapshot), report);
                }
                SyncOutcome::RateLimited { retry_in } => {
                    report.record_error(&Error::RateLimited {
                        event_id,
                        retry_after: Some(retry_in),
                    });
                }
                SyncOutcome::Failed(error) => {
                    tracing::warn!(event_id = %event_id, error = %error, "Event sync failed");
                    report.record_error(&error);
                }
                SyncOutcome::Duplicate | SyncOutcome::NotYetAvailable | SyncOutcome::BackingOff => {}
            }
        }
        appended
    }

    /// Phase 2: entry decisions for events with a fresh sample
    async fn decide_all(&mut self, appended: &BTreeSet<String>, report: &mut TickReport) {
        let side = self.decisions.side();

        for (event_id, slot) in self.slots.iter_mut() {
            if !appended.contains(event_id) || slot.sync.is_settled() {
                continue;
            }

            match self.decisions.decide(event_id, &slot.window, &slot.book).await {
                Decision::Open(request) => {
                    let mut signal = SignalRecord {
                        timestamp: request.entry_time,
                        event_id: event_id.clone(),
                        side: request.side,
                        probability: request.probability,
                        price: request.entry_price,
                        accepted: true,
                        predicted_hold_minutes: Some(request.predicted_hold_minutes),
                        reason: None,
                    };
                    report.signals += 1;

                    match slot.book.open(request, self.exits.fees()) {
                        Some(position) => {
                            report.positions_opened += 1;
                            self.session.record_signal(true);
                            tracing::info!(
                                event_id = %event_id,
                                position_id = %position.id,
                                side = position.side.as_str(),
                                entry_price = %position.entry_price,
                                contracts = position.contracts,
                                probability = position.probability,
                                predicted_hold_minutes = position.predicted_hold_minutes,
                                "Position opened"
                            );
                        }
                        None => {
                            self.session.record_signal(false);
                            signal.accepted = false;
                            signal.reason = Some("cap_reached".to_string());
                        }
                    }
                    persist(self.sink.record_signal(&signal), report);
                }
                Decision::Skip(reason) => {
                    match &reason {
                        SkipReason::InferenceFailed(detail)
                        | SkipReason::EstimatorFailed { reason: detail, .. } => {
                            report.record_error(&Error::ModelInferenceFailure(detail.clone()));
                        }
                        SkipReason::FeaturesUnavailable(why) => {
                            tracing::debug!(event_id = %event_id, reason = %why, "Features unavailable");
                        }
                        SkipReason::BelowThreshold(_) | SkipReason::CapReached(_) => {}
                    }

                    let Some(probability) = reason.discarded_signal() else {
                        continue;
                    };
                    let Some(newest) = slot.window.newest() else {
                        continue;
                    };
                    report.signals += 1;
                    self.session.record_signal(false);
                    let signal = SignalRecord {
                        timestamp: newest.timestamp(),
                        event_id: event_id.clone(),
                        side,
                        probability,
                        price: side.held_price(newest.quote.mid),
                        accepted: false,
                        predicted_hold_minutes: None,
                        reason: Some(reason.label().to_string()),
                    };
                    persist(self.sink.record_signal(&signal), report);
                }
            }
        }
    }

    /// Phase 3: exit rules for every open position
    fn evaluate_exits(&mut self, report: &mut TickReport) {
        let mut closed = Vec::new();

        for slot in self.slots.values_mut() {
            if !slot.book.has_open() {
                continue;
            }
            let Some(newest) = slot.window.newest() else {
                continue;
            };

            // Game state and price come from the same sample until the event
            // settles; a failed quote fetch must not pair new scores with an
            // old price
            let (snapshot, at) = if slot.sync.is_settled() {
                let mut snapshot = slot.event.snapshot();
                snapshot.status = EventStatus::Final;
                let at = newest.timestamp().max(snapshot.timestamp);
                (snapshot, at)
            } else {
                (newest.snapshot.clone(), newest.timestamp())
            };

            let observation = Observation {
                snapshot,
                quote: Some(newest.quote.clone()),
                at,
            };
            closed.extend(slot.book.evaluate(&self.exits, &observation));
        }

        for trade in closed {
            self.record_trade(trade, report);
        }
    }

    /// Drop events that are settled with nothing left open
    fn retire_settled(&mut self) {
        self.slots.retain(|event_id, slot| {
            let done = slot.sync.is_settled() && !slot.book.has_open();
            if done {
                tracing::info!(event_id = %event_id, "Event retired");
            }
            !done
        });
    }

    fn record_trade(&mut self, trade: Trade, report: &mut TickReport) {
        report.positions_closed += 1;
        tracing::info!(
            event_id = %trade.event_id,
            position_id = %trade.position_id,
            reason = trade.exit_reason.as_str(),
            entry_price = %trade.entry_price,
            exit_price = %trade.exit_price,
            net_pnl = %trade.net_pnl,
            exit_override = trade.exit_override,
            "Position closed"
        );
        persist(self.sink.record_trade(&trade), report);
        self.session.record_trade(trade);
    }

    /// Force-close residual positions, persist the summary, flush the sink
    pub async fn shutdown(&mut self) -> SessionSummary {
        let now = Utc::now();
        let mut report = TickReport::new(self.tick);
        let mut closed = Vec::new();

        for slot in self.slots.values_mut() {
            if !slot.book.has_open() {
                continue;
            }
            let at = slot.window.newest_timestamp().unwrap_or(now);
            closed.extend(slot.book.force_close(&self.exits, at));
        }
        if !closed.is_empty() {
            tracing::warn!(count = closed.len(), "Force-closing open positions at last observed price");
        }
        for trade in closed {
            self.record_trade(trade, &mut report);
        }

        let summary = self.session.summarize(Utc::now());
        persist(self.sink.record_session(&summary), &mut report);

        match tokio::time::timeout(self.shutdown_timeout, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Persistence flush failed"),
            Err(_) => tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Persistence flush timed out"
            ),
        }

        telemetry::set_gauge(GaugeMetric::RealizedPnl, summary.net_pnl_f64());
        telemetry::set_gauge(GaugeMetric::OpenPositions, 0.0);
        tracing::info!(
            session_id = %summary.session_id,
            ticks = summary.ticks,
            trades = summary.trades,
            net_pnl = %summary.net_pnl,
            "Session complete"
        );
        summary
    }
}

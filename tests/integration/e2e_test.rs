//! End-to-end scheduler runs over replayed games

use crate::common::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scoreline::config::Config;
use scoreline::feed::Sample;
use scoreline::position::ExitReason;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Flat at 0.50 until minute 15, then 0.55 through minute 23
fn round_trip_game() -> Vec<Sample> {
    let mut samples = flat_game("g1", 0..=15, dec!(0.50));
    samples.extend(flat_game("g1", 16..=23, dec!(0.55)));
    samples
}

/// Late blowout: entry at 0.50, home pulls away, game ends at minute 25
fn blowout_game() -> Vec<Sample> {
    let clock = |m: i64| 720 - 30 * m as u64;
    let mut samples: Vec<Sample> = (0..=15)
        .map(|m| sample("g1", m, dec!(0.50), (80, 78), 4, clock(m)))
        .collect();
    samples.extend((16..=17).map(|m| sample("g1", m, dec!(0.70), (84, 78), 4, clock(m))));
    samples.extend((18..=24).map(|m| sample("g1", m, dec!(0.96), (92, 80), 4, clock(m))));
    samples.push(final_sample("g1", 25, (95, 82)));
    samples
}

#[tokio::test]
async fn test_scenario_a_timed_round_trip() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = replay_scheduler(
        &config(),
        round_trip_game(),
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
        8,
        sink.clone(),
    )
    .with_tick_interval(Duration::ZERO);

    let summary = scheduler.run(CancellationToken::new()).await;

    let trades = sink.trades();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.entry_price, dec!(0.50));
    assert_eq!(trade.exit_price, dec!(0.55));
    assert_eq!(trade.entry_fee, dec!(1.75));
    assert_eq!(trade.exit_fee, dec!(1.7325));
    assert_eq!(trade.gross_pnl, dec!(5.00));
    assert_eq!(trade.net_pnl, dec!(1.5175));
    assert_eq!(trade.exit_reason, ExitReason::TimeExit);
    assert_eq!(trade.entry_time, t(15));
    assert_eq!(trade.exit_time, t(23));
    assert!(trade.won);
    assert!(!trade.exit_override);

    // 24 samples, then one tick to notice the feed is done
    assert_eq!(summary.ticks, 25);
    assert_eq!(summary.signals, 1);
    assert_eq!(summary.discarded_signals, 0);
    assert_eq!(summary.trades, 1);
    assert_eq!(summary.net_pnl, dec!(1.5175));
    assert_eq!(sink.samples.lock().unwrap().len(), 24);
    assert_eq!(sink.sessions.lock().unwrap().len(), 1);
    assert!(*sink.closed.lock().unwrap());
}

#[tokio::test]
async fn test_scenario_c_hold_to_settlement() {
    let sink = Arc::new(RecordingSink::default());
    let scheduler = replay_scheduler(
        &config(),
        blowout_game(),
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
        8,
        sink.clone(),
    )
    .with_tick_interval(Duration::ZERO);

    let summary = scheduler.run(CancellationToken::new()).await;

    let trades = sink.trades();
    assert_eq!(trades.len(), 1);
    let trade = &trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Settlement);
    assert!(trade.exit_override);
    assert_eq!(trade.exit_price, Decimal::ONE);
    assert_eq!(trade.exit_fee, Decimal::ZERO);
    assert_eq!(trade.gross_pnl, dec!(50.00));
    assert_eq!(trade.total_fees(), dec!(1.75));
    assert_eq!(trade.net_pnl, dec!(48.25));
    assert_eq!(trade.exit_time, t(25));

    assert_eq!(summary.overrides_used, 1);
    let snapshots = sink.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!((snapshots[0].score_home, snapshots[0].score_away), (95, 82));
}

#[tokio::test]
async fn test_hold_override_disabled_exits_on_time() {
    let mut config = config();
    config.hold_to_settlement.enabled = false;
    let sink = Arc::new(RecordingSink::default());
    let scheduler = replay_scheduler(
        &config,
        blowout_game(),
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
        8,
        sink.clone(),
    )
    .with_tick_interval(Duration::ZERO);

    scheduler.run(CancellationToken::new()).await;

    let trades = sink.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::TimeExit);
    assert_eq!(trades[0].exit_price, dec!(0.96));
    assert_eq!(trades[0].exit_time, t(23));
    assert!(trades[0].exit_fee > Decimal::ZERO);
}

#[tokio::test]
async fn test_scenario_d_short_feed_never_opens() {
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = replay_scheduler(
        &config(),
        flat_game("g1", 0..=5, dec!(0.50)),
        Arc::new(ConstantClassifier(0.99)),
        8,
        sink.clone(),
    );

    for _ in 0..6 {
        let report = scheduler.run_tick().await;
        assert_eq!(report.signals, 0);
        assert_eq!(report.positions_opened, 0);
    }
    assert_eq!(scheduler.book("g1").map(|b| b.open_count()), Some(0));
    assert!(sink.signals().is_empty());
}

#[tokio::test]
async fn test_scenario_e_second_signal_discarded() {
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = replay_scheduler(
        &config(),
        flat_game("g1", 0..=20, dec!(0.50)),
        Arc::new(ConstantClassifier(0.80)),
        60,
        sink.clone(),
    );

    for _ in 0..=20 {
        scheduler.run_tick().await;
        assert!(scheduler.open_positions() <= 1);
    }
    assert_eq!(scheduler.open_positions(), 1);

    let signals = sink.signals();
    assert_eq!(signals.len(), 6);
    assert!(signals[0].accepted);
    assert_eq!(signals[0].predicted_hold_minutes, Some(60));
    for discarded in &signals[1..] {
        assert!(!discarded.accepted);
        assert_eq!(discarded.reason.as_deref(), Some("cap_reached"));
        assert_eq!(discarded.predicted_hold_minutes, None);
    }

    let summary = scheduler.shutdown().await;
    assert_eq!(summary.signals, 6);
    assert_eq!(summary.discarded_signals, 5);
}

#[tokio::test]
async fn test_shutdown_force_closes_at_last_price() {
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = replay_scheduler(
        &config(),
        flat_game("g1", 0..=17, dec!(0.50)),
        Arc::new(ConstantClassifier(0.80)),
        60,
        sink.clone(),
    );
    for _ in 0..=17 {
        scheduler.run_tick().await;
    }
    assert_eq!(scheduler.open_positions(), 1);

    let summary = scheduler.shutdown().await;

    let trades = sink.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::SessionStop);
    assert_eq!(trades[0].exit_price, dec!(0.50));
    assert_eq!(trades[0].exit_fee, Decimal::ZERO);
    assert_eq!(trades[0].net_pnl, dec!(-1.75));
    assert!(!trades[0].won);
    assert_eq!(scheduler.open_positions(), 0);
    assert_eq!(summary.losses, 1);
    assert!(*sink.closed.lock().unwrap());
}

#[tokio::test]
async fn test_feed_running_dry_settles_open_position() {
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = replay_scheduler(
        &config(),
        flat_game("g1", 0..=16, dec!(0.50)),
        Arc::new(ConstantClassifier(0.80)),
        60,
        sink.clone(),
    );

    // 17 samples, then the replay answers Settled
    for _ in 0..18 {
        scheduler.run_tick().await;
    }

    let trades = sink.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::Settlement);
    // Home leads 30-28 at the last snapshot
    assert_eq!(trades[0].exit_price, Decimal::ONE);
    assert_eq!(trades[0].exit_fee, Decimal::ZERO);
    assert!(!trades[0].exit_override);
    assert!(scheduler.active_events().is_empty());
}

#[tokio::test]
async fn test_cancel_before_first_tick() {
    let sink = Arc::new(RecordingSink::default());
    let mut config = config();
    config.engine.tick_interval_seconds = 60;
    let scheduler = replay_scheduler(
        &config,
        flat_game("g1", 0..=30, dec!(0.50)),
        Arc::new(ConstantClassifier(0.80)),
        8,
        sink.clone(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = scheduler.run(cancel).await;

    assert_eq!(summary.ticks, 0);
    assert!(sink.samples.lock().unwrap().is_empty());
    assert_eq!(sink.sessions.lock().unwrap().len(), 1);
    assert!(*sink.closed.lock().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_session_time_limit_stops_loop() {
    let mut config = config();
    config.engine.tick_interval_seconds = 60;
    config.engine.max_session_minutes = Some(10);
    let scheduler = replay_scheduler(
        &config,
        flat_game("g1", 0..=30, dec!(0.50)),
        Arc::new(ConstantClassifier(0.10)),
        8,
        Arc::new(RecordingSink::default()),
    );

    let summary = scheduler.run(CancellationToken::new()).await;
    assert_eq!(summary.ticks, 10);
}

#[tokio::test]
async fn test_classifier_failure_does_not_stop_loop() {
    let mut scheduler = replay_scheduler(
        &config(),
        flat_game("g1", 0..=17, dec!(0.50)),
        Arc::new(FailingClassifier),
        8,
        Arc::new(RecordingSink::default()),
    );

    let mut failures = 0;
    for _ in 0..=17 {
        let report = scheduler.run_tick().await;
        failures += report.errors.get("model_inference_failure").copied().unwrap_or(0);
        assert_eq!(report.positions_opened, 0);
    }
    // Minutes 15, 16 and 17 have enough history to reach the classifier
    assert_eq!(failures, 3);
    assert_eq!(scheduler.window("g1").map(|w| w.len()), Some(18));
}

#[tokio::test]
async fn test_estimator_failure_discards_signal() {
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = replay_scheduler_with(
        &config(),
        flat_game("g1", 0..=15, dec!(0.50)),
        Arc::new(ConstantClassifier(0.90)),
        Arc::new(BrokenEstimator),
        sink.clone(),
    );
    for _ in 0..=15 {
        scheduler.run_tick().await;
    }

    assert_eq!(scheduler.open_positions(), 0);
    let signals = sink.signals();
    assert_eq!(signals.len(), 1);
    assert!(!signals[0].accepted);
    assert_eq!(signals[0].reason.as_deref(), Some("estimator_failed"));
    assert_eq!(signals[0].probability, 0.90);
}

#[tokio::test]
async fn test_persistence_failure_does_not_block_trading() {
    let mut scheduler = replay_scheduler(
        &config(),
        round_trip_game(),
        Arc::new(CheapEntryClassifier { max_price: 0.52 }),
        8,
        Arc::new(BrokenSink),
    );

    let mut persistence_errors = 0;
    for _ in 0..24 {
        let report = scheduler.run_tick().await;
        persistence_errors += report.errors.get("persistence_failure").copied().unwrap_or(0);
    }

    assert_eq!(scheduler.session().trades().len(), 1);
    assert_eq!(scheduler.session().trades()[0].net_pnl, dec!(1.5175));
    // 24 samples, 1 signal, 1 trade
    assert_eq!(persistence_errors, 26);
    let summary = scheduler.shutdown().await;
    assert_eq!(summary.trades, 1);
}

#[tokio::test]
async fn test_duplicate_event_ids_rejected() {
    use scoreline::engine::{Collaborators, Scheduler};
    use scoreline::feed::{EventDescriptor, ReplayFeed};
    use scoreline::model::FixedHoldEstimator;

    let feed = Arc::new(ReplayFeed::default());
    let parts = Collaborators {
        market: feed.clone(),
        state: feed,
        classifier: Arc::new(ConstantClassifier(0.5)),
        estimator: Arc::new(FixedHoldEstimator::new(8)),
        sink: Arc::new(RecordingSink::default()),
    };
    let events = vec![EventDescriptor::from_id("g1"), EventDescriptor::from_id("g1")];

    let err = Scheduler::new(&Config::default(), events, parts).err().unwrap();
    assert!(err.is_fatal());
}

#[test]
fn test_config_example_is_valid() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.engine.tick_interval_seconds, 60);
    assert_eq!(config.decision.entry_threshold, 0.60);
    assert_eq!(config.fees.fee_rate, dec!(0.07));
    assert_eq!(config.hold_to_settlement.min_score_diff, 11);
    assert_eq!(config.events.len(), 1);
    assert_eq!(config.events[0].market_ticker, "GAME-BOSNYK-BOS");
}

#[test]
fn test_example_weights_load() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/models/weights.example.json");
    assert!(scoreline::model::LogisticClassifier::load(path).is_ok());
}

//! Feature vector derivation
//!
//! A pure function of the window contents: "now" is the newest sample's
//! timestamp, never the wall clock, so replaying the same samples gives a
//! bit-identical vector.

use super::buffer::FeatureWindow;
use crate::config::{GameConfig, WindowConfig};
use crate::feed::Sample;
use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

/// Price-delta lookbacks in minutes
pub const PRICE_LOOKBACKS: [i64; 5] = [1, 2, 3, 5, 10];

/// Window for the high-low price range
const PRICE_RANGE_MINUTES: i64 = 5;

/// Why no feature vector could be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// No samples at all
    Empty,
    /// Less history than the configured minimum
    InsufficientHistory { have: Duration, need: Duration },
    /// Newest quote is not a live price
    NonTradeablePrice,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Empty => write!(f, "no samples"),
            Unavailable::InsufficientHistory { have, need } => write!(
                f,
                "insufficient history: {}s of {}s",
                have.num_seconds(),
                need.num_seconds()
            ),
            Unavailable::NonTradeablePrice => write!(f, "newest quote is not tradeable"),
        }
    }
}

/// Outcome of a feature computation
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureResult {
    Ready(FeatureVector),
    Unavailable(Unavailable),
}

/// Fixed-shape feature vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub price: f64,
    /// Mid change over each of [`PRICE_LOOKBACKS`]
    pub price_changes: [f64; 5],
    pub volatility: f64,
    pub price_range: f64,
    pub momentum: f64,
    pub score_home: f64,
    pub score_away: f64,
    pub score_diff: f64,
    pub abs_score_diff: f64,
    pub total_score: f64,
    /// Change in score differential per minute
    pub score_diff_rate: f64,
    /// Combined points per minute
    pub scoring_rate: f64,
    pub period: f64,
    pub game_minute: f64,
    pub time_remaining: f64,
    pub is_final_period: bool,
    pub is_late_game: bool,
    pub is_large_score_diff: bool,
    pub is_close_game: bool,
    pub is_extreme_price: bool,
    pub is_crunch_time: bool,
}

impl FeatureVector {
    pub const LEN: usize = 25;

    /// Feature names in [`as_array`](Self::as_array) order
    pub const NAMES: [&'static str; Self::LEN] = [
        "price",
        "price_change_1m",
        "price_change_2m",
        "price_change_3m",
        "price_change_5m",
        "price_change_10m",
        "volatility",
        "price_range_5m",
        "momentum",
        "score_home",
        "score_away",
        "score_diff",
        "abs_score_diff",
        "total_score",
        "score_diff_rate",
        "scoring_rate",
        "period",
        "game_minute",
        "time_remaining",
        "is_final_period",
        "is_late_game",
        "is_large_score_diff",
        "is_close_game",
        "is_extreme_price",
        "is_crunch_time",
    ];

    pub fn as_array(&self) -> [f64; Self::LEN] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.price,
            self.price_changes[0],
            self.price_changes[1],
            self.price_changes[2],
            self.price_changes[3],
            self.price_changes[4],
            self.volatility,
            self.price_range,
            self.momentum,
            self.score_home,
            self.score_away,
            self.score_diff,
            self.abs_score_diff,
            self.total_score,
            self.score_diff_rate,
            self.scoring_rate,
            self.period,
            self.game_minute,
            self.time_remaining,
            flag(self.is_final_period),
            flag(self.is_late_game),
            flag(self.is_large_score_diff),
            flag(self.is_close_game),
            flag(self.is_extreme_price),
            flag(self.is_crunch_time),
        ]
    }

    /// Position of a named feature
    pub fn index_of(name: &str) -> Option<usize> {
        Self::NAMES.iter().position(|n| *n == name)
    }

    /// Named (feature, value) pairs in order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        Self::NAMES.into_iter().zip(self.as_array())
    }
}

#[cfg(test)]
impl FeatureVector {
    /// Neutral mid-game vector at `price`
    pub(crate) fn at_price(price: f64) -> Self {
        Self {
            price,
            price_changes: [0.0; 5],
            volatility: 0.0,
            price_range: 0.0,
            momentum: 0.0,
            score_home: 0.0,
            score_away: 0.0,
            score_diff: 0.0,
            abs_score_diff: 0.0,
            total_score: 0.0,
            score_diff_rate: 0.0,
            scoring_rate: 0.0,
            period: 1.0,
            game_minute: 0.0,
            time_remaining: 48.0,
            is_final_period: false,
            is_late_game: false,
            is_large_score_diff: false,
            is_close_game: true,
            is_extreme_price: false,
            is_crunch_time: false,
        }
    }
}

/// Computes feature vectors from a window
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    window: WindowConfig,
    game: GameConfig,
}

fn mid(sample: &Sample) -> f64 {
    sample.quote.mid.to_f64().unwrap_or(0.0)
}

fn minutes_between(from: &Sample, to: &Sample) -> f64 {
    (to.timestamp() - from.timestamp()).num_milliseconds() as f64 / 60_000.0
}

impl FeatureEngine {
    pub fn new(window: WindowConfig, game: GameConfig) -> Self {
        Self { window, game }
    }

    pub fn min_history(&self) -> Duration {
        Duration::minutes(self.window.min_feature_window_minutes)
    }

    /// Derive the feature vector, or say why not
    pub fn compute(&self, window: &FeatureWindow) -> FeatureResult {
        let Some(newest) = window.newest() else {
            return FeatureResult::Unavailable(Unavailable::Empty);
        };
        let need = self.min_history();
        if !window.has_history(need) {
            return FeatureResult::Unavailable(Unavailable::InsufficientHistory {
                have: window.span(),
                need,
            });
        }
        if !newest.quote.is_tradeable() {
            return FeatureResult::Unavailable(Unavailable::NonTradeablePrice);
        }

        let now = newest.timestamp();
        let price = mid(newest);

        let mut price_changes = [0.0; 5];
        for (slot, minutes) in price_changes.iter_mut().zip(PRICE_LOOKBACKS) {
            if let Some(reference) = window.at_or_before(now - Duration::minutes(minutes)) {
                *slot = price - mid(reference);
            }
        }

        let volatility = self.volatility(window, now - Duration::minutes(self.window.volatility_minutes));

        let recent: Vec<f64> = window
            .since(now - Duration::minutes(PRICE_RANGE_MINUTES))
            .map(mid)
            .collect();
        let high = recent.iter().copied().fold(f64::MIN, f64::max);
        let low = recent.iter().copied().fold(f64::MAX, f64::min);
        let price_range = if recent.is_empty() { 0.0 } else { high - low };

        let momentum_mids: Vec<f64> = window
            .since(now - Duration::minutes(self.window.momentum_minutes))
            .map(mid)
            .collect();
        let momentum = if momentum_mids.is_empty() {
            0.0
        } else {
            price - momentum_mids.iter().sum::<f64>() / momentum_mids.len() as f64
        };

        let snap = &newest.snapshot;
        let score_diff = snap.score_diff() as f64;
        let total_score = f64::from(snap.score_home) + f64::from(snap.score_away);

        let (score_diff_rate, scoring_rate) = match window
            .at_or_before(now - Duration::minutes(self.window.score_rate_minutes))
        {
            Some(reference) => {
                let elapsed = minutes_between(reference, newest);
                if elapsed > 0.0 {
                    let reference_total = f64::from(reference.snapshot.score_home)
                        + f64::from(reference.snapshot.score_away);
                    (
                        (score_diff - reference.snapshot.score_diff() as f64) / elapsed,
                        (total_score - reference_total) / elapsed,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };

        let time_remaining = snap.time_remaining_minutes(&self.game);
        let abs_diff = snap.score_diff().unsigned_abs();
        let is_late_game = time_remaining <= self.window.late_game_minutes;
        let is_close_game = abs_diff <= u64::from(self.window.close_game_diff);

        FeatureResult::Ready(FeatureVector {
            price,
            price_changes,
            volatility,
            price_range,
            momentum,
            score_home: f64::from(snap.score_home),
            score_away: f64::from(snap.score_away),
            score_diff,
            abs_score_diff: abs_diff as f64,
            total_score,
            score_diff_rate,
            scoring_rate,
            period: f64::from(snap.period),
            game_minute: snap.game_minute(&self.game),
            time_remaining,
            is_final_period: snap.is_final_period(&self.game),
            is_late_game,
            is_large_score_diff: abs_diff >= u64::from(self.window.large_score_diff),
            is_close_game,
            is_extreme_price: price <= self.window.extreme_price_low
                || price >= self.window.extreme_price_high,
            is_crunch_time: is_late_game && is_close_game,
        })
    }

    /// Population standard deviation of simple mid returns since `since`
    fn volatility(&self, window: &FeatureWindow, since: chrono::DateTime<chrono::Utc>) -> f64 {
        let mids: Vec<f64> = window.since(since).map(mid).collect();
        let returns: Vec<f64> = mids
            .windows(2)
            .filter(|pair| pair[0] > 0.0)
            .map(|pair| (pair[1] - pair[0]) / pair[0])
            .collect();
        if returns.is_empty() {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    }
}

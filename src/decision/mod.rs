//! Entry decision module
//!
//! Turns a feature window into either an [`OpenRequest`] or a reason to
//! skip. Never touches a position book itself; the caller performs the
//! single `open`.

use crate::config::DecisionConfig;
use crate::model::{Classifier, HoldEstimator};
use crate::position::{OpenRequest, PositionBook, Side};
use crate::window::{FeatureEngine, FeatureResult, FeatureWindow, Unavailable};
use std::sync::Arc;

/// Why no position was opened this tick
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Not enough history, or no live price
    FeaturesUnavailable(Unavailable),
    /// Probability under the entry threshold
    BelowThreshold(f64),
    /// Qualifying signal discarded because the event is at its cap
    CapReached(f64),
    /// Classifier failed; skip this event for this tick
    InferenceFailed(String),
    /// Hold estimator failed after a qualifying signal
    EstimatorFailed { probability: f64, reason: String },
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::FeaturesUnavailable(_) => "features_unavailable",
            SkipReason::BelowThreshold(_) => "below_threshold",
            SkipReason::CapReached(_) => "cap_reached",
            SkipReason::InferenceFailed(_) => "inference_failed",
            SkipReason::EstimatorFailed { .. } => "estimator_failed",
        }
    }

    /// Probability at or above threshold that did not become a position
    pub fn discarded_signal(&self) -> Option<f64> {
        match self {
            SkipReason::CapReached(p) => Some(*p),
            SkipReason::EstimatorFailed { probability, .. } => Some(*probability),
            _ => None,
        }
    }
}

/// Decision outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Open(OpenRequest),
    Skip(SkipReason),
}

/// Threshold gate in front of the classifier and hold estimator
pub struct DecisionEngine {
    classifier: Arc<dyn Classifier>,
    estimator: Arc<dyn HoldEstimator>,
    features: FeatureEngine,
    entry_threshold: f64,
    contracts: u32,
    side: Side,
}

impl DecisionEngine {
    pub fn new(
        config: &DecisionConfig,
        features: FeatureEngine,
        classifier: Arc<dyn Classifier>,
        estimator: Arc<dyn HoldEstimator>,
    ) -> Self {
        Self {
            classifier,
            estimator,
            features,
            entry_threshold: config.entry_threshold,
            contracts: config.position_size_contracts,
            side: config.side,
        }
    }

    /// Contract side every position is opened on
    pub fn side(&self) -> Side {
        self.side
    }

    /// Evaluate one event
    pub async fn decide(&self, event_id: &str, window: &FeatureWindow, book: &PositionBook) -> Decision {
        let features = match self.features.compute(window) {
            FeatureResult::Ready(features) => features,
            FeatureResult::Unavailable(reason) => {
                return Decision::Skip(SkipReason::FeaturesUnavailable(reason));
            }
        };
        // compute() only succeeds on a non-empty window with a tradeable newest quote
        let Some(newest) = window.newest() else {
            return Decision::Skip(SkipReason::FeaturesUnavailable(Unavailable::Empty));
        };

        let probability = match self.classifier.predict(&features).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(event_id, error = %e, "Classifier failed");
                return Decision::Skip(SkipReason::InferenceFailed(e.to_string()));
            }
        };

        if probability < self.entry_threshold {
            return Decision::Skip(SkipReason::BelowThreshold(probability));
        }

        if !book.can_open() {
            tracing::debug!(event_id, probability, "Signal discarded, position cap reached");
            return Decision::Skip(SkipReason::CapReached(probability));
        }

        let hold = match self.estimator.estimate(&features).await {
            Ok(hold) => hold,
            Err(e) => {
                tracing::warn!(event_id, error = %e, "Hold estimator failed");
                return Decision::Skip(SkipReason::EstimatorFailed {
                    probability,
                    reason: e.to_string(),
                });
            }
        };

        Decision::Open(OpenRequest {
            event_id: event_id.to_string(),
            side: self.side,
            entry_price: self.side.held_price(newest.quote.mid),
            entry_time: newest.timestamp(),
            contracts: self.contracts,
            probability,
            predicted_hold_minutes: hold.minutes,
        })
    }
}

//! Entry probability and hold duration models
//!
//! The engine only sees the [`Classifier`] and [`HoldEstimator`] contracts.
//! How a model was trained or where it runs stays behind them.

mod fixed;
mod http;
mod logistic;

pub use fixed::FixedHoldEstimator;
pub use http::HttpModelClient;
pub use logistic::{LogisticClassifier, LogisticWeights};

use crate::config::{ModelConfig, ModelKind};
use crate::error::{Error, Result};
use crate::window::FeatureVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Predicted holding period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldEstimate {
    /// Whole minutes, at least 1
    pub minutes: u32,
}

/// Probability that entering now is profitable
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<f64>;
}

/// How long a fresh position should be held
#[async_trait]
pub trait HoldEstimator: Send + Sync {
    async fn estimate(&self, features: &FeatureVector) -> Result<HoldEstimate>;
}

/// Reject outputs that are not probabilities
pub(crate) fn check_probability(p: f64) -> Result<f64> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(Error::ModelInferenceFailure(format!(
            "classifier returned {} outside [0, 1]",
            p
        )))
    }
}

pub(crate) fn check_hold(minutes: u32) -> Result<HoldEstimate> {
    if minutes == 0 {
        return Err(Error::ModelInferenceFailure(
            "hold estimator returned 0 minutes".to_string(),
        ));
    }
    Ok(HoldEstimate { minutes })
}

/// Build the configured classifier and hold estimator
pub fn build_models(config: &ModelConfig) -> Result<(Arc<dyn Classifier>, Arc<dyn HoldEstimator>)> {
    match config.kind {
        ModelKind::Logistic => {
            let path = config
                .weights_path
                .as_ref()
                .ok_or_else(|| Error::config("model.weights_path is required for the logistic model"))?;
            let classifier = LogisticClassifier::load(path)?;
            tracing::info!(path = %path.display(), "Loaded logistic classifier");
            let classifier: Arc<dyn Classifier> = Arc::new(classifier);
            let estimator: Arc<dyn HoldEstimator> =
                Arc::new(FixedHoldEstimator::new(config.hold_minutes));
            Ok((classifier, estimator))
        }
        ModelKind::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| Error::config("model.endpoint is required for the http model"))?;
            let client = Arc::new(HttpModelClient::new(endpoint, config.request_timeout_secs)?);
            tracing::info!(endpoint, "Using remote inference service");
            let classifier: Arc<dyn Classifier> = client.clone();
            let estimator: Arc<dyn HoldEstimator> = client;
            Ok((classifier, estimator))
        }
    }
}

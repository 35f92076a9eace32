//! Logistic regression classifier
//!
//! p = 1 / (1 + exp(-(intercept + sum(w_i * x_i))))
//!
//! Weights are keyed by feature name; features without a weight contribute
//! nothing.

use super::{check_probability, Classifier};
use crate::error::{Error, Result};
use crate::window::FeatureVector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Weights file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticWeights {
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
}

/// Local logistic model
#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    intercept: f64,
    coefficients: [f64; FeatureVector::LEN],
}

impl LogisticClassifier {
    /// Map named weights onto feature positions
    pub fn from_weights(weights: LogisticWeights) -> Result<Self> {
        if !weights.intercept.is_finite() {
            return Err(Error::config("logistic intercept must be finite"));
        }
        let mut coefficients = [0.0; FeatureVector::LEN];
        for (name, weight) in &weights.weights {
            let index = FeatureVector::index_of(name)
                .ok_or_else(|| Error::config(format!("unknown feature in weights: {}", name)))?;
            if !weight.is_finite() {
                return Err(Error::config(format!("weight for {} must be finite", name)));
            }
            coefficients[index] = *weight;
        }
        Ok(Self {
            intercept: weights.intercept,
            coefficients,
        })
    }

    /// Load weights from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read weights {}: {}", path.display(), e))
        })?;
        let weights: LogisticWeights = serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("invalid weights {}: {}", path.display(), e)))?;
        Self::from_weights(weights)
    }

    fn probability(&self, features: &FeatureVector) -> f64 {
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.as_array())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

#[async_trait]
impl Classifier for LogisticClassifier {
    async fn predict(&self, features: &FeatureVector) -> Result<f64> {
        check_probability(self.probability(features))
    }
}

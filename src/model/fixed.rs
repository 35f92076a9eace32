//! Constant hold estimator

use super::{check_hold, HoldEstimate, HoldEstimator};
use crate::error::Result;
use crate::window::FeatureVector;
use async_trait::async_trait;

/// Always predicts the same hold duration
#[derive(Debug, Clone, Copy)]
pub struct FixedHoldEstimator {
    minutes: u32,
}

impl FixedHoldEstimator {
    pub fn new(minutes: u32) -> Self {
        Self { minutes }
    }
}

#[async_trait]
impl HoldEstimator for FixedHoldEstimator {
    async fn estimate(&self, _features: &FeatureVector) -> Result<HoldEstimate> {
        check_hold(self.minutes)
    }
}

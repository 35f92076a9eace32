//! Remote inference service client
//!
//! POST `{endpoint}/predict` and `{endpoint}/hold` with the named feature
//! map. Any transport or decoding problem is a model inference failure.

use super::{check_hold, check_probability, Classifier, HoldEstimate, HoldEstimator};
use crate::error::{Error, Result};
use crate::window::FeatureVector;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct InferenceRequest {
    features: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    probability: f64,
}

#[derive(Debug, Deserialize)]
struct HoldResponse {
    minutes: u32,
}

/// Client implementing both model contracts over HTTP
pub struct HttpModelClient {
    endpoint: String,
    client: Client,
}

impl HttpModelClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request(features: &FeatureVector) -> InferenceRequest {
        InferenceRequest {
            features: features.named().collect(),
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, features: &FeatureVector) -> Result<T> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .json(&Self::request(features))
            .send()
            .await
            .map_err(|e| Error::ModelInferenceFailure(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ModelInferenceFailure(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::ModelInferenceFailure(format!("{}: invalid body: {}", url, e)))
    }
}

#[async_trait]
impl Classifier for HttpModelClient {
    async fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let response: PredictResponse = self.post("predict", features).await?;
        check_probability(response.probability)
    }
}

#[async_trait]
impl HoldEstimator for HttpModelClient {
    async fn estimate(&self, features: &FeatureVector) -> Result<HoldEstimate> {
        let response: HoldResponse = self.post("hold", features).await?;
        check_hold(response.minutes)
    }
}

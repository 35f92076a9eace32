//! Error taxonomy
//!
//! Every per-event failure is recoverable and stays scoped to that event for
//! the current tick. Only configuration problems are fatal, and those are
//! raised before the first tick.

use std::time::Duration;
use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// No usable data for an event this tick
    #[error("Data unavailable for {event_id}: {reason}")]
    DataUnavailable { event_id: String, reason: String },

    /// Upstream asked us to slow down
    #[error("Rate limited on {event_id} (retry after {retry_after:?})")]
    RateLimited {
        event_id: String,
        retry_after: Option<Duration>,
    },

    /// Feed answered with something we could not decode or trust
    #[error("Malformed feed response for {event_id}: {detail}")]
    MalformedFeedResponse { event_id: String, detail: String },

    /// Classifier or hold estimator failed
    #[error("Model inference failed: {0}")]
    ModelInferenceFailure(String),

    /// Persistence sink rejected or lost a record
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Invalid configuration, fatal at startup
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Filesystem error outside the trading path
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable label used in metrics and tick reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DataUnavailable { .. } => "data_unavailable",
            Error::RateLimited { .. } => "rate_limited",
            Error::MalformedFeedResponse { .. } => "malformed_feed_response",
            Error::ModelInferenceFailure(_) => "model_inference_failure",
            Error::PersistenceFailure(_) => "persistence_failure",
            Error::ConfigurationError(_) => "configuration_error",
            Error::Io(_) => "io",
        }
    }

    /// Whether the process must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConfigurationError(_))
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::ConfigurationError(msg.into())
    }
}

/// Result alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

//! Live feed module
//!
//! Two independent polled feeds per event: market quotes and game state.
//! Every call answers with a [`FeedResponse`] so callers must handle each
//! feed state explicitly.

mod http;
mod replay;
mod types;

pub use http::{HttpEventFeed, HttpMarketFeed};
pub use replay::ReplayFeed;
pub use types::{
    parse_clock, Event, EventDescriptor, EventSnapshot, EventStatus, Quote, Sample, Team,
};

use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a single feed poll
#[derive(Debug, Clone, PartialEq)]
pub enum FeedResponse<T> {
    /// Fresh data
    Ready(T),
    /// Pre-game, nothing published yet
    NotYetAvailable,
    /// Post-game, the market or event has resolved
    Settled,
    /// Network or server hiccup, retry next tick
    TransientError(String),
    /// Upstream throttling
    RateLimited { retry_after: Option<Duration> },
    /// Undecodable or untrustworthy payload
    Malformed(String),
}

impl<T> FeedResponse<T> {
    /// Transform the payload, keeping non-ready states
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FeedResponse<U> {
        self.and_then(|value| FeedResponse::Ready(f(value)))
    }

    /// Chain a fallible conversion of the payload
    pub fn and_then<U>(self, f: impl FnOnce(T) -> FeedResponse<U>) -> FeedResponse<U> {
        match self {
            FeedResponse::Ready(value) => f(value),
            FeedResponse::NotYetAvailable => FeedResponse::NotYetAvailable,
            FeedResponse::Settled => FeedResponse::Settled,
            FeedResponse::TransientError(e) => FeedResponse::TransientError(e),
            FeedResponse::RateLimited { retry_after } => FeedResponse::RateLimited { retry_after },
            FeedResponse::Malformed(e) => FeedResponse::Malformed(e),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FeedResponse::Ready(_))
    }
}

/// Market price feed
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Latest quote for the event's market
    async fn fetch_quote(&self, event: &EventDescriptor) -> FeedResponse<Quote>;
}

/// Score and clock feed
#[async_trait]
pub trait EventStateFeed: Send + Sync {
    /// Latest game state for the event
    async fn fetch_state(&self, event: &EventDescriptor) -> FeedResponse<EventSnapshot>;
}

//! Replay feed over recorded samples
//!
//! Serves one recorded sample per poll per event, in timestamp order. The
//! quote and state cursors advance independently so each feed sees every
//! sample exactly once. Once an event runs out of samples both feeds
//! answer `Settled`.

use super::types::{EventDescriptor, EventSnapshot, Quote, Sample};
use super::{EventStateFeed, FeedResponse, MarketFeed};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Stream {
    samples: Vec<Sample>,
    quote_cursor: usize,
    state_cursor: usize,
}

/// In-memory feed that plays back captured samples
#[derive(Debug, Default)]
pub struct ReplayFeed {
    streams: Mutex<HashMap<String, Stream>>,
}

impl ReplayFeed {
    /// Group samples by event and order them by timestamp
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        let mut streams: HashMap<String, Stream> = HashMap::new();
        for sample in samples {
            streams
                .entry(sample.event_id().to_string())
                .or_default()
                .samples
                .push(sample);
        }
        for stream in streams.values_mut() {
            stream.samples.sort_by_key(|s| s.timestamp());
        }
        Self {
            streams: Mutex::new(streams),
        }
    }

    /// Event ids with recorded samples, sorted
    pub async fn event_ids(&self) -> Vec<String> {
        let streams = self.streams.lock().await;
        let mut ids: Vec<String> = streams.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Samples not yet served to the market side
    pub async fn remaining(&self, event_id: &str) -> usize {
        let streams = self.streams.lock().await;
        streams
            .get(event_id)
            .map(|s| s.samples.len().saturating_sub(s.quote_cursor))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn fetch_quote(&self, event: &EventDescriptor) -> FeedResponse<Quote> {
        let mut streams = self.streams.lock().await;
        let Some(stream) = streams.get_mut(&event.id) else {
            return FeedResponse::NotYetAvailable;
        };
        match stream.samples.get(stream.quote_cursor) {
            Some(sample) => {
                stream.quote_cursor += 1;
                FeedResponse::Ready(sample.quote.clone())
            }
            None => FeedResponse::Settled,
        }
    }
}

#[async_trait]
impl EventStateFeed for ReplayFeed {
    async fn fetch_state(&self, event: &EventDescriptor) -> FeedResponse<EventSnapshot> {
        let mut streams = self.streams.lock().await;
        let Some(stream) = streams.get_mut(&event.id) else {
            return FeedResponse::NotYetAvailable;
        };
        match stream.samples.get(stream.state_cursor) {
            Some(sample) => {
                stream.state_cursor += 1;
                FeedResponse::Ready(sample.snapshot.clone())
            }
            None => FeedResponse::Settled,
        }
    }
}

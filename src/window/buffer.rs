//! Per-event sample buffer

use crate::feed::Sample;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Time-ordered, bounded buffer of samples for one event
///
/// Timestamps are strictly increasing; anything not newer than the newest
/// sample is dropped as a duplicate.
#[derive(Debug, Clone)]
pub struct FeatureWindow {
    /// Samples older than newest - horizon are evicted
    horizon: Duration,
    samples: VecDeque<Sample>,
}

impl FeatureWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample, returning false for stale or duplicate timestamps
    pub fn push(&mut self, sample: Sample) -> bool {
        let timestamp = sample.timestamp();
        if let Some(newest) = self.newest_timestamp() {
            if timestamp <= newest {
                return false;
            }
        }
        self.samples.push_back(sample);

        let cutoff = timestamp - self.horizon;
        while let Some(front) = self.samples.front() {
            if front.timestamp() < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.newest().map(Sample::timestamp)
    }

    /// Time covered from oldest to newest sample
    pub fn span(&self) -> Duration {
        match (self.oldest(), self.newest()) {
            (Some(oldest), Some(newest)) => newest.timestamp() - oldest.timestamp(),
            _ => Duration::zero(),
        }
    }

    /// Whether at least `min` of history is held
    pub fn has_history(&self, min: Duration) -> bool {
        !self.is_empty() && self.span() >= min
    }

    /// Newest sample at or before `at`, falling back to the oldest sample
    pub fn at_or_before(&self, at: DateTime<Utc>) -> Option<&Sample> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.timestamp() <= at)
            .or_else(|| self.oldest())
    }

    /// Samples with timestamps at or after `since`, oldest first
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(move |s| s.timestamp() >= since)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

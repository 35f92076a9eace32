//! Global request spacing
//!
//! Every outbound feed call takes a slot first. Slots are handed out at
//! least `spacing` apart no matter how many events are syncing at once.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval limiter shared by all feed calls
#[derive(Debug)]
pub struct RequestSpacer {
    spacing: Duration,
    next_slot: Mutex<Instant>,
}

impl RequestSpacer {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait for the next free slot
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.spacing;
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

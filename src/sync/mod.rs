//! Event synchronization module
//!
//! Feed polling per event, gated by one request spacer shared across all
//! outstanding calls.

mod spacer;
mod synchronizer;

pub use spacer::RequestSpacer;
pub use synchronizer::{EventSynchronizer, SyncOutcome, SyncState};

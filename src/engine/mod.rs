//! Engine module
//!
//! Owns the tick loop, the session totals, and the per-tick status line.

mod report;
mod scheduler;
mod session;

pub use report::TickReport;
pub use scheduler::{Collaborators, Scheduler};
pub use session::{Session, SessionSummary};

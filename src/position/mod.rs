//! Position lifecycle module
//!
//! OPEN -> CLOSED, evaluated once per tick against the freshest observation.
//! Every close yields exactly one [`Trade`].

mod machine;
mod types;

pub use machine::{ExitPolicy, Observation, PositionBook};
pub use types::{ExitReason, OpenRequest, Position, PositionStatus, Side, Trade};

//! Position and trade types

use crate::feed::Team;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contract side held
///
/// Quotes price the "home team wins" contract; `No` holds its complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Yes,
    No,
}

impl Side {
    /// Price of the held contract given the home-wins mid
    pub fn held_price(&self, home_mid: Decimal) -> Decimal {
        match self {
            Side::Yes => home_mid,
            Side::No => Decimal::ONE - home_mid,
        }
    }

    /// Whether this side pays out for the given winner
    pub fn wins_with(&self, winner: Team) -> bool {
        matches!((self, winner), (Side::Yes, Team::Home) | (Side::No, Team::Away))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

/// Position lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Predicted hold elapsed
    TimeExit,
    /// Event resolved
    Settlement,
    /// Session ended with the position still open
    SessionStop,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TimeExit => "time_exit",
            ExitReason::Settlement => "settlement",
            ExitReason::SessionStop => "session_stop",
        }
    }
}

/// Instruction to open a paper position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub event_id: String,
    pub side: Side,
    /// Held-contract price at entry
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub contracts: u32,
    /// Classifier probability that triggered the entry
    pub probability: f64,
    pub predicted_hold_minutes: u32,
}

/// A paper position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub event_id: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub contracts: u32,
    pub entry_fee: Decimal,
    pub probability: f64,
    pub predicted_hold_minutes: u32,
    pub status: PositionStatus,
    /// Hold-to-settlement has engaged; never resets
    pub exit_override: bool,
    /// Last observed tradeable price of the held contract
    pub last_price: Decimal,
}

/// Immutable summary of a closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub position_id: Uuid,
    pub event_id: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub contracts: u32,
    pub gross_pnl: Decimal,
    pub entry_fee: Decimal,
    pub exit_fee: Decimal,
    pub net_pnl: Decimal,
    pub won: bool,
    pub exit_override: bool,
    pub exit_reason: ExitReason,
    pub probability: f64,
    pub predicted_hold_minutes: u32,
}

impl Trade {
    pub fn total_fees(&self) -> Decimal {
        self.entry_fee + self.exit_fee
    }

    pub fn hold_minutes(&self) -> i64 {
        (self.exit_time - self.entry_time).num_minutes()
    }
}

//! Per-event position book and exit policy
//!
//! Exit precedence per tick:
//! 1. event FINAL: settle at 1/0 for the held side, exit fee 0
//! 2. hold-to-settlement: late final period, held price and score gap both
//!    extreme; engages `exit_override` and suppresses the timed exit
//! 3. timed exit: predicted hold elapsed, close at the held mid, both fees

use super::types::{ExitReason, OpenRequest, Position, PositionStatus, Trade};
use crate::config::{GameConfig, HoldToSettlementConfig};
use crate::feed::{EventSnapshot, EventStatus, Quote};
use crate::fees::FeeCalculator;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// What the state machine sees for one event on one tick
#[derive(Debug, Clone)]
pub struct Observation {
    /// Latest game state
    pub snapshot: EventSnapshot,
    /// Freshest tradeable quote, if the market still has one
    pub quote: Option<Quote>,
    /// Timestamp of the freshest sample; drives hold timing
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Exit {
    price: Decimal,
    fee: Decimal,
    reason: ExitReason,
}

/// Exit rules shared by every book
#[derive(Debug, Clone)]
pub struct ExitPolicy {
    hold: HoldToSettlementConfig,
    game: GameConfig,
    fees: FeeCalculator,
}

impl ExitPolicy {
    pub fn new(hold: HoldToSettlementConfig, game: GameConfig, fees: FeeCalculator) -> Self {
        Self { hold, game, fees }
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    /// Conditions under which a timed exit gives way to settlement
    fn hold_engages(&self, snapshot: &EventSnapshot, held_price: Decimal) -> bool {
        let clock_minutes = snapshot.clock_remaining.as_secs_f64() / 60.0;
        self.hold.enabled
            && snapshot.is_final_period(&self.game)
            && clock_minutes < self.hold.time_remaining_cutoff_minutes
            && held_price >= self.hold.min_probability
            && snapshot.score_diff().unsigned_abs() >= u64::from(self.hold.min_score_diff)
    }

    /// Apply the exit precedence to one open position
    fn decide(&self, position: &mut Position, obs: &Observation) -> Option<Exit> {
        let current = obs.quote.as_ref().map(|q| position.side.held_price(q.mid));
        if let Some(price) = current {
            position.last_price = price;
        }

        if obs.snapshot.status == EventStatus::Final {
            // A tie has no winner; fall back to the last seen price
            let price = match obs.snapshot.winner() {
                Some(winner) if position.side.wins_with(winner) => Decimal::ONE,
                Some(_) => Decimal::ZERO,
                None => position.last_price,
            };
            return Some(Exit {
                price,
                fee: self.fees.settlement_fee(position.contracts),
                reason: ExitReason::Settlement,
            });
        }

        let price = current?;

        if !position.exit_override && self.hold_engages(&obs.snapshot, price) {
            tracing::info!(
                position_id = %position.id,
                event_id = %position.event_id,
                price = %price,
                score_diff = obs.snapshot.score_diff(),
                "Hold-to-settlement engaged"
            );
            position.exit_override = true;
        }
        if position.exit_override {
            return None;
        }

        let held = obs.at - position.entry_time;
        if held >= Duration::minutes(i64::from(position.predicted_hold_minutes)) {
            return Some(Exit {
                price,
                fee: self.fees.fee(price, position.contracts),
                reason: ExitReason::TimeExit,
            });
        }
        None
    }

    fn close(&self, mut position: Position, exit: Exit, at: DateTime<Utc>) -> Trade {
        position.status = PositionStatus::Closed;
        let contracts = Decimal::from(position.contracts);
        let gross_pnl = (exit.price - position.entry_price) * contracts;
        let net_pnl = gross_pnl - position.entry_fee - exit.fee;

        Trade {
            position_id: position.id,
            event_id: position.event_id,
            side: position.side,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            exit_price: exit.price,
            exit_time: at,
            contracts: position.contracts,
            gross_pnl,
            entry_fee: position.entry_fee,
            exit_fee: exit.fee,
            net_pnl,
            won: net_pnl > Decimal::ZERO,
            exit_override: position.exit_override,
            exit_reason: exit.reason,
            probability: position.probability,
            predicted_hold_minutes: position.predicted_hold_minutes,
        }
    }
}

/// Open positions for a single event
#[derive(Debug, Clone)]
pub struct PositionBook {
    event_id: String,
    max_open: usize,
    open: Vec<Position>,
}

impl PositionBook {
    pub fn new(event_id: impl Into<String>, max_open: usize) -> Self {
        Self {
            event_id: event_id.into(),
            max_open,
            open: Vec::new(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn has_open(&self) -> bool {
        !self.open.is_empty()
    }

    /// Whether the per-event cap allows another position
    pub fn can_open(&self) -> bool {
        self.open.len() < self.max_open
    }

    pub fn positions(&self) -> &[Position] {
        &self.open
    }

    /// Open a position, or `None` when the cap is reached
    pub fn open(&mut self, request: OpenRequest, fees: &FeeCalculator) -> Option<Position> {
        if !self.can_open() || request.event_id != self.event_id {
            return None;
        }

        let position = Position {
            id: Uuid::new_v4(),
            event_id: request.event_id,
            side: request.side,
            entry_price: request.entry_price,
            entry_time: request.entry_time,
            contracts: request.contracts,
            entry_fee: fees.fee(request.entry_price, request.contracts),
            probability: request.probability,
            predicted_hold_minutes: request.predicted_hold_minutes,
            status: PositionStatus::Open,
            exit_override: false,
            last_price: request.entry_price,
        };
        self.open.push(position.clone());
        Some(position)
    }

    /// Run exit rules for every open position
    pub fn evaluate(&mut self, policy: &ExitPolicy, obs: &Observation) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut still_open = Vec::with_capacity(self.open.len());

        for mut position in self.open.drain(..) {
            match policy.decide(&mut position, obs) {
                Some(exit) => trades.push(policy.close(position, exit, obs.at)),
                None => still_open.push(position),
            }
        }

        self.open = still_open;
        trades
    }

    /// Close everything at the last observed price with no exit fee
    pub fn force_close(&mut self, policy: &ExitPolicy, at: DateTime<Utc>) -> Vec<Trade> {
        self.open
            .drain(..)
            .map(|position| {
                let exit = Exit {
                    price: position.last_price,
                    fee: policy.fees.settlement_fee(position.contracts),
                    reason: ExitReason::SessionStop,
                };
                policy.close(position, exit, at)
            })
            .collect()
    }
}

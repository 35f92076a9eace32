//! Session accounting and summary reporting

use crate::position::Trade;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Running totals for one engine session, owned by the scheduler
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    events: BTreeSet<String>,
    ticks: u64,
    signals: u64,
    discarded_signals: u64,
    trades: Vec<Trade>,
}

impl Session {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            events: BTreeSet::new(),
            ticks: 0,
            signals: 0,
            discarded_signals: 0,
            trades: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn track_event(&mut self, event_id: &str) {
        if !self.events.contains(event_id) {
            self.events.insert(event_id.to_string());
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// Count a qualifying signal; `accepted` is false when it was discarded
    pub fn record_signal(&mut self, accepted: bool) {
        self.signals += 1;
        if !accepted {
            self.discarded_signals += 1;
        }
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Net P&L realized so far
    pub fn realized_pnl(&self) -> Decimal {
        self.trades.iter().map(|t| t.net_pnl).sum()
    }

    pub fn summarize(&self, ended_at: DateTime<Utc>) -> SessionSummary {
        let wins = self.trades.iter().filter(|t| t.won).count() as u64;
        SessionSummary {
            session_id: self.id,
            started_at: self.started_at,
            ended_at,
            events_monitored: self.events.len(),
            ticks: self.ticks,
            signals: self.signals,
            discarded_signals: self.discarded_signals,
            trades: self.trades.len() as u64,
            wins,
            losses: self.trades.len() as u64 - wins,
            gross_pnl: self.trades.iter().map(|t| t.gross_pnl).sum(),
            total_fees: self.trades.iter().map(|t| t.total_fees()).sum(),
            net_pnl: self.realized_pnl(),
            overrides_used: self.trades.iter().filter(|t| t.exit_override).count() as u64,
        }
    }
}

/// Summary statistics for a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub events_monitored: usize,
    pub ticks: u64,
    /// Probabilities at or above the entry threshold
    pub signals: u64,
    /// Signals dropped by the per-event cap or a failed hold estimate
    pub discarded_signals: u64,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub gross_pnl: Decimal,
    pub total_fees: Decimal,
    pub net_pnl: Decimal,
    /// Trades that closed with hold-to-settlement engaged
    pub overrides_used: u64,
}

impl SessionSummary {
    /// Fraction of trades with positive net P&L
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }

    pub fn avg_net_pnl(&self) -> Decimal {
        if self.trades == 0 {
            return Decimal::ZERO;
        }
        self.net_pnl / Decimal::from(self.trades)
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        let duration = self.ended_at - self.started_at;
        format!(
            r#"
══════════════════════════════════════════════════════
               SESSION SUMMARY
══════════════════════════════════════════════════════
Session:          {}
Duration:         {}m {}s

PERFORMANCE
───────────────────────────────────────────────────────
Net P&L:          {:+.2}
Gross P&L:        {:+.2}
Total Fees:       {:.2}
Avg Net/Trade:    {:+.4}
Win Rate:         {:.1}%

ACTIVITY
───────────────────────────────────────────────────────
Events:           {}
Ticks:            {}
Signals:          {} ({} discarded)
Trades:           {} ({}W / {}L)
Held to Settle:   {}
══════════════════════════════════════════════════════
"#,
            self.session_id,
            duration.num_minutes(),
            duration.num_seconds() % 60,
            self.net_pnl,
            self.gross_pnl,
            self.total_fees,
            self.avg_net_pnl(),
            self.win_rate() * 100.0,
            self.events_monitored,
            self.ticks,
            self.signals,
            self.discarded_signals,
            self.trades,
            self.wins,
            self.losses,
            self.overrides_used,
        )
    }

    /// Net P&L as a float for gauges
    pub fn net_pnl_f64(&self) -> f64 {
        self.net_pnl.to_f64().unwrap_or(0.0)
    }
}

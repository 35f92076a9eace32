//! Feed data types

use crate::config::{EventConfig, GameConfig};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static description of a monitored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Event identifier on the score feed
    pub id: String,
    /// Home team code
    pub home: String,
    /// Away team code
    pub away: String,
    /// Market for the "home team wins" contract
    pub market_ticker: String,
    /// Scheduled start
    pub start_time: Option<DateTime<Utc>>,
}

impl EventDescriptor {
    /// Descriptor for an event known only by id, as in recorded samples
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            market_ticker: id.clone(),
            id,
            home: String::new(),
            away: String::new(),
            start_time: None,
        }
    }
}

impl From<&EventConfig> for EventDescriptor {
    fn from(config: &EventConfig) -> Self {
        Self {
            id: config.id.clone(),
            home: config.home.clone(),
            away: config.away.clone(),
            market_ticker: config.market_ticker.clone(),
            start_time: config.start_time,
        }
    }
}

/// Event lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Live,
    Final,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Live => "live",
            EventStatus::Final => "final",
        }
    }
}

/// Team that won a settled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Team {
    Home,
    Away,
}

/// Top of book for the "home team wins" contract
///
/// Prices are fractions of a dollar in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
}

impl Quote {
    /// Build a quote with mid derived from bid/ask
    pub fn new(event_id: impl Into<String>, timestamp: DateTime<Utc>, bid: Decimal, ask: Decimal) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            bid,
            ask,
            mid: (bid + ask) / Decimal::TWO,
        }
    }

    /// Whether this quote can be used as a live entry or exit price
    ///
    /// A settled market reports bid = ask = 0, which is not a price.
    pub fn is_tradeable(&self) -> bool {
        if self.bid.is_zero() && self.ask.is_zero() {
            return false;
        }
        self.mid > Decimal::ZERO && self.mid < Decimal::ONE && self.bid <= self.ask
    }
}

/// Score and clock snapshot from the event-state feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub score_home: u32,
    pub score_away: u32,
    /// 1-based period; 0 before tip-off
    pub period: u32,
    /// Time left in the current period
    pub clock_remaining: Duration,
    pub status: EventStatus,
}

impl EventSnapshot {
    /// Home minus away
    pub fn score_diff(&self) -> i64 {
        i64::from(self.score_home) - i64::from(self.score_away)
    }

    /// Winner once final; None for a tie or an unfinished event
    pub fn winner(&self) -> Option<Team> {
        if self.status != EventStatus::Final {
            return None;
        }
        match self.score_home.cmp(&self.score_away) {
            std::cmp::Ordering::Greater => Some(Team::Home),
            std::cmp::Ordering::Less => Some(Team::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Regulation periods or overtime at or after the last regulation period
    pub fn is_final_period(&self, game: &GameConfig) -> bool {
        self.period >= game.regulation_periods
    }

    fn clock_minutes(&self) -> f64 {
        self.clock_remaining.as_secs_f64() / 60.0
    }

    /// Minutes of game time elapsed
    pub fn game_minute(&self, game: &GameConfig) -> f64 {
        if self.period == 0 {
            return 0.0;
        }
        let reg = game.regulation_periods;
        let minute = if self.period <= reg {
            f64::from(self.period - 1) * game.period_minutes
                + (game.period_minutes - self.clock_minutes())
        } else {
            f64::from(reg) * game.period_minutes
                + f64::from(self.period - reg - 1) * game.overtime_minutes
                + (game.overtime_minutes - self.clock_minutes())
        };
        minute.max(0.0)
    }

    /// Minutes of game time left, assuming no further overtime
    pub fn time_remaining_minutes(&self, game: &GameConfig) -> f64 {
        let reg = game.regulation_periods;
        if self.period == 0 {
            return f64::from(reg) * game.period_minutes;
        }
        let remaining = if self.period < reg {
            self.clock_minutes() + f64::from(reg - self.period) * game.period_minutes
        } else {
            self.clock_minutes()
        };
        remaining.max(0.0)
    }
}

/// One synchronized observation: a quote paired with the game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub quote: Quote,
    pub snapshot: EventSnapshot,
}

impl Sample {
    /// Freshest of the two feed timestamps
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.quote.timestamp.max(self.snapshot.timestamp)
    }

    pub fn event_id(&self) -> &str {
        &self.quote.event_id
    }
}

/// Live state of an event, updated from feed snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub descriptor: EventDescriptor,
    pub status: EventStatus,
    pub score_home: u32,
    pub score_away: u32,
    pub period: u32,
    pub clock_remaining: Duration,
    pub last_update: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(descriptor: EventDescriptor) -> Self {
        Self {
            descriptor,
            status: EventStatus::Scheduled,
            score_home: 0,
            score_away: 0,
            period: 0,
            clock_remaining: Duration::ZERO,
            last_update: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Apply a snapshot if it is newer than the last one seen
    ///
    /// Returns false for stale or duplicate snapshots. Scores are not
    /// assumed monotonic; only timestamps order updates.
    pub fn apply(&mut self, snapshot: &EventSnapshot) -> bool {
        if let Some(last) = self.last_update {
            if snapshot.timestamp <= last {
                return false;
            }
        }
        self.status = snapshot.status;
        self.score_home = snapshot.score_home;
        self.score_away = snapshot.score_away;
        self.period = snapshot.period;
        self.clock_remaining = snapshot.clock_remaining;
        self.last_update = Some(snapshot.timestamp);
        true
    }

    /// Final snapshot of the current state
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            event_id: self.descriptor.id.clone(),
            timestamp: self.last_update.unwrap_or_else(Utc::now),
            score_home: self.score_home,
            score_away: self.score_away,
            period: self.period,
            clock_remaining: self.clock_remaining,
            status: self.status,
        }
    }
}

/// Parse a game clock
///
/// Accepts ISO-8601 durations as published by live score feeds
/// (`PT05M30.00S`), `MM:SS`, or plain seconds.
pub fn parse_clock(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let secs = if let Some(iso) = raw.strip_prefix("PT") {
        let iso = iso.strip_suffix('S').unwrap_or(iso);
        match iso.split_once('M') {
            Some((minutes, seconds)) => {
                let minutes: f64 = minutes.parse().ok()?;
                let seconds: f64 = if seconds.is_empty() { 0.0 } else { seconds.parse().ok()? };
                minutes * 60.0 + seconds
            }
            None => iso.parse().ok()?,
        }
    } else if let Some((minutes, seconds)) = raw.split_once(':') {
        let minutes: f64 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;
        minutes * 60.0 + seconds
    } else {
        raw.parse().ok()?
    };

    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

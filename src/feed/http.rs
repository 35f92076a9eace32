//! HTTP adapters for the market and event-state feeds
//!
//! Both feeds are plain JSON-over-HTTP polls. Status codes map onto
//! [`FeedResponse`] states; anything that decodes but fails sanity checks
//! is reported as malformed rather than passed on.

use super::types::{parse_clock, EventDescriptor, EventSnapshot, EventStatus, Quote};
use super::{EventStateFeed, FeedResponse, MarketFeed};
use crate::config::FeedConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Quote payload from the market feed
#[derive(Debug, Deserialize)]
struct QuoteDto {
    bid: Decimal,
    ask: Decimal,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<String>,
}

/// Clock as either an ISO duration / MM:SS string or seconds
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClockDto {
    Text(String),
    Seconds(f64),
}

/// Game state payload from the event feed
#[derive(Debug, Deserialize)]
struct EventStateDto {
    status: String,
    score_home: u32,
    score_away: u32,
    #[serde(default)]
    period: u32,
    #[serde(default)]
    clock: Option<ClockDto>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))
}

/// Map a non-success status onto a feed state
fn classify_status<T>(status: StatusCode, retry_after: Option<Duration>) -> FeedResponse<T> {
    match status {
        StatusCode::NOT_FOUND => FeedResponse::NotYetAvailable,
        StatusCode::GONE => FeedResponse::Settled,
        StatusCode::TOO_MANY_REQUESTS => FeedResponse::RateLimited { retry_after },
        s if s.is_server_error() => FeedResponse::TransientError(format!("server error {}", s)),
        s => FeedResponse::Malformed(format!("unexpected status {}", s)),
    }
}

fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> FeedResponse<T> {
    tracing::trace!(url = %url, "Polling feed");

    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => return FeedResponse::TransientError(e.to_string()),
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        return classify_status(status, retry_after);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return FeedResponse::TransientError(e.to_string()),
    };
    match serde_json::from_str(&body) {
        Ok(value) => FeedResponse::Ready(value),
        Err(e) => FeedResponse::Malformed(format!("invalid body: {}", e)),
    }
}

fn quote_from_dto(event_id: &str, dto: QuoteDto) -> FeedResponse<Quote> {
    if matches!(dto.status.as_deref(), Some("settled") | Some("finalized")) {
        return FeedResponse::Settled;
    }
    let unit = Decimal::ZERO..=Decimal::ONE;
    if !unit.contains(&dto.bid) || !unit.contains(&dto.ask) {
        return FeedResponse::Malformed(format!(
            "price outside [0, 1]: bid {} ask {}",
            dto.bid, dto.ask
        ));
    }
    if dto.bid > dto.ask {
        return FeedResponse::Malformed(format!("crossed book: bid {} ask {}", dto.bid, dto.ask));
    }
    let timestamp = dto.timestamp.unwrap_or_else(Utc::now);
    FeedResponse::Ready(Quote::new(event_id, timestamp, dto.bid, dto.ask))
}

fn snapshot_from_dto(event_id: &str, dto: EventStateDto) -> FeedResponse<EventSnapshot> {
    let status = match dto.status.to_ascii_lowercase().as_str() {
        "scheduled" | "pre" | "pregame" => EventStatus::Scheduled,
        "live" | "in_progress" | "halftime" => EventStatus::Live,
        "final" | "closed" => EventStatus::Final,
        other => return FeedResponse::Malformed(format!("unknown event status {:?}", other)),
    };
    if status == EventStatus::Scheduled {
        return FeedResponse::NotYetAvailable;
    }

    let clock_remaining = match dto.clock {
        Some(ClockDto::Text(raw)) => match parse_clock(&raw) {
            Some(clock) => clock,
            None => return FeedResponse::Malformed(format!("unparseable clock {:?}", raw)),
        },
        Some(ClockDto::Seconds(secs)) if secs.is_finite() && secs >= 0.0 => {
            Duration::from_secs_f64(secs)
        }
        Some(ClockDto::Seconds(secs)) => {
            return FeedResponse::Malformed(format!("invalid clock {}", secs))
        }
        None => Duration::ZERO,
    };

    FeedResponse::Ready(EventSnapshot {
        event_id: event_id.to_string(),
        timestamp: dto.timestamp.unwrap_or_else(Utc::now),
        score_home: dto.score_home,
        score_away: dto.score_away,
        period: dto.period,
        clock_remaining,
        status,
    })
}

/// Polls `{base}/markets/{ticker}/quote`
pub struct HttpMarketFeed {
    base_url: String,
    client: Client,
}

impl HttpMarketFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.market_base_url.trim_end_matches('/').to_string(),
            client: build_client(config.request_timeout_secs)?,
        })
    }

    fn quote_url(&self, event: &EventDescriptor) -> String {
        format!("{}/markets/{}/quote", self.base_url, event.market_ticker)
    }
}

#[async_trait]
impl MarketFeed for HttpMarketFeed {
    async fn fetch_quote(&self, event: &EventDescriptor) -> FeedResponse<Quote> {
        get_json::<QuoteDto>(&self.client, &self.quote_url(event))
            .await
            .and_then(|dto| quote_from_dto(&event.id, dto))
    }
}

/// Polls `{base}/events/{id}/state`
pub struct HttpEventFeed {
    base_url: String,
    client: Client,
}

impl HttpEventFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.event_base_url.trim_end_matches('/').to_string(),
            client: build_client(config.request_timeout_secs)?,
        })
    }

    fn state_url(&self, event: &EventDescriptor) -> String {
        format!("{}/events/{}/state", self.base_url, event.id)
    }
}

#[async_trait]
impl EventStateFeed for HttpEventFeed {
    async fn fetch_state(&self, event: &EventDescriptor) -> FeedResponse<EventSnapshot> {
        get_json::<EventStateDto>(&self.client, &self.state_url(event))
            .await
            .and_then(|dto| snapshot_from_dto(&event.id, dto))
    }
}

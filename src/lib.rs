//! scoreline: paper trading for live sports event-outcome markets
//!
//! This library provides the core components for:
//! - Polling market quotes and game state for live events
//! - Rolling feature windows over paired samples
//! - Entry decisions from a pluggable classifier and hold estimator
//! - Per-event position books with settlement-aware exits
//! - A tick-driven scheduler with graceful shutdown
//! - Session capture to Parquet
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod decision;
pub mod engine;
pub mod error;
pub mod feed;
pub mod fees;
pub mod model;
pub mod position;
pub mod sync;
pub mod telemetry;
pub mod window;

pub use error::{Error, Result};

//! Integration tests for scoreline

mod common;
mod e2e_test;
mod feed_test;
mod persistence_test;

// src/notify.rs

//! Outbound event surface for sweep results.
//!
//! The chat frontend that renders user-facing messages is an external
//! collaborator; the engine only speaks through [`EventSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::fetch::FetchError;
use crate::models::StateChangeEvent;

/// Consumer of engine events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// An active item's verdict flipped.
    async fn on_state_change(&self, event: &StateChangeEvent);

    /// A single item's fetch failed. The sweep continues regardless.
    async fn on_fetch_error(&self, id: &str, error: &FetchError);

    /// A full sweep finished.
    async fn on_sweep_complete(&self, at: DateTime<Utc>, item_count: usize);
}

/// Sink that reports events through the process log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn on_state_change(&self, event: &StateChangeEvent) {
        if event.is_restock() {
            log::info!("RESTOCK ALERT: {}", event.format("{id} is back in stock ({url_fragment})"));
        } else {
            log::info!("{}", event.format("{id} is now sold out ({url_fragment})"));
        }
    }

    async fn on_fetch_error(&self, id: &str, error: &FetchError) {
        log::warn!("Check failed for {}: {}", id, error);
    }

    async fn on_sweep_complete(&self, at: DateTime<Utc>, item_count: usize) {
        log::info!(
            "Sweep complete at {}: {} items checked",
            at.format("%Y-%m-%d %H:%M:%S"),
            item_count
        );
    }
}

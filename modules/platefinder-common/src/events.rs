//! Cross-module seams: event publication and enrichment triggering.
//!
//! The pipeline publishes frames without knowing whether a subscriber
//! exists; the session hub decides delivery vs backlog. Enrichment is a
//! fire-and-forget trigger so the main response is never blocked on it.

use async_trait::async_trait;

use crate::protocol::{Channel, ServerFrame};
use crate::types::RestaurantResult;

/// Publishes a frame for `(channel, request_id)`. Implemented by the session
/// hub; a no-op implementation serves tests and headless runs.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, channel: Channel, request_id: &str, frame: ServerFrame);
}

pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, _channel: Channel, _request_id: &str, _frame: ServerFrame) {}
}

/// Attaches PENDING provider slots to finalized results and schedules
/// deep-link resolution for them. Must return quickly.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(
        &self,
        request_id: &str,
        results: &mut [RestaurantResult],
        city_text: Option<&str>,
    );
}

pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(
        &self,
        _request_id: &str,
        _results: &mut [RestaurantResult],
        _city_text: Option<&str>,
    ) {
    }
}

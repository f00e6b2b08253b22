use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use platefinder_common::detect_language;
use platefinder_common::sanitize_region_code;
use platefinder_common::types::{LatLng, QueryLanguage, SearchRequest, StageTimings};

/// Per-request state. Created on acceptance, destroyed when the orchestrator
/// returns or is cancelled. Single-owner: only the orchestrator mutates it.
pub struct RequestContext {
    pub request_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    started_instant: Instant,
    pub user_location: Option<LatLng>,
    pub user_region_code: Option<String>,
    pub query_language: QueryLanguage,
    pub cancel: CancellationToken,
    pub timings: StageTimings,
    pub cache_hits: u32,
}

impl RequestContext {
    pub fn new(request: &SearchRequest) -> Self {
        let request_id = request
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            session_id: request.session_id.clone(),
            started_at: Utc::now(),
            started_instant: Instant::now(),
            user_location: request.user_location,
            user_region_code: sanitize_region_code(request.user_region_code.as_deref()),
            query_language: detect_language(&request.query),
            cancel: CancellationToken::new(),
            timings: StageTimings::default(),
            cache_hits: 0,
        }
    }

    /// Time a stage and record it into the named timing slot.
    pub fn record<T>(&mut self, slot: TimingSlot, started: Instant, value: T) -> T {
        let elapsed = started.elapsed().as_millis() as u64;
        match slot {
            TimingSlot::Gate => self.timings.gate = elapsed,
            TimingSlot::Intent => self.timings.intent = elapsed,
            TimingSlot::RouteLlm => self.timings.route_llm = elapsed,
            TimingSlot::Provider => self.timings.provider = elapsed,
            TimingSlot::PostFilter => self.timings.post_filter = elapsed,
            TimingSlot::Rank => self.timings.rank = elapsed,
        }
        value
    }

    pub fn finish_timings(&mut self) {
        self.timings.total = self.started_instant.elapsed().as_millis() as u64;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum TimingSlot {
    Gate,
    Intent,
    RouteLlm,
    Provider,
    PostFilter,
    Rank,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            session_id: "sess-1".to_string(),
            request_id: None,
            user_location: None,
            user_region_code: None,
        }
    }

    #[test]
    fn generates_request_id_when_absent() {
        let ctx = RequestContext::new(&request("pizza"));
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn keeps_caller_request_id() {
        let mut req = request("pizza");
        req.request_id = Some("req-42".to_string());
        let ctx = RequestContext::new(&req);
        assert_eq!(ctx.request_id, "req-42");
    }

    #[test]
    fn detects_language_and_sanitizes_region() {
        let mut req = request("מסעדה כשרה בחיפה");
        req.user_region_code = Some("il".to_string());
        let ctx = RequestContext::new(&req);
        assert_eq!(ctx.query_language, QueryLanguage::He);
        // lowercase region codes are dropped, not upcased
        assert_eq!(ctx.user_region_code, None);
    }
}

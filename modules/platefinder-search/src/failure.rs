//! Deterministic failure-reason selection at response assembly.
//!
//! Precedence: explicit error → geocoding → empty pool → weak confidence →
//! live data gaps → thin matches → NONE. Critical reasons drive recover.

use platefinder_common::types::{FailureReason, OpenNow, RestaurantResult};

const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
const WEAK_MATCH_CONFIDENCE: f64 = 0.7;
const WEAK_MATCH_COUNT: usize = 3;
const LIVE_DATA_TOP_N: usize = 3;

pub struct FailureInputs<'a> {
    /// Explicit error already mapped (TIMEOUT / QUOTA_EXCEEDED / PROVIDER_ERROR).
    pub explicit: Option<FailureReason>,
    pub geocoding_failed: bool,
    pub results: &'a [RestaurantResult],
    pub intent_confidence: f64,
    pub live_data_requested: bool,
}

pub fn detect_failure(inputs: FailureInputs<'_>) -> FailureReason {
    if let Some(reason) = inputs.explicit {
        return reason;
    }
    if inputs.geocoding_failed {
        return FailureReason::GeocodingFailed;
    }
    if inputs.results.is_empty() {
        return FailureReason::NoResults;
    }
    if inputs.intent_confidence < LOW_CONFIDENCE_THRESHOLD {
        return FailureReason::LowConfidence;
    }
    if inputs.live_data_requested {
        let top = &inputs.results[..inputs.results.len().min(LIVE_DATA_TOP_N)];
        if !top.is_empty() && top.iter().all(|r| r.open_now == OpenNow::Unknown) {
            return FailureReason::LiveDataUnavailable;
        }
    }
    if inputs.results.len() < WEAK_MATCH_COUNT && inputs.intent_confidence < WEAK_MATCH_CONFIDENCE {
        return FailureReason::WeakMatches;
    }
    FailureReason::None
}

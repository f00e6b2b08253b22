//! Shared-filters tightening: deterministic resolution of language, region,
//! open-state, and price filters from intent, base hints, device values, and
//! defaults. Every resolution records its source.

use tracing::debug;

use platefinder_common::region::{
    price_bands, price_levels_for_intent, sanitize_region_code, DEFAULT_REGION,
};
use platefinder_common::types::{
    Disclaimers, FilterSource, FinalSharedFilters, GateResult, IntentResult, PostConstraints,
    PriceIntent, PriceLevelRange, QueryLanguage, UiLanguage,
};

/// Resolve language and region before route planning. `reverse_region` is
/// the reverse-geocoded country of the device location, when available.
pub fn resolve_shared_filters(
    gate: &GateResult,
    intent: &IntentResult,
    device_region: Option<&str>,
    reverse_region: Option<&str>,
) -> FinalSharedFilters {
    let (provider_language, language_source) = resolve_language(gate, intent);
    let (region_code, region_source) = resolve_region(intent, device_region, reverse_region);

    let ui_language = if provider_language == QueryLanguage::He {
        UiLanguage::He
    } else {
        UiLanguage::En
    };

    let price_intent = match intent.hybrid.price_intent {
        PriceIntent::Any => None,
        other => Some(other),
    };
    let price_levels = price_intent.and_then(price_levels_for_intent);
    if let Some(stated) = price_intent {
        // Regional amount bands calibrate what each level means locally.
        let bands = price_bands(&region_code);
        debug!(
            price_intent = ?stated,
            cheap_under = bands.cheap_under,
            mid_under = bands.mid_under,
            expensive_over = bands.expensive_over,
            "Price intent resolved against regional bands"
        );
    }

    debug!(
        language = %provider_language,
        language_source = %language_source,
        region = %region_code,
        region_source = %region_source,
        "Shared filters resolved"
    );

    FinalSharedFilters {
        ui_language,
        provider_language,
        region_code,
        open_state: None,
        open_at: None,
        open_between: None,
        price_intent,
        price_levels,
        disclaimers: Disclaimers {
            hours: true,
            dietary: true,
        },
        language_source,
        region_source,
    }
}

fn resolve_language(gate: &GateResult, intent: &IntentResult) -> (QueryLanguage, FilterSource) {
    // Locked by intent when it names a supported language.
    if intent.language.is_supported() {
        return (intent.language, FilterSource::IntentLocked);
    }
    if gate.language.is_supported() {
        return (gate.language, FilterSource::BaseLlm);
    }
    (QueryLanguage::En, FilterSource::Default)
}

fn resolve_region(
    intent: &IntentResult,
    device_region: Option<&str>,
    reverse_region: Option<&str>,
) -> (String, FilterSource) {
    // Locked by intent when the candidate is a valid ISO-2 code. The lock
    // applies on every route.
    if let Some(candidate) = sanitize_region_code(intent.region_candidate.as_deref()) {
        return (candidate, FilterSource::IntentLocked);
    }
    if let Some(region) = sanitize_region_code(reverse_region) {
        return (region, FilterSource::ReverseGeocode);
    }
    if let Some(region) = sanitize_region_code(device_region) {
        return (region, FilterSource::Device);
    }
    if let Some(hint) = sanitize_region_code(intent.region_code.as_deref()) {
        return (hint, FilterSource::BaseLlm);
    }
    (DEFAULT_REGION.to_string(), FilterSource::Default)
}

/// Fold the post-constraints stage's output into the shared filters. The
/// constraint extractor wins on open-state; explicit price levels win over
/// intent-derived ones.
pub fn merge_constraints(filters: &mut FinalSharedFilters, constraints: &PostConstraints) {
    filters.open_state = constraints.open_state;
    filters.open_at = constraints.open_at.clone();
    filters.open_between = constraints.open_between.clone();

    if let Some(range) = constraints.price_level_range {
        filters.price_levels = Some(range);
    } else if let Some(level) = constraints.price_level {
        filters.price_levels = Some(PriceLevelRange {
            min: level,
            max: level,
        });
    }
}

//! Region handling: sanitization, defaults, timezone and price calibration.
//!
//! A region code is a language/market hint. It is never a location anchor —
//! that rule is enforced (and tested) in the orchestrator's guards.

use chrono::FixedOffset;
use regex::Regex;
use std::sync::OnceLock;

use crate::types::{PriceIntent, PriceLevelRange};

pub const DEFAULT_REGION: &str = "IL";

fn region_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Z]{2}$").expect("static regex"))
}

/// Accept only ISO-3166-1 alpha-2 uppercase codes; anything else is dropped.
pub fn sanitize_region_code(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if region_re().is_match(raw) {
        Some(raw.to_string())
    } else {
        None
    }
}

/// Fixed UTC offset per region, used to evaluate OPEN_AT / OPEN_BETWEEN
/// constraints against local wall-clock time. Unknown regions fall back to
/// UTC.
pub fn region_utc_offset(region: &str) -> FixedOffset {
    let hours = match region {
        "IL" => 3,
        "GB" => 1,
        "FR" | "DE" | "ES" | "IT" | "NL" => 2,
        "RU" => 3,
        "AE" => 4,
        "US" => -5,
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).expect("utc"))
}

/// Per-region meal-price bands (local currency) that calibrate price intent
/// to the provider's 1..4 price levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBands {
    pub cheap_under: u32,
    pub mid_under: u32,
    pub expensive_over: u32,
}

pub fn price_bands(region: &str) -> PriceBands {
    match region {
        "IL" => PriceBands {
            cheap_under: 50,
            mid_under: 100,
            expensive_over: 180,
        },
        // US and EU markets share one calibration.
        _ => PriceBands {
            cheap_under: 15,
            mid_under: 30,
            expensive_over: 50,
        },
    }
}

/// Map a price intent onto the provider's level range for filtering.
pub fn price_levels_for_intent(intent: PriceIntent) -> Option<PriceLevelRange> {
    match intent {
        PriceIntent::Any => None,
        PriceIntent::Cheap => Some(PriceLevelRange { min: 1, max: 2 }),
        PriceIntent::Mid => Some(PriceLevelRange { min: 2, max: 3 }),
        PriceIntent::Expensive => Some(PriceLevelRange { min: 3, max: 4 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codes_pass() {
        assert_eq!(sanitize_region_code(Some("IL")), Some("IL".to_string()));
        assert_eq!(sanitize_region_code(Some("US")), Some("US".to_string()));
    }

    #[test]
    fn invalid_codes_are_dropped() {
        assert_eq!(sanitize_region_code(Some("il")), None);
        assert_eq!(sanitize_region_code(Some("ISR")), None);
        assert_eq!(sanitize_region_code(Some("I")), None);
        assert_eq!(sanitize_region_code(Some("1L")), None);
        assert_eq!(sanitize_region_code(None), None);
    }

    #[test]
    fn israel_price_bands() {
        let bands = price_bands("IL");
        assert_eq!(bands.cheap_under, 50);
        assert_eq!(bands.mid_under, 100);
        assert_eq!(bands.expensive_over, 180);
    }

    #[test]
    fn cheap_intent_maps_to_low_levels() {
        assert_eq!(
            price_levels_for_intent(PriceIntent::Cheap),
            Some(PriceLevelRange { min: 1, max: 2 })
        );
        assert_eq!(price_levels_for_intent(PriceIntent::Any), None);
    }

    #[test]
    fn unknown_region_falls_back_to_utc() {
        assert_eq!(region_utc_offset("ZZ").local_minus_utc(), 0);
        assert_eq!(region_utc_offset("IL").local_minus_utc(), 3 * 3600);
    }
}

//! Deterministic post-filtering against the resolved shared filters.
//!
//! Open-state filtering uses the provider-reported status and the current
//! wall-clock time in the request's region. Unknown open status and unknown
//! price level are retained rather than dropped; the failure detector
//! reports LIVE_DATA_UNAVAILABLE when the gap matters.

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::debug;

use platefinder_common::region::region_utc_offset;
use platefinder_common::types::{
    FinalSharedFilters, OpenAt, OpenBetween, OpenNow, OpenState, RestaurantResult,
};

/// An OPEN_AT request within this many minutes of now is treated as open-now.
const OPEN_AT_WINDOW_MIN: i32 = 45;

pub fn apply_post_constraints(
    results: Vec<RestaurantResult>,
    filters: &FinalSharedFilters,
    now: DateTime<Utc>,
) -> Vec<RestaurantResult> {
    let total = results.len();
    let want_open_now = open_filter_applies(filters, now);

    let filtered: Vec<RestaurantResult> = results
        .into_iter()
        .filter(|r| match want_open_now {
            Some(true) => r.open_now != OpenNow::Known(false),
            Some(false) => r.open_now != OpenNow::Known(true),
            None => true,
        })
        .filter(|r| match (filters.price_levels, r.price_level) {
            (Some(range), Some(level)) => level >= range.min && level <= range.max,
            // Unknown price is retained as unknown.
            _ => true,
        })
        .collect();

    debug!(total, kept = filtered.len(), "Post-filter applied");
    filtered
}

/// Whether the open-state constraint collapses to an open-now (or
/// closed-now) check at this moment, in the region's timezone.
fn open_filter_applies(filters: &FinalSharedFilters, now: DateTime<Utc>) -> Option<bool> {
    let local = now.with_timezone(&region_utc_offset(&filters.region_code));
    let weekday = match local.weekday() {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    };
    let minute_of_day = (local.hour() * 60 + local.minute()) as i32;

    match filters.open_state {
        Some(OpenState::OpenNow) => Some(true),
        Some(OpenState::ClosedNow) => Some(false),
        Some(OpenState::OpenAt) => filters
            .open_at
            .as_ref()
            .map(|at| open_at_is_now(at, &weekday, minute_of_day))
            .filter(|&is_now| is_now)
            .map(|_| true),
        Some(OpenState::OpenBetween) => filters
            .open_between
            .as_ref()
            .map(|between| open_between_includes_now(between, &weekday, minute_of_day))
            .filter(|&is_now| is_now)
            .map(|_| true),
        None => None,
    }
}

/// Accepts full day names and common 3-letter abbreviations.
fn day_matches(day: &str, weekday: &str) -> bool {
    let day = day.trim().to_lowercase();
    !day.is_empty() && weekday.starts_with(&day)
}

fn open_at_is_now(at: &OpenAt, weekday: &str, minute_of_day: i32) -> bool {
    if let Some(day) = &at.day {
        if !day_matches(day, weekday) {
            return false;
        }
    }
    match at.time_hhmm.as_deref().and_then(parse_hhmm) {
        Some(target) => (minute_of_day - target).abs() <= OPEN_AT_WINDOW_MIN,
        None => true,
    }
}

fn open_between_includes_now(between: &OpenBetween, weekday: &str, minute_of_day: i32) -> bool {
    if let Some(day) = &between.day {
        if !day_matches(day, weekday) {
            return false;
        }
    }
    let start = between.start_hhmm.as_deref().and_then(parse_hhmm);
    let end = between.end_hhmm.as_deref().and_then(parse_hhmm);
    match (start, end) {
        (Some(start), Some(end)) if start <= end => {
            minute_of_day >= start && minute_of_day <= end
        }
        // Overnight window (e.g. 22:00–02:00).
        (Some(start), Some(end)) => minute_of_day >= start || minute_of_day <= end,
        (Some(start), None) => minute_of_day >= start,
        (None, Some(end)) => minute_of_day <= end,
        (None, None) => true,
    }
}

fn parse_hhmm(raw: &str) -> Option<i32> {
    let (h, m) = raw.split_once(':')?;
    let h: i32 = h.parse().ok()?;
    let m: i32 = m.parse().ok()?;
    if (0..24).contains(&h) && (0..60).contains(&m) {
        Some(h * 60 + m)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::{
        Disclaimers, FilterSource, LatLng, PriceLevelRange, QueryLanguage, UiLanguage,
    };

    fn filters() -> FinalSharedFilters {
        FinalSharedFilters {
            ui_language: UiLanguage::En,
            provider_language: QueryLanguage::En,
            region_code: "IL".to_string(),
            open_state: None,
            open_at: None,
            open_between: None,
            price_intent: None,
            price_levels: None,
            disclaimers: Disclaimers {
                hours: true,
                dietary: true,
            },
            language_source: FilterSource::Default,
            region_source: FilterSource::Default,
        }
    }

    fn result(id: &str, open: OpenNow, price: Option<u8>) -> RestaurantResult {
        RestaurantResult {
            place_id: id.to_string(),
            source: "places".to_string(),
            name: id.to_string(),
            address: String::new(),
            location: LatLng { lat: 0.0, lng: 0.0 },
            rating: None,
            reviews_count: None,
            price_level: price,
            open_now: open,
            tags: vec![],
            google_maps_url: String::new(),
            cuisine_score: None,
            city_match: None,
            distance_km: None,
            providers: Default::default(),
        }
    }

    #[test]
    fn open_now_drops_closed_keeps_unknown() {
        let mut f = filters();
        f.open_state = Some(OpenState::OpenNow);
        let kept = apply_post_constraints(
            vec![
                result("open", OpenNow::Known(true), None),
                result("closed", OpenNow::Known(false), None),
                result("unknown", OpenNow::Unknown, None),
            ],
            &f,
            Utc::now(),
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(ids, vec!["open", "unknown"]);
    }

    #[test]
    fn price_range_keeps_unknown_levels() {
        let mut f = filters();
        f.price_levels = Some(PriceLevelRange { min: 1, max: 2 });
        let kept = apply_post_constraints(
            vec![
                result("cheap", OpenNow::Unknown, Some(1)),
                result("expensive", OpenNow::Unknown, Some(4)),
                result("unknown", OpenNow::Unknown, None),
            ],
            &f,
            Utc::now(),
        );
        let ids: Vec<&str> = kept.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(ids, vec!["cheap", "unknown"]);
    }

    #[test]
    fn open_between_outside_window_passes_through() {
        let mut f = filters();
        f.open_state = Some(OpenState::OpenBetween);
        // A window that cannot include now for any wall clock: empty day gate
        // is avoided by picking a day-less impossible span of one minute at
        // a fixed instant below.
        f.open_between = Some(OpenBetween {
            day: None,
            start_hhmm: Some("03:00".to_string()),
            end_hhmm: Some("03:01".to_string()),
        });
        // 12:00 UTC = 15:00 in IL; outside the window → no filtering.
        let now = DateTime::parse_from_rfc3339("2026-07-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let kept = apply_post_constraints(
            vec![result("closed", OpenNow::Known(false), None)],
            &f,
            now,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn open_between_inside_window_filters() {
        let mut f = filters();
        f.open_state = Some(OpenState::OpenBetween);
        f.open_between = Some(OpenBetween {
            day: None,
            start_hhmm: Some("14:00".to_string()),
            end_hhmm: Some("16:00".to_string()),
        });
        // 12:00 UTC = 15:00 in IL; inside the window.
        let now = DateTime::parse_from_rfc3339("2026-07-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let kept = apply_post_constraints(
            vec![
                result("open", OpenNow::Known(true), None),
                result("closed", OpenNow::Known(false), None),
            ],
            &f,
            now,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].place_id, "open");
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("09:30"), Some(570));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("nope"), None);
    }
}

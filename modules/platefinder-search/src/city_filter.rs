//! Coordinate-based city filter.
//!
//! Distance from the geocoded city centroid decides membership: within
//! 10 km is the city proper, 10–20 km counts as nearby suburbs unless
//! strict mode, beyond 20 km is dropped. When too few survive, the closest
//! dropped results come back as an explicit nearby fallback.

use tracing::info;

use platefinder_common::types::{haversine_km, CityMatch, LatLng, RestaurantResult};

const CITY_RADIUS_KM: f64 = 10.0;
const SUBURB_RADIUS_KM: f64 = 20.0;
const MIN_CITY_RESULTS: usize = 5;

pub fn filter_by_city(
    results: Vec<RestaurantResult>,
    centroid: LatLng,
    strict: bool,
) -> Vec<RestaurantResult> {
    let total = results.len();
    let mut kept: Vec<RestaurantResult> = Vec::new();
    let mut dropped: Vec<(f64, RestaurantResult)> = Vec::new();

    for mut result in results {
        let distance = haversine_km(centroid, result.location);
        if distance <= CITY_RADIUS_KM {
            result.city_match = Some(CityMatch::Within);
            kept.push(result);
        } else if distance <= SUBURB_RADIUS_KM && !strict {
            result.city_match = Some(CityMatch::NearbySuburb);
            kept.push(result);
        } else {
            dropped.push((distance, result));
        }
    }

    // Promote the closest dropped results when the city itself is thin.
    if kept.len() < MIN_CITY_RESULTS && !strict && !dropped.is_empty() {
        dropped.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let needed = MIN_CITY_RESULTS - kept.len();
        for (_, mut result) in dropped.into_iter().take(needed) {
            result.city_match = Some(CityMatch::NearbyFallback);
            kept.push(result);
        }
    }

    info!(
        total,
        kept = kept.len(),
        strict,
        "City filter applied"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::OpenNow;

    // Tel Aviv centroid; offsets in degrees latitude (1° ≈ 111 km).
    const CENTER: LatLng = LatLng {
        lat: 32.0853,
        lng: 34.7818,
    };

    fn result(id: &str, km_north: f64) -> RestaurantResult {
        RestaurantResult {
            place_id: id.to_string(),
            source: "places".to_string(),
            name: id.to_string(),
            address: String::new(),
            location: LatLng {
                lat: CENTER.lat + km_north / 111.0,
                lng: CENTER.lng,
            },
            rating: None,
            reviews_count: None,
            price_level: None,
            open_now: OpenNow::Unknown,
            tags: vec![],
            google_maps_url: String::new(),
            cuisine_score: None,
            city_match: None,
            distance_km: None,
            providers: Default::default(),
        }
    }

    #[test]
    fn within_city_is_kept() {
        let kept = filter_by_city(vec![result("a", 3.0)], CENTER, false);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].city_match, Some(CityMatch::Within));
    }

    #[test]
    fn suburbs_kept_unless_strict() {
        let kept = filter_by_city(vec![result("a", 15.0)], CENTER, false);
        assert_eq!(kept[0].city_match, Some(CityMatch::NearbySuburb));

        // Strict drops the suburb; with nothing else it stays empty because
        // strict mode also disables the fallback promotion.
        let strict = filter_by_city(vec![result("a", 15.0)], CENTER, true);
        assert!(strict.is_empty());
    }

    #[test]
    fn beyond_twenty_km_is_dropped() {
        let input: Vec<_> = (0..6).map(|i| result(&format!("in{i}"), 1.0)).collect();
        let mut with_far = input.clone();
        with_far.push(result("far", 30.0));
        let kept = filter_by_city(with_far, CENTER, false);
        assert_eq!(kept.len(), 6);
        assert!(kept.iter().all(|r| r.place_id != "far"));
    }

    #[test]
    fn thin_city_promotes_closest_dropped() {
        let kept = filter_by_city(
            vec![
                result("in", 2.0),
                result("far-close", 25.0),
                result("far-far", 60.0),
            ],
            CENTER,
            false,
        );
        assert_eq!(kept.len(), 3);
        let fallback: Vec<_> = kept
            .iter()
            .filter(|r| r.city_match == Some(CityMatch::NearbyFallback))
            .collect();
        assert_eq!(fallback.len(), 2);
        // Closest dropped first.
        assert_eq!(kept[1].place_id, "far-close");
    }

    #[test]
    fn no_promotion_when_enough_results() {
        let mut input: Vec<_> = (0..5).map(|i| result(&format!("in{i}"), 1.0)).collect();
        input.push(result("far", 40.0));
        let kept = filter_by_city(input, CENTER, false);
        assert_eq!(kept.len(), 5);
    }
}

//! Pool-based ranking.
//!
//! Five normalized features, each clamped to [0,1], weighted by a named
//! profile whose weights sum to 1.0. Cuisine is score-only: it never drops a
//! result, it only moves it. Ordering is fully deterministic — ties break on
//! review count, then lexicographic place id.

use tracing::debug;

use platefinder_common::types::{
    haversine_km, HybridFlags, LatLng, OpenNow, RestaurantResult,
};

pub const DEFAULT_INITIAL_RESULTS: usize = 10;
pub const RESULTS_STEP: usize = 5;
pub const MAX_VISIBLE_RESULTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingProfile {
    DistanceHeavy,
    Balanced,
    CuisineFocused,
    QualityFocused,
    NoLocation,
}

impl std::fmt::Display for RankingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingProfile::DistanceHeavy => write!(f, "DISTANCE_HEAVY"),
            RankingProfile::Balanced => write!(f, "BALANCED"),
            RankingProfile::CuisineFocused => write!(f, "CUISINE_FOCUSED"),
            RankingProfile::QualityFocused => write!(f, "QUALITY_FOCUSED"),
            RankingProfile::NoLocation => write!(f, "NO_LOCATION"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Weights {
    rating: f64,
    reviews: f64,
    distance: f64,
    open_boost: f64,
    cuisine: f64,
}

impl RankingProfile {
    fn weights(self) -> Weights {
        match self {
            RankingProfile::DistanceHeavy => Weights {
                rating: 0.15,
                reviews: 0.10,
                distance: 0.50,
                open_boost: 0.10,
                cuisine: 0.15,
            },
            RankingProfile::Balanced => Weights {
                rating: 0.25,
                reviews: 0.15,
                distance: 0.25,
                open_boost: 0.10,
                cuisine: 0.25,
            },
            RankingProfile::CuisineFocused => Weights {
                rating: 0.20,
                reviews: 0.10,
                distance: 0.15,
                open_boost: 0.10,
                cuisine: 0.45,
            },
            RankingProfile::QualityFocused => Weights {
                rating: 0.40,
                reviews: 0.25,
                distance: 0.10,
                open_boost: 0.05,
                cuisine: 0.20,
            },
            RankingProfile::NoLocation => Weights {
                rating: 0.35,
                reviews: 0.25,
                distance: 0.0,
                open_boost: 0.10,
                cuisine: 0.30,
            },
        }
    }
}

/// Profile selection, first rule wins.
pub fn select_profile(user_location: Option<LatLng>, hybrid: &HybridFlags) -> RankingProfile {
    if user_location.is_none() {
        return RankingProfile::NoLocation;
    }
    if hybrid.distance_intent {
        return RankingProfile::DistanceHeavy;
    }
    if hybrid.quality_intent {
        return RankingProfile::QualityFocused;
    }
    if hybrid.cuisine_key.is_some() {
        return RankingProfile::CuisineFocused;
    }
    RankingProfile::Balanced
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn rating_score(rating: Option<f64>) -> f64 {
    clamp01(rating.unwrap_or(0.0) / 5.0)
}

fn reviews_score(count: Option<u32>) -> f64 {
    clamp01(((count.unwrap_or(0) as f64) + 1.0).log10() / 5.0)
}

fn distance_score(distance_km: Option<f64>) -> f64 {
    match distance_km {
        Some(km) if km.is_finite() && km >= 0.0 => clamp01(1.0 / (1.0 + km)),
        _ => 0.0,
    }
}

fn open_score(open: OpenNow) -> f64 {
    match open {
        OpenNow::Known(true) => 1.0,
        OpenNow::Known(false) => 0.0,
        OpenNow::Unknown => 0.5,
    }
}

fn cuisine_score(score: Option<f64>) -> f64 {
    clamp01(score.unwrap_or(0.5))
}

fn total_score(result: &RestaurantResult, weights: Weights) -> f64 {
    weights.rating * rating_score(result.rating)
        + weights.reviews * reviews_score(result.reviews_count)
        + weights.distance * distance_score(result.distance_km)
        + weights.open_boost * open_score(result.open_now)
        + weights.cuisine * cuisine_score(result.cuisine_score)
}

/// Attach cuisine scores for the requested cuisine. Score-only: results are
/// never dropped here. Name or tag matches score high, the rest sit below
/// the 0.5 neutral default so a stated cuisine actually reorders the pool.
pub fn apply_cuisine_scores(
    results: &mut [RestaurantResult],
    cuisine_key: &str,
    provider_query: &str,
) {
    let needles: Vec<String> = [cuisine_key, provider_query]
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    for result in results.iter_mut() {
        let name = result.name.to_lowercase();
        let tag_hit = result
            .tags
            .iter()
            .any(|t| needles.iter().any(|n| t.to_lowercase().contains(n)));
        let name_hit = needles.iter().any(|n| name.contains(n));
        result.cuisine_score = Some(if name_hit || tag_hit { 1.0 } else { 0.25 });
    }
}

/// Sort the pool in place, best first. Computes `distance_km` from the user
/// location when available.
pub fn rank(
    results: &mut [RestaurantResult],
    profile: RankingProfile,
    user_location: Option<LatLng>,
) {
    if let Some(user) = user_location {
        for result in results.iter_mut() {
            result.distance_km = Some(haversine_km(user, result.location));
        }
    }

    let weights = profile.weights();
    results.sort_by(|a, b| {
        let score_a = total_score(a, weights);
        let score_b = total_score(b, weights);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.reviews_count.unwrap_or(0).cmp(&a.reviews_count.unwrap_or(0)))
            .then_with(|| a.place_id.cmp(&b.place_id))
    });

    debug!(profile = %profile, pool = results.len(), "Ranked results");
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::OpenNow;

    fn result(id: &str) -> RestaurantResult {
        RestaurantResult {
            place_id: id.to_string(),
            source: "places".to_string(),
            name: id.to_string(),
            address: String::new(),
            location: LatLng { lat: 0.0, lng: 0.0 },
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
    fn weights_sum_to_one() {
        for profile in [
            RankingProfile::DistanceHeavy,
            RankingProfile::Balanced,
            RankingProfile::CuisineFocused,
            RankingProfile::QualityFocused,
            RankingProfile::NoLocation,
        ] {
            let w = profile.weights();
            let sum = w.rating + w.reviews + w.distance + w.open_boost + w.cuisine;
            assert!((sum - 1.0).abs() < 1e-9, "{profile}: weights sum {sum}");
        }
    }

    #[test]
    fn features_stay_in_unit_interval() {
        assert_eq!(rating_score(Some(9.9)), 1.0);
        assert_eq!(rating_score(None), 0.0);
        assert!(reviews_score(Some(u32::MAX)) <= 1.0);
        assert_eq!(reviews_score(None), 0.0);
        assert_eq!(distance_score(Some(0.0)), 1.0);
        assert_eq!(distance_score(Some(-3.0)), 0.0);
        assert_eq!(distance_score(None), 0.0);
        assert_eq!(cuisine_score(None), 0.5);
        assert_eq!(cuisine_score(Some(7.0)), 1.0);
    }

    #[test]
    fn profile_selection_precedence() {
        let here = Some(LatLng { lat: 1.0, lng: 1.0 });
        let mut hybrid = HybridFlags::default();

        assert_eq!(select_profile(None, &hybrid), RankingProfile::NoLocation);
        assert_eq!(select_profile(here, &hybrid), RankingProfile::Balanced);

        hybrid.cuisine_key = Some("italian".to_string());
        assert_eq!(select_profile(here, &hybrid), RankingProfile::CuisineFocused);

        hybrid.quality_intent = true;
        assert_eq!(select_profile(here, &hybrid), RankingProfile::QualityFocused);

        hybrid.distance_intent = true;
        assert_eq!(select_profile(here, &hybrid), RankingProfile::DistanceHeavy);

        // Distance intent beats everything even without cuisine.
        let mut distance_only = HybridFlags::default();
        distance_only.distance_intent = true;
        assert_eq!(select_profile(here, &distance_only), RankingProfile::DistanceHeavy);
    }

    #[test]
    fn better_rating_ranks_first() {
        let mut pool = vec![result("b"), result("a")];
        pool[0].rating = Some(3.0);
        pool[1].rating = Some(4.8);
        rank(&mut pool, RankingProfile::QualityFocused, None);
        assert_eq!(pool[0].place_id, "a");
    }

    #[test]
    fn closer_wins_under_distance_heavy() {
        let user = LatLng { lat: 32.08, lng: 34.78 };
        let mut pool = vec![result("far"), result("near")];
        pool[0].location = LatLng { lat: 32.20, lng: 34.78 };
        pool[1].location = LatLng { lat: 32.081, lng: 34.78 };
        rank(&mut pool, RankingProfile::DistanceHeavy, Some(user));
        assert_eq!(pool[0].place_id, "near");
        assert!(pool[0].distance_km.unwrap() < pool[1].distance_km.unwrap());
    }

    #[test]
    fn ties_break_on_reviews_then_place_id() {
        let mut pool = vec![result("b"), result("a"), result("c")];
        pool[0].reviews_count = Some(10);
        pool[1].reviews_count = Some(10);
        pool[2].reviews_count = Some(500);
        rank(&mut pool, RankingProfile::Balanced, None);
        assert_eq!(pool[0].place_id, "c");
        assert_eq!(pool[1].place_id, "a");
        assert_eq!(pool[2].place_id, "b");
    }

    #[test]
    fn cuisine_never_drops() {
        let mut pool = vec![result("a"), result("b")];
        pool[0].cuisine_score = Some(0.0);
        let before = pool.len();
        rank(&mut pool, RankingProfile::CuisineFocused, None);
        assert_eq!(pool.len(), before);
    }
}

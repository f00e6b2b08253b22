use platefinder_common::types::{CircleBias, LatLng, QueryLanguage};
use serde::{Deserialize, Serialize};

// --- Domain result ---

/// A place as returned by the provider, before pipeline filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: LatLng,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub price_level: Option<u8>,
    pub open_now: Option<bool>,
    pub tags: Vec<String>,
    pub maps_url: String,
}

// --- Call parameters ---

#[derive(Debug, Clone)]
pub struct TextSearchParams {
    pub query: String,
    pub bias: Option<CircleBias>,
    pub language: QueryLanguage,
    pub region: String,
    /// Live-data-sensitive queries (open-now) get the short cache TTL.
    pub live_data: bool,
}

#[derive(Debug, Clone)]
pub struct NearbyParams {
    pub center: LatLng,
    pub radius_m: u32,
    pub keyword: String,
    pub language: QueryLanguage,
    pub region: String,
    pub live_data: bool,
}

#[derive(Debug, Clone)]
pub struct LandmarkParams {
    pub geocode_query: String,
    pub radius_m: u32,
    pub keyword: String,
    pub language: QueryLanguage,
    pub region: String,
    pub live_data: bool,
}

// --- Wire types (classic Places Web Service) ---

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub status: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub results: Vec<WirePlace>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePlace {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub vicinity: Option<String>,
    pub geometry: WireGeometry,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub opening_hours: Option<WireOpeningHours>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireGeometry {
    pub location: WireLatLng,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireLatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireOpeningHours {
    #[serde(default)]
    pub open_now: Option<bool>,
}

impl WirePlace {
    pub(crate) fn into_place(self) -> Place {
        let maps_url = format!(
            "https://www.google.com/maps/search/?api=1&query_place_id={}",
            self.place_id
        );
        Place {
            address: self
                .formatted_address
                .or(self.vicinity)
                .unwrap_or_default(),
            location: LatLng {
                lat: self.geometry.location.lat,
                lng: self.geometry.location.lng,
            },
            place_id: self.place_id,
            name: self.name,
            rating: self.rating,
            reviews_count: self.user_ratings_total,
            price_level: self.price_level,
            open_now: self.opening_hours.and_then(|h| h.open_now),
            tags: self.types,
            maps_url,
        }
    }
}

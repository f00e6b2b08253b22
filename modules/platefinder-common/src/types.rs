use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Geometry ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_KM * c
}

// --- Languages ---

/// Query language as detected from the raw text or reported by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    He,
    En,
    Ru,
    Ar,
    Fr,
    Es,
    Unknown,
}

impl QueryLanguage {
    /// Languages the places provider accepts as a `language` parameter.
    pub fn is_supported(self) -> bool {
        !matches!(self, QueryLanguage::Unknown)
    }

    pub fn code(self) -> &'static str {
        match self {
            QueryLanguage::He => "he",
            QueryLanguage::En => "en",
            QueryLanguage::Ru => "ru",
            QueryLanguage::Ar => "ar",
            QueryLanguage::Fr => "fr",
            QueryLanguage::Es => "es",
            QueryLanguage::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for QueryLanguage {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "he" => Ok(Self::He),
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            "ar" => Ok(Self::Ar),
            "fr" => Ok(Self::Fr),
            "es" => Ok(Self::Es),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown QueryLanguage: {other}")),
        }
    }
}

/// Language used for user-facing assist messages. Hebrew when the intent or
/// base hints say so, English otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiLanguage {
    He,
    En,
}

// --- Request ---

/// Immutable search input as accepted from the HTTP boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub session_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub user_location: Option<LatLng>,
    #[serde(default)]
    pub user_region_code: Option<String>,
}

// --- Gate stage ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FoodSignal {
    Yes,
    No,
    Maybe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateRoute {
    Continue,
    Stop,
    AskClarify,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    pub food_signal: FoodSignal,
    pub language: QueryLanguage,
    pub route: GateRoute,
    pub confidence: f64,
    pub reason: String,
}

// --- Intent stage ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchRoute {
    Textsearch,
    Nearby,
    Landmark,
}

impl std::fmt::Display for SearchRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchRoute::Textsearch => write!(f, "TEXTSEARCH"),
            SearchRoute::Nearby => write!(f, "NEARBY"),
            SearchRoute::Landmark => write!(f, "LANDMARK"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PriceIntent {
    Any,
    Cheap,
    Mid,
    Expensive,
}

/// Language-agnostic intent modifiers extracted alongside the route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HybridFlags {
    pub distance_intent: bool,
    pub open_now_requested: bool,
    pub price_intent: PriceIntent,
    pub quality_intent: bool,
    pub occasion: Option<String>,
    pub cuisine_key: Option<String>,
}

impl Default for HybridFlags {
    fn default() -> Self {
        Self {
            distance_intent: false,
            open_now_requested: false,
            price_intent: PriceIntent::Any,
            quality_intent: false,
            occasion: None,
            cuisine_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClarifyHint {
    pub question: String,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub route: SearchRoute,
    pub confidence: f64,
    pub reason: String,
    pub language: QueryLanguage,
    pub language_confidence: f64,
    pub region_candidate: Option<String>,
    pub region_confidence: f64,
    pub region_reason: String,
    pub region_code: Option<String>,
    pub city_text: Option<String>,
    pub landmark_text: Option<String>,
    pub radius_meters: Option<u32>,
    pub hybrid: HybridFlags,
    pub clarify: Option<ClarifyHint>,
}

// --- Post-constraints stage ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpenState {
    OpenNow,
    ClosedNow,
    OpenAt,
    OpenBetween,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenAt {
    pub day: Option<String>,
    pub time_hhmm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenBetween {
    pub day: Option<String>,
    pub start_hhmm: Option<String>,
    pub end_hhmm: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelRange {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    pub accessible: Option<bool>,
    pub parking: Option<bool>,
}

/// Deterministic constraints extracted in parallel with route planning.
/// Every sub-object is fully keyed in the schema (null-when-absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostConstraints {
    pub open_state: Option<OpenState>,
    pub open_at: Option<OpenAt>,
    pub open_between: Option<OpenBetween>,
    pub price_level: Option<u8>,
    pub price_level_range: Option<PriceLevelRange>,
    pub is_kosher: Option<bool>,
    pub is_gluten_free: Option<bool>,
    pub requirements: Requirements,
}

// --- Shared filters ---

/// Where a resolved filter value came from, recorded per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    IntentLocked,
    BaseLlm,
    Device,
    ReverseGeocode,
    Default,
}

impl std::fmt::Display for FilterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterSource::IntentLocked => write!(f, "intent_locked"),
            FilterSource::BaseLlm => write!(f, "base_llm"),
            FilterSource::Device => write!(f, "device"),
            FilterSource::ReverseGeocode => write!(f, "reverse_geocode"),
            FilterSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclaimers {
    pub hours: bool,
    pub dietary: bool,
}

/// Deterministically resolved request-wide filters. Sources are recorded so
/// the response can report how language and region were chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSharedFilters {
    pub ui_language: UiLanguage,
    pub provider_language: QueryLanguage,
    pub region_code: String,
    pub open_state: Option<OpenState>,
    pub open_at: Option<OpenAt>,
    pub open_between: Option<OpenBetween>,
    pub price_intent: Option<PriceIntent>,
    pub price_levels: Option<PriceLevelRange>,
    pub disclaimers: Disclaimers,
    pub language_source: FilterSource,
    pub region_source: FilterSource,
}

// --- Provider call plan ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleBias {
    pub center: LatLng,
    pub radius_m: u32,
}

/// The concrete places-provider call, one variant per route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProviderCall {
    #[serde(rename_all = "camelCase")]
    TextSearch {
        text_query: String,
        bias: Option<CircleBias>,
        city_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Nearby {
        center: LatLng,
        radius_m: u32,
        keyword: String,
    },
    #[serde(rename_all = "camelCase")]
    Landmark {
        geocode_query: String,
        radius_m: u32,
        keyword: String,
    },
}

/// A provider call plan always carries language and region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallPlan {
    pub call: ProviderCall,
    pub language: QueryLanguage,
    pub region: String,
}

// --- Results ---

/// Open status as reported by the provider: a known boolean or "UNKNOWN".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenNow {
    Known(bool),
    Unknown,
}

impl Serialize for OpenNow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OpenNow::Known(b) => serializer.serialize_bool(*b),
            OpenNow::Unknown => serializer.serialize_str("UNKNOWN"),
        }
    }
}

impl<'de> Deserialize<'de> for OpenNow {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(b) => Ok(OpenNow::Known(b)),
            serde_json::Value::String(s) if s == "UNKNOWN" => Ok(OpenNow::Unknown),
            other => Err(serde::de::Error::custom(format!(
                "expected bool or \"UNKNOWN\", got {other}"
            ))),
        }
    }
}

/// A delivery provider we resolve verified deep-links for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryProvider {
    Wolt,
    Tenbis,
    Mishloha,
}

impl DeliveryProvider {
    pub const ALL: [DeliveryProvider; 3] = [
        DeliveryProvider::Wolt,
        DeliveryProvider::Tenbis,
        DeliveryProvider::Mishloha,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DeliveryProvider::Wolt => "wolt",
            DeliveryProvider::Tenbis => "tenbis",
            DeliveryProvider::Mishloha => "mishloha",
        }
    }
}

impl std::fmt::Display for DeliveryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for DeliveryProvider {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "wolt" => Ok(Self::Wolt),
            "tenbis" => Ok(Self::Tenbis),
            "mishloha" => Ok(Self::Mishloha),
            other => Err(format!("unknown DeliveryProvider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderLinkStatus {
    Pending,
    Found,
    NotFound,
}

/// Per-provider enrichment slot attached to a result. Starts PENDING and is
/// updated by a later `result.patch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSlot {
    pub status: ProviderLinkStatus,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProviderSlot {
    pub fn pending() -> Self {
        Self {
            status: ProviderLinkStatus::Pending,
            url: None,
            updated_at: None,
        }
    }
}

/// How a result related to the requested city during the coordinate filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityMatch {
    Within,
    NearbySuburb,
    NearbyFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantResult {
    pub place_id: String,
    pub source: String,
    pub name: String,
    pub address: String,
    pub location: LatLng,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub price_level: Option<u8>,
    pub open_now: OpenNow,
    pub tags: Vec<String>,
    pub google_maps_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_match: Option<CityMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub providers: BTreeMap<DeliveryProvider, ProviderSlot>,
}

// --- Assist ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistType {
    Normal,
    Clarify,
    Recover,
}

/// Response-level guidance. A clarify or recover assist carries no results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assist {
    #[serde(rename = "type")]
    pub kind: AssistType,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    pub blocks_search: bool,
}

impl Assist {
    pub fn normal() -> Self {
        Self {
            kind: AssistType::Normal,
            reason: String::new(),
            message: String::new(),
            question: None,
            choices: Vec::new(),
            blocks_search: false,
        }
    }
}

// --- Failure reasons ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    None,
    NoResults,
    LowConfidence,
    GeocodingFailed,
    ProviderError,
    Timeout,
    QuotaExceeded,
    LiveDataUnavailable,
    WeakMatches,
}

impl FailureReason {
    /// Critical reasons drive `assist=recover`.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            FailureReason::NoResults
                | FailureReason::ProviderError
                | FailureReason::Timeout
                | FailureReason::QuotaExceeded
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::None => "NONE",
            FailureReason::NoResults => "NO_RESULTS",
            FailureReason::LowConfidence => "LOW_CONFIDENCE",
            FailureReason::GeocodingFailed => "GEOCODING_FAILED",
            FailureReason::ProviderError => "PROVIDER_ERROR",
            FailureReason::Timeout => "TIMEOUT",
            FailureReason::QuotaExceeded => "QUOTA_EXCEEDED",
            FailureReason::LiveDataUnavailable => "LIVE_DATA_UNAVAILABLE",
            FailureReason::WeakMatches => "WEAK_MATCHES",
        };
        write!(f, "{s}")
    }
}

// --- Response meta ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub gate: u64,
    pub intent: u64,
    pub route_llm: u64,
    pub provider: u64,
    pub post_filter: u64,
    pub rank: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub fetched_count: usize,
    pub returned_count: usize,
    pub available_count: usize,
    pub next_increment: usize,
    pub max_visible: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub source: String,
    pub pipeline_version: String,
    pub failure_reason: FailureReason,
    pub timings_ms: StageTimings,
    pub pagination: Pagination,
    pub region_source: String,
    pub language_source: String,
    pub cache_hits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<RestaurantResult>,
    pub assist: Assist,
    pub meta: SearchMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        let p = LatLng { lat: 32.08, lng: 34.78 };
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn haversine_tel_aviv_jerusalem() {
        let tlv = LatLng { lat: 32.0853, lng: 34.7818 };
        let jlm = LatLng { lat: 31.7683, lng: 35.2137 };
        let d = haversine_km(tlv, jlm);
        assert!(d > 50.0 && d < 60.0, "got {d}");
    }

    #[test]
    fn open_now_serializes_as_bool_or_unknown() {
        assert_eq!(serde_json::to_string(&OpenNow::Known(true)).unwrap(), "true");
        assert_eq!(
            serde_json::to_string(&OpenNow::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
        let parsed: OpenNow = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(parsed, OpenNow::Unknown);
        let parsed: OpenNow = serde_json::from_str("false").unwrap();
        assert_eq!(parsed, OpenNow::Known(false));
    }

    #[test]
    fn failure_reason_criticality() {
        assert!(FailureReason::Timeout.is_critical());
        assert!(FailureReason::NoResults.is_critical());
        assert!(!FailureReason::LowConfidence.is_critical());
        assert!(!FailureReason::None.is_critical());
    }

    #[test]
    fn assist_type_serializes_lowercase() {
        let assist = Assist::normal();
        let json = serde_json::to_value(&assist).unwrap();
        assert_eq!(json["type"], "normal");
    }
}

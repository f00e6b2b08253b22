//! Geocoding wrapper: city and landmark forward geocoding plus the reverse
//! country lookup used for region resolution. Results cache for 24h under
//! the `geo:` namespace; a miss from the provider is cached as NOT_FOUND so
//! repeated bad city names don't re-query.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use platefinder_common::cache::{CacheEntry, CacheManager, CacheStatus};
use platefinder_common::retry::{with_deadline, with_retry, Interrupted, GEOCODING_RETRY};
use platefinder_common::types::{LatLng, QueryLanguage};

use crate::error::{PlacesError, Result};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodedPoint {
    pub center: LatLng,
    pub formatted: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: GeocodeGeometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLatLng,
}

#[derive(Debug, Deserialize)]
struct GeocodeLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

pub struct GeocodingClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    cache: Arc<CacheManager>,
    ttl: Duration,
    timeout: Duration,
}

impl GeocodingClient {
    pub fn new(
        api_key: &str,
        cache: Arc<CacheManager>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            cache,
            ttl,
            timeout,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Forward-geocode a city or landmark. `Ok(None)` means the provider
    /// answered with zero results; errors are transport/quota problems.
    pub async fn geocode(
        &self,
        address: &str,
        language: QueryLanguage,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<GeocodedPoint>> {
        let key = format!(
            "geo:{}:{}",
            platefinder_common::normalize_for_key(address),
            region
        );

        if let Some(entry) = self.cache.get::<Option<GeocodedPoint>>(&key).await {
            debug!(key, "Geocode cache hit");
            return Ok(entry.value);
        }

        let query = vec![
            ("address".to_string(), address.to_string()),
            ("language".to_string(), language.code().to_string()),
            ("region".to_string(), region.to_lowercase()),
            ("key".to_string(), self.api_key.clone()),
        ];

        info!(address, region, "Geocoding");
        let results = self.fetch(query, cancel).await?;
        let point = results.into_iter().next().map(|r| GeocodedPoint {
            center: LatLng {
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
            },
            formatted: r.formatted_address,
        });

        let entry = CacheEntry {
            value: point.clone(),
            status: if point.is_some() {
                CacheStatus::Found
            } else {
                CacheStatus::NotFound
            },
            updated_at: chrono::Utc::now(),
        };
        self.cache.put(&key, &entry, self.ttl).await;
        Ok(point)
    }

    /// Reverse-geocode coordinates to an ISO-2 country code.
    pub async fn reverse_region(
        &self,
        location: LatLng,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let key = format!("geo:rev:{:.4},{:.4}", location.lat, location.lng);

        if let Some(entry) = self.cache.get::<Option<String>>(&key).await {
            debug!(key, "Reverse geocode cache hit");
            return Ok(entry.value);
        }

        let query = vec![
            (
                "latlng".to_string(),
                format!("{},{}", location.lat, location.lng),
            ),
            ("result_type".to_string(), "country".to_string()),
            ("key".to_string(), self.api_key.clone()),
        ];

        let results = self.fetch(query, cancel).await?;
        let region = results.into_iter().next().and_then(|r| {
            r.address_components
                .into_iter()
                .find(|c| c.types.iter().any(|t| t == "country"))
                .map(|c| c.short_name)
        });

        let entry = CacheEntry {
            value: region.clone(),
            status: if region.is_some() {
                CacheStatus::Found
            } else {
                CacheStatus::NotFound
            },
            updated_at: chrono::Utc::now(),
        };
        self.cache.put(&key, &entry, self.ttl).await;
        Ok(region)
    }

    async fn fetch(
        &self,
        query: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<GeocodeResult>> {
        let url = format!("{}/geocode/json", self.base_url);
        let outcome = with_deadline(
            self.timeout,
            cancel,
            with_retry(
                &GEOCODING_RETRY,
                cancel,
                PlacesError::is_retryable,
                || self.fetch_once(&url, &query),
            ),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(Interrupted::Timeout) => Err(PlacesError::Timeout),
            Err(Interrupted::Cancelled) => Err(PlacesError::Cancelled),
        }
    }

    async fn fetch_once(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Vec<GeocodeResult>> {
        let resp = self.http.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeocodeResponse = resp.json().await.map_err(PlacesError::from)?;
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(body.results),
            "OVER_QUERY_LIMIT" | "RESOURCE_EXHAUSTED" => Err(PlacesError::Quota),
            code => Err(PlacesError::Provider {
                code: code.to_string(),
                message: body.error_message.unwrap_or_default(),
            }),
        }
    }
}

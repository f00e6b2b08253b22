//! Thin HTTP wrapper for the places provider.
//!
//! Three call shapes: text search, nearby search, and the landmark plan
//! (geocode the landmark, then nearby around it). All calls honor the
//! request's cancellation token, retry 429/5xx twice with a 1 s backoff,
//! and go through the shared cache manager.

pub mod error;
pub mod geocode;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use platefinder_common::cache::{CacheEntry, CacheManager};
use platefinder_common::config::CacheTtls;
use platefinder_common::retry::{with_deadline, with_retry, Interrupted, PLACES_RETRY};
use platefinder_common::types::QueryLanguage;

pub use error::{PlacesError, Result};
pub use geocode::{GeocodedPoint, GeocodingClient};
pub use types::{LandmarkParams, NearbyParams, Place, TextSearchParams};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// A value plus whether it came from the cache, so the orchestrator can
/// report cache hits in response meta.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub from_cache: bool,
}

pub struct PlacesClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    cache: Arc<CacheManager>,
    ttls: CacheTtls,
    timeout: Duration,
}

impl PlacesClient {
    pub fn new(
        api_key: &str,
        cache: Arc<CacheManager>,
        ttls: CacheTtls,
        timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
            cache,
            ttls,
            timeout,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub async fn text_search(
        &self,
        params: &TextSearchParams,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Vec<Place>>> {
        let (lat4, lng4, radius) = match params.bias {
            Some(bias) => (
                format!("{:.4}", bias.center.lat),
                format!("{:.4}", bias.center.lng),
                bias.radius_m,
            ),
            None => ("na".to_string(), "na".to_string(), 0),
        };
        let key = cache_key(&params.query, &lat4, &lng4, radius, params.language, params.live_data);

        if let Some(entry) = self.cache.get::<Vec<Place>>(&key).await {
            debug!(key, "Places cache hit");
            return Ok(Fetched {
                value: entry.value,
                from_cache: true,
            });
        }

        let mut query = vec![
            ("query".to_string(), params.query.clone()),
            ("language".to_string(), params.language.code().to_string()),
            ("region".to_string(), params.region.to_lowercase()),
            ("key".to_string(), self.api_key.clone()),
        ];
        if let Some(bias) = params.bias {
            query.push((
                "location".to_string(),
                format!("{},{}", bias.center.lat, bias.center.lng),
            ));
            query.push(("radius".to_string(), bias.radius_m.to_string()));
        }

        info!(query = %params.query, region = %params.region, "Places text search");
        let places = self.fetch("place/textsearch/json", query, cancel).await?;
        self.store(&key, &places, params.live_data).await;
        Ok(Fetched {
            value: places,
            from_cache: false,
        })
    }

    pub async fn nearby_search(
        &self,
        params: &NearbyParams,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Vec<Place>>> {
        let lat4 = format!("{:.4}", params.center.lat);
        let lng4 = format!("{:.4}", params.center.lng);
        let key = cache_key(
            &params.keyword,
            &lat4,
            &lng4,
            params.radius_m,
            params.language,
            params.live_data,
        );

        if let Some(entry) = self.cache.get::<Vec<Place>>(&key).await {
            debug!(key, "Places cache hit");
            return Ok(Fetched {
                value: entry.value,
                from_cache: true,
            });
        }

        let query = vec![
            (
                "location".to_string(),
                format!("{},{}", params.center.lat, params.center.lng),
            ),
            ("radius".to_string(), params.radius_m.to_string()),
            ("keyword".to_string(), params.keyword.clone()),
            ("language".to_string(), params.language.code().to_string()),
            ("key".to_string(), self.api_key.clone()),
        ];

        info!(keyword = %params.keyword, radius_m = params.radius_m, "Places nearby search");
        let places = self.fetch("place/nearbysearch/json", query, cancel).await?;
        self.store(&key, &places, params.live_data).await;
        Ok(Fetched {
            value: places,
            from_cache: false,
        })
    }

    /// Landmark plan: geocode the landmark, then nearby-search around it.
    pub async fn landmark_plan(
        &self,
        geocoder: &GeocodingClient,
        params: &LandmarkParams,
        cancel: &CancellationToken,
    ) -> Result<Fetched<Vec<Place>>> {
        let point = geocoder
            .geocode(&params.geocode_query, params.language, &params.region, cancel)
            .await?
            .ok_or_else(|| PlacesError::Provider {
                code: "GEOCODE_ZERO_RESULTS".to_string(),
                message: format!("landmark not found: {}", params.geocode_query),
            })?;

        self.nearby_search(
            &NearbyParams {
                center: point.center,
                radius_m: params.radius_m,
                keyword: params.keyword.clone(),
                language: params.language,
                region: params.region.clone(),
                live_data: params.live_data,
            },
            cancel,
        )
        .await
    }

    async fn store(&self, key: &str, places: &[Place], live_data: bool) {
        let ttl = if live_data {
            self.ttls.places_live
        } else {
            self.ttls.places_static
        };
        self.cache
            .put(key, &CacheEntry::found(places.to_vec()), ttl)
            .await;
    }

    async fn fetch(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Place>> {
        let url = format!("{}/{path}", self.base_url);
        let outcome = with_deadline(
            self.timeout,
            cancel,
            with_retry(
                &PLACES_RETRY,
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

    async fn fetch_once(&self, url: &str, query: &[(String, String)]) -> Result<Vec<Place>> {
        let resp = self.http.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: types::SearchResponse = resp.json().await.map_err(PlacesError::from)?;
        match body.status.as_str() {
            "OK" | "ZERO_RESULTS" => Ok(body
                .results
                .into_iter()
                .map(types::WirePlace::into_place)
                .collect()),
            "OVER_QUERY_LIMIT" | "RESOURCE_EXHAUSTED" => Err(PlacesError::Quota),
            code => Err(PlacesError::Provider {
                code: code.to_string(),
                message: body.error_message.unwrap_or_default(),
            }),
        }
    }
}

/// `places:<normalized_query>:<lat4>,<lng4>:<radius>:<language>:<live>`
fn cache_key(
    query: &str,
    lat4: &str,
    lng4: &str,
    radius_m: u32,
    language: QueryLanguage,
    live_data: bool,
) -> String {
    format!(
        "places:{}:{lat4},{lng4}:{radius_m}:{language}:{live_data}",
        platefinder_common::normalize_for_key(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::LatLng;

    #[test]
    fn cache_key_shape() {
        let key = cache_key("Steakhouse", "32.0853", "34.7818", 1500, QueryLanguage::He, false);
        assert_eq!(key, "places:steakhouse:32.0853,34.7818:1500:he:false");
    }

    #[test]
    fn cache_key_without_bias() {
        let key = cache_key("sushi", "na", "na", 0, QueryLanguage::En, true);
        assert_eq!(key, "places:sushi:na,na:0:en:true");
    }

    #[test]
    fn lat_formatting_is_four_decimals() {
        let center = LatLng {
            lat: 32.085341,
            lng: 34.781768,
        };
        assert_eq!(format!("{:.4}", center.lat), "32.0853");
        assert_eq!(format!("{:.4}", center.lng), "34.7818");
    }
}

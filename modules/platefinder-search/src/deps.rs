//! Pipeline collaborators behind traits, so tests can stub the expensive
//! edges (model, places, geocoding) without HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ai_client::StructuredModel;
use places_client::{
    Fetched, GeocodedPoint, GeocodingClient, LandmarkParams, NearbyParams, Place, PlacesClient,
    Result as PlacesResult, TextSearchParams,
};
use platefinder_common::cache::CacheManager;
use platefinder_common::events::{Enricher, EventSink};
use platefinder_common::types::{LatLng, QueryLanguage};

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn text_search(
        &self,
        params: &TextSearchParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>>;

    async fn nearby_search(
        &self,
        params: &NearbyParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>>;

    async fn landmark_plan(
        &self,
        params: &LandmarkParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(
        &self,
        address: &str,
        language: QueryLanguage,
        region: &str,
        cancel: &CancellationToken,
    ) -> PlacesResult<Option<GeocodedPoint>>;

    async fn reverse_region(
        &self,
        location: LatLng,
        cancel: &CancellationToken,
    ) -> PlacesResult<Option<String>>;
}

/// Production wiring: the HTTP places client plus its geocoder.
pub struct GooglePlaces {
    client: PlacesClient,
    geocoder: Arc<GeocodingClient>,
}

impl GooglePlaces {
    pub fn new(client: PlacesClient, geocoder: Arc<GeocodingClient>) -> Self {
        Self { client, geocoder }
    }
}

#[async_trait]
impl PlacesProvider for GooglePlaces {
    async fn text_search(
        &self,
        params: &TextSearchParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>> {
        self.client.text_search(params, cancel).await
    }

    async fn nearby_search(
        &self,
        params: &NearbyParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>> {
        self.client.nearby_search(params, cancel).await
    }

    async fn landmark_plan(
        &self,
        params: &LandmarkParams,
        cancel: &CancellationToken,
    ) -> PlacesResult<Fetched<Vec<Place>>> {
        self.client.landmark_plan(&self.geocoder, params, cancel).await
    }
}

#[async_trait]
impl Geocoder for GeocodingClient {
    async fn geocode(
        &self,
        address: &str,
        language: QueryLanguage,
        region: &str,
        cancel: &CancellationToken,
    ) -> PlacesResult<Option<GeocodedPoint>> {
        GeocodingClient::geocode(self, address, language, region, cancel).await
    }

    async fn reverse_region(
        &self,
        location: LatLng,
        cancel: &CancellationToken,
    ) -> PlacesResult<Option<String>> {
        GeocodingClient::reverse_region(self, location, cancel).await
    }
}

/// Everything the orchestrator reaches out to.
pub struct SearchDeps {
    pub model: Arc<dyn StructuredModel>,
    pub places: Arc<dyn PlacesProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub cache: Arc<CacheManager>,
    pub sink: Arc<dyn EventSink>,
    pub enricher: Arc<dyn Enricher>,
}

use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use tracing::info;
use tracing_subscriber::EnvFilter;

use platefinder_api::ws::hub::SessionHub;
use platefinder_api::{build_router, AppState};
use platefinder_common::cache::{CacheManager, CacheStore, MemoryStore, RedisStore};
use platefinder_common::Config;
use platefinder_deeplink::EnrichmentService;
use platefinder_search::deps::{GooglePlaces, SearchDeps};
use platefinder_search::{Orchestrator, SearchSettings};
use places_client::{GeocodingClient, PlacesClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("platefinder=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    // Cache: shared Redis when configured, in-process otherwise. A missing
    // store is never fatal — everything degrades to cache misses.
    let store: Box<dyn CacheStore> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => {
                info!("Connected to shared cache");
                Box::new(store)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, using in-process cache");
                Box::new(MemoryStore::new(config.cache_capacities.as_map()))
            }
        },
        None => Box::new(MemoryStore::new(config.cache_capacities.as_map())),
    };
    let cache = Arc::new(CacheManager::new(store));

    let model = ai_client::from_keys(&config.openai_api_key, &config.anthropic_api_key)?;

    let geocoder = Arc::new(GeocodingClient::new(
        &config.places_api_key,
        cache.clone(),
        config.cache_ttls.geocoding,
        config.timeouts.geocoding,
    ));
    let places = PlacesClient::new(
        &config.places_api_key,
        cache.clone(),
        config.cache_ttls,
        config.timeouts.provider,
    );

    let engine = websearch_client::from_config(
        &config.brave_search_api_key,
        &config.google_cse_key,
        &config.google_cse_cx,
        config.timeouts.websearch_attempt,
    );
    match &engine {
        Some(e) => info!(engine = e.name(), "Web search engine selected"),
        None => info!("No web search engine configured, deep-links resolve to NOT_FOUND"),
    }

    let hub = Arc::new(SessionHub::new(config.ws_require_auth));

    let enricher = EnrichmentService::start(
        cache.clone(),
        hub.clone(),
        engine,
        config.enrichment,
        config.cache_ttls,
        config.timeouts.enrichment_job,
    );

    let orchestrator = Orchestrator::new(
        SearchDeps {
            model,
            places: Arc::new(GooglePlaces::new(places, geocoder.clone())),
            geocoder,
            cache,
            sink: hub.clone(),
            enricher,
        },
        SearchSettings {
            timeouts: config.timeouts,
            strict_city_filter: config.strict_city_filter,
            ..SearchSettings::default()
        },
    );

    let shutdown = tokio_util::sync::CancellationToken::new();
    let state = Arc::new(AppState {
        orchestrator,
        hub: hub.clone(),
        config: config.clone(),
        shutdown: shutdown.clone(),
    });

    // Periodic eviction of expired backlogs and pending subscriptions.
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tick.tick().await;
            hub.cleanup();
        }
    });

    let app = build_router(state)
        .layer(if cfg!(debug_assertions) {
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        } else {
            let origins: Vec<HeaderValue> = std::env::var("CORS_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            tower_http::cors::CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
        })
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Platefinder API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, closing sessions");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

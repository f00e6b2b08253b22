//! Enrichment entry point, called by the orchestrator on finalized results.
//!
//! Cache-first: a fresh entry patches immediately. Otherwise the slot goes
//! out PENDING and a job is enqueued behind a non-blocking SETNX lock — if
//! the lock is held, a peer is already resolving and we do nothing. The
//! main response is never blocked.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use platefinder_common::cache::{CacheManager, CacheStatus};
use platefinder_common::config::{CacheTtls, EnrichmentFlags};
use platefinder_common::events::{Enricher, EventSink};
use platefinder_common::protocol::{Channel, ProviderPatch, ServerFrame};
use platefinder_common::types::{
    DeliveryProvider, ProviderLinkStatus, ProviderSlot, RestaurantResult,
};
use websearch_client::SearchEngine;

use crate::queue::{EnrichmentJob, ProviderQueue};
use crate::resolver::Resolver;
use crate::worker::Worker;
use crate::{link_key, lock_key, QUEUE_CAPACITY};

pub struct EnrichmentService {
    cache: Arc<CacheManager>,
    sink: Arc<dyn EventSink>,
    queues: HashMap<DeliveryProvider, ProviderQueue>,
    lock_ttl: Duration,
}

impl EnrichmentService {
    /// Wire queues and spawn one worker per enabled provider.
    pub fn start(
        cache: Arc<CacheManager>,
        sink: Arc<dyn EventSink>,
        engine: Option<Arc<dyn SearchEngine>>,
        flags: EnrichmentFlags,
        ttls: CacheTtls,
        job_timeout: Duration,
    ) -> Arc<Self> {
        let resolver = Arc::new(Resolver::new(engine));
        let mut queues = HashMap::new();

        for provider in DeliveryProvider::ALL {
            if !provider_enabled(provider, flags) {
                continue;
            }
            let (queue, rx, pending) = ProviderQueue::new(provider, QUEUE_CAPACITY);
            let worker = Worker {
                provider,
                cache: cache.clone(),
                resolver: resolver.clone(),
                sink: sink.clone(),
                found_ttl: ttls.provider_found,
                not_found_ttl: ttls.provider_not_found,
                lock_ttl: ttls.provider_lock,
                job_timeout,
            };
            worker.spawn(rx, pending);
            queues.insert(provider, queue);
        }

        info!(providers = queues.len(), "Enrichment service started");
        Arc::new(Self {
            cache,
            sink,
            queues,
            lock_ttl: ttls.provider_lock,
        })
    }

    pub fn enabled_providers(&self) -> Vec<DeliveryProvider> {
        let mut providers: Vec<_> = self.queues.keys().copied().collect();
        providers.sort();
        providers
    }

    async fn publish_patch(
        &self,
        request_id: &str,
        place_id: &str,
        provider: DeliveryProvider,
        slot: ProviderSlot,
    ) {
        self.sink
            .publish(
                Channel::Search,
                request_id,
                ServerFrame::ResultPatch {
                    request_id: request_id.to_string(),
                    place_id: place_id.to_string(),
                    patch: ProviderPatch::single(provider, slot),
                    updated_at: Utc::now(),
                },
            )
            .await;
    }
}

fn provider_enabled(provider: DeliveryProvider, flags: EnrichmentFlags) -> bool {
    match provider {
        DeliveryProvider::Wolt => flags.wolt,
        DeliveryProvider::Tenbis => flags.tenbis,
        DeliveryProvider::Mishloha => flags.mishloha,
    }
}

#[async_trait]
impl Enricher for EnrichmentService {
    async fn enrich(
        &self,
        request_id: &str,
        results: &mut [RestaurantResult],
        city_text: Option<&str>,
    ) {
        for result in results.iter_mut() {
            if result.place_id.is_empty() {
                continue;
            }

            for (&provider, queue) in &self.queues {
                let key = link_key(provider, &result.place_id);

                if let Some(entry) = self.cache.get::<Option<String>>(&key).await {
                    let slot = ProviderSlot {
                        status: match entry.status {
                            CacheStatus::Found => ProviderLinkStatus::Found,
                            CacheStatus::NotFound => ProviderLinkStatus::NotFound,
                        },
                        url: entry.value,
                        updated_at: Some(entry.updated_at),
                    };
                    result.providers.insert(provider, slot.clone());
                    self.publish_patch(request_id, &result.place_id, provider, slot)
                        .await;
                    continue;
                }

                result.providers.insert(provider, ProviderSlot::pending());

                let lock = lock_key(provider, &result.place_id);
                if self.cache.try_lock(&lock, self.lock_ttl).await {
                    queue.enqueue(EnrichmentJob {
                        request_id: request_id.to_string(),
                        provider,
                        place_id: result.place_id.clone(),
                        name: result.name.clone(),
                        city: city_text.map(str::to_string),
                    });
                } else {
                    // A peer already holds the lock and is resolving.
                    debug!(
                        provider = %provider,
                        place_id = %result.place_id,
                        "Resolution already in flight, skipping enqueue"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::cache::{CacheEntry, MemoryStore};
    use platefinder_common::events::NoopSink;
    use platefinder_common::types::{LatLng, OpenNow};

    fn result(id: &str) -> RestaurantResult {
        RestaurantResult {
            place_id: id.to_string(),
            source: "places".to_string(),
            name: format!("Restaurant {id}"),
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

    fn service() -> Arc<EnrichmentService> {
        let cache = Arc::new(CacheManager::new(Box::new(MemoryStore::new(
            HashMap::new(),
        ))));
        EnrichmentService::start(
            cache,
            Arc::new(NoopSink),
            None,
            EnrichmentFlags::default(),
            CacheTtls::default(),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn pending_slots_attached_for_all_enabled_providers() {
        let service = service();
        let mut results = vec![result("p1")];
        service.enrich("req-1", &mut results, None).await;

        assert_eq!(results[0].providers.len(), 3);
        for provider in DeliveryProvider::ALL {
            assert_eq!(
                results[0].providers[&provider].status,
                ProviderLinkStatus::Pending
            );
        }
    }

    #[tokio::test]
    async fn cached_link_attaches_immediately() {
        let cache = Arc::new(CacheManager::new(Box::new(MemoryStore::new(
            HashMap::new(),
        ))));
        cache
            .put(
                &link_key(DeliveryProvider::Wolt, "p1"),
                &CacheEntry::found(Some("https://wolt.com/restaurant/x".to_string())),
                Duration::from_secs(600),
            )
            .await;
        let service = EnrichmentService::start(
            cache,
            Arc::new(NoopSink),
            None,
            EnrichmentFlags::default(),
            CacheTtls::default(),
            Duration::from_secs(30),
        );

        let mut results = vec![result("p1")];
        service.enrich("req-1", &mut results, None).await;

        let wolt = &results[0].providers[&DeliveryProvider::Wolt];
        assert_eq!(wolt.status, ProviderLinkStatus::Found);
        assert_eq!(wolt.url.as_deref(), Some("https://wolt.com/restaurant/x"));
    }

    #[tokio::test]
    async fn empty_place_id_is_skipped() {
        let service = service();
        let mut results = vec![result("")];
        service.enrich("req-1", &mut results, None).await;
        assert!(results[0].providers.is_empty());
    }

    #[tokio::test]
    async fn disabled_provider_gets_no_slot() {
        let cache = Arc::new(CacheManager::new(Box::new(MemoryStore::new(
            HashMap::new(),
        ))));
        let service = EnrichmentService::start(
            cache,
            Arc::new(NoopSink),
            None,
            EnrichmentFlags {
                wolt: true,
                tenbis: false,
                mishloha: false,
            },
            CacheTtls::default(),
            Duration::from_secs(30),
        );

        let mut results = vec![result("p1")];
        service.enrich("req-1", &mut results, None).await;
        assert_eq!(service.enabled_providers(), vec![DeliveryProvider::Wolt]);
        assert_eq!(results[0].providers.len(), 1);
        assert!(results[0].providers.contains_key(&DeliveryProvider::Wolt));
    }
}

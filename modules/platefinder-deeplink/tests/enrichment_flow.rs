//! Queue → worker → patch flow against a scripted search engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use platefinder_common::cache::{CacheManager, CacheStatus, MemoryStore};
use platefinder_common::events::EventSink;
use platefinder_common::protocol::{Channel, ServerFrame};
use platefinder_common::types::{DeliveryProvider, ProviderLinkStatus};
use platefinder_deeplink::queue::{EnrichmentJob, ProviderQueue};
use platefinder_deeplink::worker::Worker;
use platefinder_deeplink::{link_key, lock_key, Resolver};
use websearch_client::{Result as SearchResult, SearchEngine, SearchHit};

struct CountingSink {
    frames: Mutex<Vec<(Channel, String, ServerFrame)>>,
}

impl CountingSink {
    fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
        }
    }

    fn patches(&self) -> Vec<ServerFrame> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, f)| matches!(f, ServerFrame::ResultPatch { .. }))
            .map(|(_, _, f)| f.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CountingSink {
    async fn publish(&self, channel: Channel, request_id: &str, frame: ServerFrame) {
        self.frames
            .lock()
            .unwrap()
            .push((channel, request_id.to_string(), frame));
    }
}

struct FixedEngine {
    url: &'static str,
}

#[async_trait]
impl SearchEngine for FixedEngine {
    async fn search(
        &self,
        _query: &str,
        _count: usize,
        _cancel: &CancellationToken,
    ) -> SearchResult<Vec<SearchHit>> {
        Ok(vec![SearchHit {
            title: "Pizza Joe".to_string(),
            url: self.url.to_string(),
            snippet: String::new(),
        }])
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Engine that never answers inside the job budget.
struct StallingEngine;

#[async_trait]
impl SearchEngine for StallingEngine {
    async fn search(
        &self,
        _query: &str,
        _count: usize,
        _cancel: &CancellationToken,
    ) -> SearchResult<Vec<SearchHit>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

fn job(place_id: &str) -> EnrichmentJob {
    EnrichmentJob {
        request_id: "req-1".to_string(),
        provider: DeliveryProvider::Wolt,
        place_id: place_id.to_string(),
        name: "Pizza Joe".to_string(),
        city: Some("Tel Aviv".to_string()),
    }
}

fn harness(
    engine: Option<Arc<dyn SearchEngine>>,
) -> (Arc<CacheManager>, Arc<CountingSink>, ProviderQueue) {
    harness_with_timeout(engine, Duration::from_secs(5))
}

fn harness_with_timeout(
    engine: Option<Arc<dyn SearchEngine>>,
    job_timeout: Duration,
) -> (Arc<CacheManager>, Arc<CountingSink>, ProviderQueue) {
    let cache = Arc::new(CacheManager::new(Box::new(MemoryStore::new(
        HashMap::new(),
    ))));
    let sink = Arc::new(CountingSink::new());
    let (queue, rx, pending) = ProviderQueue::new(DeliveryProvider::Wolt, 10);
    let worker = Worker {
        provider: DeliveryProvider::Wolt,
        cache: cache.clone(),
        resolver: Arc::new(Resolver::new(engine)),
        sink: sink.clone(),
        found_ttl: Duration::from_secs(7 * 24 * 3600),
        not_found_ttl: Duration::from_secs(24 * 3600),
        lock_ttl: Duration::from_secs(60),
        job_timeout,
    };
    worker.spawn(rx, pending);
    (cache, sink, queue)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn duplicate_enqueue_produces_one_patch() {
    let engine: Arc<dyn SearchEngine> = Arc::new(FixedEngine {
        url: "https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe",
    });
    let (_cache, sink, queue) = harness(Some(engine));

    assert!(queue.enqueue(job("p1")));
    assert!(!queue.enqueue(job("p1")), "second enqueue must dedup");
    settle().await;

    let patches = sink.patches();
    assert_eq!(patches.len(), 1, "exactly one result.patch");
    match &patches[0] {
        ServerFrame::ResultPatch { place_id, patch, .. } => {
            assert_eq!(place_id, "p1");
            let slot = &patch.providers[&DeliveryProvider::Wolt];
            assert_eq!(slot.status, ProviderLinkStatus::Found);
            assert_eq!(
                slot.url.as_deref(),
                Some("https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe")
            );
        }
        other => panic!("unexpected frame {other:?}"),
    }
}

#[tokio::test]
async fn found_link_is_cached_and_lock_released() {
    let engine: Arc<dyn SearchEngine> = Arc::new(FixedEngine {
        url: "https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe",
    });
    let (cache, _sink, queue) = harness(Some(engine));

    assert!(queue.enqueue(job("p2")));
    settle().await;

    let entry = cache
        .get::<Option<String>>(&link_key(DeliveryProvider::Wolt, "p2"))
        .await
        .expect("link cached");
    assert_eq!(entry.status, CacheStatus::Found);
    assert!(entry.value.unwrap().contains("/restaurant/"));

    // Lock released: a fresh SETNX succeeds.
    assert!(
        cache
            .try_lock(&lock_key(DeliveryProvider::Wolt, "p2"), Duration::from_secs(5))
            .await
    );
}

#[tokio::test]
async fn job_timeout_publishes_emergency_not_found_without_caching() {
    let engine: Arc<dyn SearchEngine> = Arc::new(StallingEngine);
    let (cache, sink, queue) = harness_with_timeout(Some(engine), Duration::from_millis(50));

    assert!(queue.enqueue(job("p4")));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The emergency patch went out so subscribers don't hang on PENDING.
    let patches = sink.patches();
    assert_eq!(patches.len(), 1);
    match &patches[0] {
        ServerFrame::ResultPatch { patch, .. } => {
            assert_eq!(
                patch.providers[&DeliveryProvider::Wolt].status,
                ProviderLinkStatus::NotFound
            );
        }
        other => panic!("unexpected frame {other:?}"),
    }

    // The cache stays unwritten so a later request retries, and the lock is
    // released.
    assert!(cache
        .get::<Option<String>>(&link_key(DeliveryProvider::Wolt, "p4"))
        .await
        .is_none());
    assert!(
        cache
            .try_lock(&lock_key(DeliveryProvider::Wolt, "p4"), Duration::from_secs(5))
            .await
    );
}

#[tokio::test]
async fn no_engine_publishes_not_found_and_caches_it() {
    let (cache, sink, queue) = harness(None);

    assert!(queue.enqueue(job("p3")));
    settle().await;

    let patches = sink.patches();
    assert_eq!(patches.len(), 1);
    match &patches[0] {
        ServerFrame::ResultPatch { patch, .. } => {
            let slot = &patch.providers[&DeliveryProvider::Wolt];
            assert_eq!(slot.status, ProviderLinkStatus::NotFound);
            assert_eq!(slot.url, None);
        }
        other => panic!("unexpected frame {other:?}"),
    }

    let entry = cache
        .get::<Option<String>>(&link_key(DeliveryProvider::Wolt, "p3"))
        .await
        .expect("NOT_FOUND cached");
    assert_eq!(entry.status, CacheStatus::NotFound);
}

//! Per-provider worker: pulls one job at a time, resolves under the job
//! budget, writes the status-differentiated cache entry, releases the lock,
//! and publishes the patch. Every exit path publishes something — a
//! subscriber must never hang on PENDING.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use platefinder_common::cache::{CacheEntry, CacheManager, CacheStatus};
use platefinder_common::events::EventSink;
use platefinder_common::protocol::{Channel, ProviderPatch, ServerFrame};
use platefinder_common::types::{DeliveryProvider, ProviderLinkStatus, ProviderSlot};

use crate::queue::{EnrichmentJob, PendingSet};
use crate::resolver::{ResolveOutcome, ResolveRequest, Resolver};
use crate::{link_key, lock_key};

pub struct Worker {
    pub provider: DeliveryProvider,
    pub cache: Arc<CacheManager>,
    pub resolver: Arc<Resolver>,
    pub sink: Arc<dyn EventSink>,
    pub found_ttl: Duration,
    pub not_found_ttl: Duration,
    pub lock_ttl: Duration,
    pub job_timeout: Duration,
}

impl Worker {
    /// Spawn the worker loop. Concurrency is 1 per provider by construction:
    /// one receiver, jobs processed to completion in order.
    pub fn spawn(self, mut rx: mpsc::Receiver<EnrichmentJob>, pending: PendingSet) {
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                pending
                    .lock()
                    .expect("queue lock poisoned")
                    .remove(&job.place_id);
                self.process(job).await;
            }
            info!(provider = %self.provider, "Enrichment worker stopped");
        });
    }

    async fn process(&self, job: EnrichmentJob) {
        info!(
            provider = %self.provider,
            place_id = %job.place_id,
            request_id = %job.request_id,
            "Resolving deep-link"
        );

        // Refresh the lock the enqueuer took; if it expired we now hold it.
        let lock = lock_key(self.provider, &job.place_id);
        let _ = self.cache.try_lock(&lock, self.lock_ttl).await;

        let cancel = CancellationToken::new();
        let request = ResolveRequest {
            provider: job.provider,
            place_id: job.place_id.clone(),
            name: job.name.clone(),
            city: job.city.clone(),
        };

        let outcome = tokio::time::timeout(
            self.job_timeout,
            self.resolver.resolve(&request, &cancel),
        )
        .await;

        match outcome {
            Ok(ResolveOutcome::Found { url }) => {
                self.cache
                    .put(
                        &link_key(self.provider, &job.place_id),
                        &CacheEntry {
                            value: Some(url.clone()),
                            status: CacheStatus::Found,
                            updated_at: Utc::now(),
                        },
                        self.found_ttl,
                    )
                    .await;
                self.cache.unlock(&lock).await;
                self.publish(&job, ProviderLinkStatus::Found, Some(url)).await;
            }
            Ok(ResolveOutcome::NotFound) => {
                self.cache
                    .put(
                        &link_key(self.provider, &job.place_id),
                        &CacheEntry {
                            value: None::<String>,
                            status: CacheStatus::NotFound,
                            updated_at: Utc::now(),
                        },
                        self.not_found_ttl,
                    )
                    .await;
                self.cache.unlock(&lock).await;
                self.publish(&job, ProviderLinkStatus::NotFound, None).await;
            }
            Err(_) => {
                // Job budget exhausted: stop the resolver, publish the
                // emergency NOT_FOUND patch, leave the cache unwritten so a
                // later request retries.
                cancel.cancel();
                warn!(
                    provider = %self.provider,
                    place_id = %job.place_id,
                    "Enrichment job timed out, publishing NOT_FOUND"
                );
                self.cache.unlock(&lock).await;
                self.publish(&job, ProviderLinkStatus::NotFound, None).await;
            }
        }
    }

    async fn publish(&self, job: &EnrichmentJob, status: ProviderLinkStatus, url: Option<String>) {
        let now = Utc::now();
        self.sink
            .publish(
                Channel::Search,
                &job.request_id,
                ServerFrame::ResultPatch {
                    request_id: job.request_id.clone(),
                    place_id: job.place_id.clone(),
                    patch: ProviderPatch::single(
                        self.provider,
                        ProviderSlot {
                            status,
                            url,
                            updated_at: Some(now),
                        },
                    ),
                    updated_at: now,
                },
            )
            .await;
    }
}

//! Bounded per-provider job queue with dedup by place id.
//!
//! One queue feeds one worker, so provider resolution is strictly serial and
//! the search API key stays within rate budget. Enqueueing a place that is
//! already queued is a logged no-op.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use platefinder_common::types::DeliveryProvider;

#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub request_id: String,
    pub provider: DeliveryProvider,
    pub place_id: String,
    pub name: String,
    pub city: Option<String>,
}

/// Shared between the queue handle and its worker: the worker removes a
/// place id when it pulls the job, re-opening the slot.
pub type PendingSet = Arc<Mutex<HashSet<String>>>;

pub struct ProviderQueue {
    provider: DeliveryProvider,
    tx: mpsc::Sender<EnrichmentJob>,
    pending: PendingSet,
}

impl ProviderQueue {
    pub fn new(
        provider: DeliveryProvider,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<EnrichmentJob>, PendingSet) {
        let (tx, rx) = mpsc::channel(capacity);
        let pending: PendingSet = Arc::new(Mutex::new(HashSet::new()));
        (
            Self {
                provider,
                tx,
                pending: pending.clone(),
            },
            rx,
            pending,
        )
    }

    /// Returns true when the job was accepted. Duplicate place ids and a
    /// full queue are dropped.
    pub fn enqueue(&self, job: EnrichmentJob) -> bool {
        {
            let mut pending = self.pending.lock().expect("queue lock poisoned");
            if !pending.insert(job.place_id.clone()) {
                debug!(
                    provider = %self.provider,
                    place_id = %job.place_id,
                    "deduplicated"
                );
                return false;
            }
        }

        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    provider = %self.provider,
                    place_id = %job.place_id,
                    "Enrichment queue full, dropping job"
                );
                self.pending
                    .lock()
                    .expect("queue lock poisoned")
                    .remove(&job.place_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(
                    provider = %self.provider,
                    place_id = %job.place_id,
                    "Enrichment worker gone, dropping job"
                );
                self.pending
                    .lock()
                    .expect("queue lock poisoned")
                    .remove(&job.place_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(place_id: &str) -> EnrichmentJob {
        EnrichmentJob {
            request_id: "req-1".to_string(),
            provider: DeliveryProvider::Wolt,
            place_id: place_id.to_string(),
            name: "Pizza Joe".to_string(),
            city: None,
        }
    }

    #[tokio::test]
    async fn duplicate_place_id_is_dropped() {
        let (queue, mut rx, _pending) = ProviderQueue::new(DeliveryProvider::Wolt, 10);
        assert!(queue.enqueue(job("p1")));
        assert!(!queue.enqueue(job("p1")));
        assert!(queue.enqueue(job("p2")));

        assert_eq!(rx.recv().await.unwrap().place_id, "p1");
        assert_eq!(rx.recv().await.unwrap().place_id, "p2");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_and_reopens_slot() {
        let (queue, mut rx, _pending) = ProviderQueue::new(DeliveryProvider::Wolt, 1);
        assert!(queue.enqueue(job("p1")));
        assert!(!queue.enqueue(job("p2")), "queue of one is full");

        // The dropped job's slot is reopened, so a later enqueue works.
        assert_eq!(rx.recv().await.unwrap().place_id, "p1");
        assert!(queue.enqueue(job("p2")));
    }

    #[tokio::test]
    async fn slot_reopens_after_worker_pull() {
        let (queue, mut rx, pending) = ProviderQueue::new(DeliveryProvider::Wolt, 10);
        assert!(queue.enqueue(job("p1")));

        let pulled = rx.recv().await.unwrap();
        pending.lock().unwrap().remove(&pulled.place_id);

        assert!(queue.enqueue(job("p1")));
    }
}

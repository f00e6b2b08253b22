//! Deep-link enrichment: verified delivery-provider links for finalized
//! search results.
//!
//! The guarantee is "verified deep-links only": a URL is attached iff its
//! host matches the provider's allowlist and its path carries the provider's
//! required segment. There is no generic-search-URL fallback. Resolution is
//! cache-first, deduplicated per place behind a SETNX lock, and runs on one
//! in-process worker per provider so search-API rate stays within budget.

pub mod matcher;
pub mod providers;
pub mod queue;
pub mod resolver;
pub mod service;
pub mod worker;

pub use providers::{provider_rules, ProviderRules};
pub use resolver::{ResolveOutcome, ResolveRequest, Resolver};
pub use service::EnrichmentService;

/// Bounded per-provider queue size. Jobs past this are dropped with a log
/// line; the safety-net patch keeps subscribers from hanging on PENDING.
pub const QUEUE_CAPACITY: usize = 100;

/// Cache key for a resolved deep-link.
pub fn link_key(provider: platefinder_common::types::DeliveryProvider, place_id: &str) -> String {
    format!("provider:{provider}:{place_id}")
}

/// SETNX lock key guarding one in-flight resolution per place.
pub fn lock_key(provider: platefinder_common::types::DeliveryProvider, place_id: &str) -> String {
    format!("provider:{provider}:lock:{place_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::DeliveryProvider;

    #[test]
    fn key_shapes() {
        assert_eq!(link_key(DeliveryProvider::Wolt, "p1"), "provider:wolt:p1");
        assert_eq!(
            lock_key(DeliveryProvider::Tenbis, "p1"),
            "provider:tenbis:lock:p1"
        );
    }
}

//! Post-constraints: open-state, price level range, dietary and access
//! flags. Runs concurrently with route planning; a failure degrades to an
//! empty constraint set rather than killing the request.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ai_client::{schema_for, StructuredModel};
use platefinder_common::cache::{CacheEntry, CacheManager};
use platefinder_common::normalize_for_key;
use platefinder_common::types::{PostConstraints, QueryLanguage};

use super::classify;

const STAGE: &str = "post_constraints";
const PROMPT_VERSION: &str = "constraints-v2";

const SYSTEM_PROMPT: &str = "\
Extract filtering constraints from a restaurant query. Fill every field; \
use null when the query does not state it.

- openState: OPEN_NOW only when the user asks for places open now; OPEN_AT \
with openAt when a specific time is named; OPEN_BETWEEN with openBetween \
for a window; CLOSED_NOW almost never.
- priceLevel / priceLevelRange: 1 (cheapest) to 4 (most expensive), only \
when the user states a budget.
- isKosher / isGlutenFree: only on explicit mention.
- requirements.accessible / requirements.parking: only on explicit mention.
Times are HH:MM 24h; days are lowercase English day names.";

pub struct ConstraintOptions {
    pub timeout: Duration,
    /// Same memoization shape as intent: `(normalized query, language)`,
    /// 10-minute TTL, off by default.
    pub memoize: bool,
    pub memo_ttl: Duration,
}

pub async fn run_constraints(
    model: &dyn StructuredModel,
    cache: &CacheManager,
    query: &str,
    language: QueryLanguage,
    options: &ConstraintOptions,
    cancel: &CancellationToken,
) -> PostConstraints {
    let memo_key = format!("intent:constraints:{}:{}", normalize_for_key(query), language);

    if options.memoize {
        if let Some(entry) = cache.get::<PostConstraints>(&memo_key).await {
            debug!(key = %memo_key, "Constraints memo hit");
            return entry.value;
        }
    }

    let user_prompt = format!("Query language: {language}\nQuery: {query}");

    match classify::<PostConstraints>(
        model,
        STAGE,
        PROMPT_VERSION,
        SYSTEM_PROMPT.to_string(),
        user_prompt,
        schema_for::<PostConstraints>(),
        options.timeout,
        cancel,
    )
    .await
    {
        Ok(constraints) => {
            if options.memoize {
                cache
                    .put(
                        &memo_key,
                        &CacheEntry::found(constraints.clone()),
                        options.memo_ttl,
                    )
                    .await;
            }
            constraints
        }
        Err(e) => {
            warn!(error = %e, "Post-constraints classifier failed, filtering without constraints");
            PostConstraints::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ai_client::{LlmError, StructuredCall};
    use platefinder_common::types::OpenState;

    struct CannedModel(serde_json::Value);

    #[async_trait]
    impl StructuredModel for CannedModel {
        async fn structured(
            &self,
            _call: &StructuredCall,
            _cancel: &CancellationToken,
        ) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl StructuredModel for FailingModel {
        async fn structured(
            &self,
            _call: &StructuredCall,
            _cancel: &CancellationToken,
        ) -> Result<serde_json::Value, LlmError> {
            Err(LlmError::Quota)
        }
    }

    fn options(memoize: bool) -> ConstraintOptions {
        ConstraintOptions {
            timeout: Duration::from_secs(5),
            memoize,
            memo_ttl: Duration::from_secs(600),
        }
    }

    fn cache() -> CacheManager {
        CacheManager::new(Box::new(platefinder_common::cache::MemoryStore::new(
            std::collections::HashMap::new(),
        )))
    }

    #[tokio::test]
    async fn open_now_and_price_extracted() {
        let canned = CannedModel(serde_json::json!({
            "openState": "OPEN_NOW",
            "openAt": null,
            "openBetween": null,
            "priceLevel": null,
            "priceLevelRange": {"min": 1, "max": 2},
            "isKosher": true,
            "isGlutenFree": null,
            "requirements": {"accessible": null, "parking": null}
        }));
        let cancel = CancellationToken::new();
        let constraints = run_constraints(
            &canned,
            &cache(),
            "כשר זול פתוח עכשיו",
            QueryLanguage::He,
            &options(false),
            &cancel,
        )
        .await;
        assert_eq!(constraints.open_state, Some(OpenState::OpenNow));
        assert_eq!(constraints.is_kosher, Some(true));
        assert_eq!(constraints.price_level_range.unwrap().max, 2);
    }

    #[tokio::test]
    async fn failure_degrades_to_empty_constraints() {
        let cancel = CancellationToken::new();
        let constraints = run_constraints(
            &FailingModel,
            &cache(),
            "pizza",
            QueryLanguage::En,
            &options(false),
            &cancel,
        )
        .await;
        assert_eq!(constraints.open_state, None);
        assert_eq!(constraints.price_level, None);
    }

    #[tokio::test]
    async fn memoized_result_skips_second_call() {
        let canned = CannedModel(serde_json::json!({
            "openState": "OPEN_NOW",
            "openAt": null,
            "openBetween": null,
            "priceLevel": null,
            "priceLevelRange": null,
            "isKosher": null,
            "isGlutenFree": null,
            "requirements": {"accessible": null, "parking": null}
        }));
        let cancel = CancellationToken::new();
        let cache = cache();

        let first = run_constraints(
            &canned,
            &cache,
            "open now pizza",
            QueryLanguage::En,
            &options(true),
            &cancel,
        )
        .await;
        assert_eq!(first.open_state, Some(OpenState::OpenNow));

        // Second run hits the memo even with a dead model.
        let second = run_constraints(
            &FailingModel,
            &cache,
            "open now  PIZZA",
            QueryLanguage::En,
            &options(true),
            &cancel,
        )
        .await;
        assert_eq!(second.open_state, Some(OpenState::OpenNow));
    }
}

//! Three-layer resolver with progressive query relaxation.
//!
//! Four policies, strict to minimal, each constrained to the provider host
//! via the `site:` operator. The first policy whose results contain a
//! validated URL ends the scan. Without a configured search engine the
//! resolver answers NOT_FOUND immediately.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use platefinder_common::slugify;
use platefinder_common::types::DeliveryProvider;
use websearch_client::{SearchEngine, SearchHit};

use crate::matcher::pick_best;
use crate::providers::provider_rules;

const RESULTS_PER_ATTEMPT: usize = 10;

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub provider: DeliveryProvider,
    pub place_id: String,
    pub name: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Found { url: String },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Strict,
    Moderate,
    Relaxed,
    Minimal,
}

impl Policy {
    fn all() -> [Policy; 4] {
        [Policy::Strict, Policy::Moderate, Policy::Relaxed, Policy::Minimal]
    }

    /// Strict and moderate need a city; without one they are skipped.
    fn applies(self, has_city: bool) -> bool {
        match self {
            Policy::Strict | Policy::Moderate => has_city,
            Policy::Relaxed | Policy::Minimal => true,
        }
    }

    fn query(self, site_host: &str, name: &str, city: Option<&str>) -> String {
        match (self, city) {
            (Policy::Strict, Some(city)) => format!("site:{site_host} \"{name}\" \"{city}\""),
            (Policy::Moderate, Some(city)) => format!("site:{site_host} \"{name}\" {city}"),
            (Policy::Relaxed, _) => format!("site:{site_host} \"{name}\""),
            (Policy::Minimal, _) => format!("site:{site_host} {name}"),
            // Unreachable by `applies`, kept total.
            (Policy::Strict | Policy::Moderate, None) => {
                format!("site:{site_host} \"{name}\"")
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            Policy::Strict => "strict",
            Policy::Moderate => "moderate",
            Policy::Relaxed => "relaxed",
            Policy::Minimal => "minimal",
        }
    }
}

pub struct Resolver {
    engine: Option<Arc<dyn SearchEngine>>,
}

impl Resolver {
    pub fn new(engine: Option<Arc<dyn SearchEngine>>) -> Self {
        Self { engine }
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub async fn resolve(
        &self,
        request: &ResolveRequest,
        cancel: &CancellationToken,
    ) -> ResolveOutcome {
        let Some(engine) = &self.engine else {
            debug!(provider = %request.provider, "No search engine configured, NOT_FOUND");
            return ResolveOutcome::NotFound;
        };

        let rules = provider_rules(request.provider);
        let city = request.city.as_deref();

        for policy in Policy::all() {
            if !policy.applies(city.is_some()) {
                continue;
            }
            if cancel.is_cancelled() {
                return ResolveOutcome::NotFound;
            }

            let query = policy.query(rules.site_host, &request.name, city);
            let hits = match engine.search(&query, RESULTS_PER_ATTEMPT, cancel).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(
                        provider = %request.provider,
                        policy = policy.label(),
                        error = %e,
                        "Search attempt failed, relaxing"
                    );
                    continue;
                }
            };

            let mut validated: Vec<SearchHit> = hits
                .into_iter()
                .filter(|h| rules.validate_url(&h.url))
                .collect();

            // Wolt deep-links carry the city slug; restrict to those when
            // any candidate has it.
            if rules.prefers_city_slug {
                if let Some(city) = city {
                    let slug = slugify(city);
                    if !slug.is_empty() && validated.iter().any(|h| h.url.contains(&slug)) {
                        validated.retain(|h| h.url.contains(&slug));
                    }
                }
            }

            if let Some(best) = pick_best(&validated, &request.name, city) {
                info!(
                    provider = %request.provider,
                    place_id = %request.place_id,
                    policy = policy.label(),
                    url = %best.url,
                    "Deep-link resolved"
                );
                return ResolveOutcome::Found {
                    url: best.url.clone(),
                };
            }
        }

        info!(
            provider = %request.provider,
            place_id = %request.place_id,
            "No verified deep-link found"
        );
        ResolveOutcome::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use websearch_client::Result as SearchResult;

    struct ScriptedEngine {
        /// Hits returned for each successive search call.
        pages: Mutex<Vec<Vec<SearchHit>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(pages: Vec<Vec<SearchHit>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchEngine for ScriptedEngine {
        async fn search(
            &self,
            query: &str,
            _count: usize,
            _cancel: &CancellationToken,
        ) -> SearchResult<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: "Pizza Joe".to_string(),
            url: url.to_string(),
            snippet: String::new(),
        }
    }

    fn request(city: Option<&str>) -> ResolveRequest {
        ResolveRequest {
            provider: DeliveryProvider::Wolt,
            place_id: "p1".to_string(),
            name: "Pizza Joe".to_string(),
            city: city.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn verified_only_rejects_search_urls() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![
            hit("https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe"),
            hit("https://wolt.com/search?q=pizza-joe"),
        ]]));
        let resolver = Resolver::new(Some(engine));
        let outcome = resolver
            .resolve(&request(Some("Tel Aviv")), &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            ResolveOutcome::Found {
                url: "https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe".to_string()
            }
        );
    }

    #[tokio::test]
    async fn nothing_validated_means_not_found() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            vec![hit("https://wolt.com/search?q=a")],
            vec![],
            vec![],
            vec![],
        ]));
        let resolver = Resolver::new(Some(engine));
        let outcome = resolver
            .resolve(&request(Some("Tel Aviv")), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn progressive_relaxation_queries_in_order() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            vec![],
            vec![],
            vec![hit("https://wolt.com/en/isr/tlv/restaurant/pizza-joe")],
        ]));
        let resolver = Resolver::new(Some(engine.clone()));
        let outcome = resolver
            .resolve(&request(Some("Tel Aviv")), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, ResolveOutcome::Found { .. }));

        let queries = engine.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "site:wolt.com \"Pizza Joe\" \"Tel Aviv\"");
        assert_eq!(queries[1], "site:wolt.com \"Pizza Joe\" Tel Aviv");
        assert_eq!(queries[2], "site:wolt.com \"Pizza Joe\"");
    }

    #[tokio::test]
    async fn city_policies_skipped_without_city() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![], vec![]]));
        let resolver = Resolver::new(Some(engine.clone()));
        let outcome = resolver.resolve(&request(None), &CancellationToken::new()).await;
        assert_eq!(outcome, ResolveOutcome::NotFound);

        let queries = engine.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], "site:wolt.com \"Pizza Joe\"");
        assert_eq!(queries[1], "site:wolt.com Pizza Joe");
    }

    #[tokio::test]
    async fn city_slug_preference_restricts_selection() {
        let engine = Arc::new(ScriptedEngine::new(vec![vec![
            hit("https://wolt.com/en/isr/haifa/restaurant/pizza-joe"),
            hit("https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe"),
        ]]));
        let resolver = Resolver::new(Some(engine));
        let outcome = resolver
            .resolve(&request(Some("Tel Aviv")), &CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            ResolveOutcome::Found {
                url: "https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe".to_string()
            }
        );
    }

    #[tokio::test]
    async fn no_engine_is_immediate_not_found() {
        let resolver = Resolver::new(None);
        let outcome = resolver
            .resolve(&request(Some("Tel Aviv")), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }
}

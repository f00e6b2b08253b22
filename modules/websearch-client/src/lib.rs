//! Swappable web-search engines for deep-link resolution.
//!
//! The resolver only needs `search(query, count, cancel)` returning titles,
//! URLs, and snippets. Brave is preferred; Google CSE is the fallback; with
//! neither configured the resolver goes straight to NOT_FOUND.

pub mod brave;
pub mod cse;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use brave::BraveSearch;
pub use cse::GoogleCse;
pub use error::{Result, SearchEngineError};

pub const MAX_RESULTS: usize = 20;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Search the web. `count` is capped at [`MAX_RESULTS`].
    async fn search(
        &self,
        query: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>>;

    fn name(&self) -> &'static str;
}

/// Constructor choice: Brave over CSE, `None` when neither is configured.
pub fn from_config(
    brave_api_key: &str,
    cse_key: &str,
    cse_cx: &str,
    attempt_timeout: Duration,
) -> Option<Arc<dyn SearchEngine>> {
    if !brave_api_key.is_empty() {
        return Some(Arc::new(BraveSearch::new(brave_api_key, attempt_timeout)));
    }
    if !cse_key.is_empty() && !cse_cx.is_empty() {
        return Some(Arc::new(GoogleCse::new(cse_key, cse_cx, attempt_timeout)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brave_wins_when_both_configured() {
        let engine = from_config("brave-key", "cse-key", "cse-cx", Duration::from_secs(20));
        assert_eq!(engine.unwrap().name(), "brave");
    }

    #[test]
    fn cse_is_the_fallback() {
        let engine = from_config("", "cse-key", "cse-cx", Duration::from_secs(20));
        assert_eq!(engine.unwrap().name(), "google_cse");
    }

    #[test]
    fn none_without_credentials() {
        assert!(from_config("", "", "", Duration::from_secs(20)).is_none());
        assert!(from_config("", "cse-key", "", Duration::from_secs(20)).is_none());
    }
}

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use platefinder_common::retry::{with_deadline, with_retry, Interrupted, WEBSEARCH_RETRY};

use crate::error::{Result, SearchEngineError};
use crate::{SearchEngine, SearchHit, MAX_RESULTS};

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

pub struct BraveSearch {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    attempt_timeout: Duration,
}

impl BraveSearch {
    pub fn new(api_key: &str, attempt_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: BRAVE_API_URL.to_string(),
            attempt_timeout,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn fetch_once(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SearchEngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: BraveResponse = resp
            .json()
            .await
            .map_err(|e| SearchEngineError::Parse(e.to_string()))?;

        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect())
    }
}

#[async_trait]
impl SearchEngine for BraveSearch {
    async fn search(
        &self,
        query: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let count = count.min(MAX_RESULTS);
        info!(query, count, "Brave search");

        with_retry(
            &WEBSEARCH_RETRY,
            cancel,
            SearchEngineError::is_retryable,
            || async {
                match with_deadline(self.attempt_timeout, cancel, self.fetch_once(query, count))
                    .await
                {
                    Ok(result) => result,
                    Err(Interrupted::Timeout) => Err(SearchEngineError::Timeout),
                    Err(Interrupted::Cancelled) => Err(SearchEngineError::Cancelled),
                }
            },
        )
        .await
    }

    fn name(&self) -> &'static str {
        "brave"
    }
}

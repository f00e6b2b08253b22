use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use platefinder_common::retry::{with_deadline, with_retry, Interrupted, WEBSEARCH_RETRY};

use crate::error::{Result, SearchEngineError};
use crate::{SearchEngine, SearchHit, MAX_RESULTS};

const CSE_API_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// CSE pages by 10; one page covers every resolver attempt (≤10 hits).
const CSE_PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct GoogleCse {
    http: reqwest::Client,
    api_key: String,
    cx: String,
    base_url: String,
    attempt_timeout: Duration,
}

impl GoogleCse {
    pub fn new(api_key: &str, cx: &str, attempt_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            cx: cx.to_string(),
            base_url: CSE_API_URL.to_string(),
            attempt_timeout,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn fetch_page(&self, query: &str, start: usize, num: usize) -> Result<Vec<SearchHit>> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", query),
                ("num", &num.to_string()),
                ("start", &(start + 1).to_string()),
            ])
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

        let body: CseResponse = resp
            .json()
            .await
            .map_err(|e| SearchEngineError::Parse(e.to_string()))?;

        Ok(body
            .items
            .into_iter()
            .map(|i| SearchHit {
                title: i.title,
                url: i.link,
                snippet: i.snippet,
            })
            .collect())
    }

    async fn fetch_once(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        let mut start = 0;
        while hits.len() < count {
            let num = (count - hits.len()).min(CSE_PAGE_SIZE);
            let page = self.fetch_page(query, start, num).await?;
            let got = page.len();
            hits.extend(page);
            if got < num {
                break;
            }
            start += got;
        }
        hits.truncate(count);
        Ok(hits)
    }
}

#[async_trait]
impl SearchEngine for GoogleCse {
    async fn search(
        &self,
        query: &str,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let count = count.min(MAX_RESULTS);
        info!(query, count, "Google CSE search");

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
        "google_cse"
    }
}

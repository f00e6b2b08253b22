//! Claude backend: messages API with one forced tool whose input schema is
//! the call's schema, so the tool input IS the structured value.

use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::call::StructuredCall;
use crate::error::LlmError;
use crate::util::bounded;
use crate::StructuredModel;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const STRUCTURED_TOOL: &str = "emit_result";

// --- Wire types ---

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    tools: Vec<WireTool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

// --- Client ---

pub struct ClaudeModel {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ClaudeModel {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| LlmError::Other(anyhow!(e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post_structured(&self, call: &StructuredCall) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/messages", self.base_url);

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            system: call.system_prompt.clone(),
            messages: vec![WireMessage {
                role: "user",
                content: call.user_prompt.clone(),
            }],
            tools: vec![WireTool {
                name: STRUCTURED_TOOL,
                description: "Emit the classification result.",
                input_schema: call.schema.clone(),
            }],
            tool_choice: ToolChoice {
                choice_type: "tool",
                name: STRUCTURED_TOOL,
            },
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Other(anyhow!(e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::Quota);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Other(anyhow!(
                "Claude API error ({status}): {error_text}"
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        body.content
            .into_iter()
            .find(|block| block.block_type == "tool_use")
            .and_then(|block| block.input)
            .ok_or_else(|| LlmError::Parse("no tool_use block in response".to_string()))
    }
}

#[async_trait]
impl StructuredModel for ClaudeModel {
    async fn structured(
        &self,
        call: &StructuredCall,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, LlmError> {
        let started = Instant::now();
        let outcome = bounded(call.timeout, cancel, self.post_structured(call)).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            stage = call.stage,
            prompt_version = call.prompt_version,
            prompt_hash = %call.prompt_hash,
            schema_hash = %call.schema_hash,
            elapsed_ms,
            ok = outcome.is_ok(),
            "Structured model call"
        );

        outcome?
    }
}

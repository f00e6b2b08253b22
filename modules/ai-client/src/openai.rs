//! OpenAI backend: chat/completions with `response_format = json_schema`.

use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::call::StructuredCall;
use crate::error::LlmError;
use crate::util::{bounded, strip_code_blocks};
use crate::StructuredModel;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

// --- Wire types ---

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct StructuredRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

// --- Client ---

pub struct OpenAiModel {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiModel {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            http: reqwest::Client::new(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| LlmError::Other(anyhow!(e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post_structured(&self, call: &StructuredCall) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: call.system_prompt.clone(),
                },
                WireMessage {
                    role: "user",
                    content: call.user_prompt.clone(),
                },
            ],
            temperature: if self.model.starts_with("gpt-5") {
                None
            } else {
                Some(0.0)
            },
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: format!("{}_response", call.stage),
                    strict: true,
                    schema: call.schema.clone(),
                },
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
                "OpenAI structured output error ({status}): {error_text}"
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("no content in response".to_string()))
    }
}

#[async_trait]
impl StructuredModel for OpenAiModel {
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

        let raw = outcome??;
        serde_json::from_str(strip_code_blocks(&raw)).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

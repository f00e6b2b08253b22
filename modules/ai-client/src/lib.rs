//! Structured-output model client.
//!
//! The pipeline's classifiers all speak one contract: given a system prompt,
//! a user prompt, and a JSON schema, return a value conforming to the schema
//! or fail with a typed error. The schema travels by value; prompt and
//! schema hashes are attached to every call for drift detection.

pub mod call;
pub mod claude;
pub mod error;
pub mod openai;
pub mod schema;
pub mod util;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use call::{short_hash, StructuredCall};
pub use claude::ClaudeModel;
pub use error::LlmError;
pub use openai::OpenAiModel;
pub use schema::{schema_for, strict_schema};

/// The one capability classifiers are built on. Implementations must honor
/// the call's timeout and the request's cancellation token.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    async fn structured(
        &self,
        call: &StructuredCall,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Decode a schema-shaped value into its typed form. A mismatch here means
/// the model violated the schema it was handed.
pub fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, LlmError> {
    serde_json::from_value(value).map_err(|e| LlmError::SchemaInvalid(e.to_string()))
}

/// Pick a backend from available credentials: OpenAI first, Claude second.
pub fn from_keys(openai_api_key: &str, anthropic_api_key: &str) -> Result<Arc<dyn StructuredModel>> {
    if !openai_api_key.is_empty() {
        return Ok(Arc::new(OpenAiModel::new(openai_api_key)));
    }
    if !anthropic_api_key.is_empty() {
        return Ok(Arc::new(ClaudeModel::new(anthropic_api_key)));
    }
    bail!("no model provider configured: set OPENAI_API_KEY or ANTHROPIC_API_KEY")
}

//! Classifier stages. All four share one calling convention against the
//! structured model: versioned system prompt, user prompt, strict schema,
//! per-stage timeout, request cancellation. Hashes travel with every call.

pub mod constraints;
pub mod gate;
pub mod intent;
pub mod route_plan;

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use ai_client::{LlmError, StructuredCall, StructuredModel};

/// Run one classifier call and decode the schema-shaped value.
pub(crate) async fn classify<T: DeserializeOwned>(
    model: &dyn StructuredModel,
    stage: &'static str,
    prompt_version: &'static str,
    system_prompt: String,
    user_prompt: String,
    schema: serde_json::Value,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, LlmError> {
    let call = StructuredCall::new(
        stage,
        prompt_version,
        system_prompt,
        user_prompt,
        schema,
        timeout,
    );
    let value = model.structured(&call, cancel).await?;
    ai_client::decode(value)
}

use std::time::Duration;

use sha2::{Digest, Sha256};

/// First 16 hex chars of the SHA-256 of `input`. Short enough to log on
/// every call, long enough that a drifted prompt or schema never collides.
pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// One structured-output request. The schema is carried by value; hashes are
/// computed once at construction and logged by the backend on every call.
#[derive(Debug, Clone)]
pub struct StructuredCall {
    pub stage: &'static str,
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: serde_json::Value,
    pub timeout: Duration,
    pub prompt_version: &'static str,
    pub prompt_hash: String,
    pub schema_hash: String,
}

impl StructuredCall {
    pub fn new(
        stage: &'static str,
        prompt_version: &'static str,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        schema: serde_json::Value,
        timeout: Duration,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let prompt_hash = short_hash(&system_prompt);
        let schema_hash = short_hash(&schema.to_string());
        Self {
            stage,
            system_prompt,
            user_prompt: user_prompt.into(),
            schema,
            timeout,
            prompt_version,
            prompt_hash,
            schema_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_short() {
        let a = short_hash("gate prompt v1");
        let b = short_hash("gate prompt v1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn hash_detects_drift() {
        assert_ne!(short_hash("gate prompt v1"), short_hash("gate prompt v2"));
    }

    #[test]
    fn call_hashes_prompt_and_schema_independently() {
        let schema = serde_json::json!({"type": "object"});
        let call = StructuredCall::new(
            "gate",
            "v1",
            "You are a gate.",
            "pizza",
            schema.clone(),
            Duration::from_secs(5),
        );
        assert_eq!(call.prompt_hash, short_hash("You are a gate."));
        assert_eq!(call.schema_hash, short_hash(&schema.to_string()));
    }
}

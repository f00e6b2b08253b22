use thiserror::Error;

/// Typed failure modes of a structured model call. Stages translate these
/// into fallbacks or failure reasons; nothing retries a classifier.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model call timed out")]
    Timeout,

    #[error("model call cancelled")]
    Cancelled,

    #[error("model output violated the schema: {0}")]
    SchemaInvalid(String),

    #[error("model output could not be parsed: {0}")]
    Parse(String),

    #[error("model quota exhausted")]
    Quota,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

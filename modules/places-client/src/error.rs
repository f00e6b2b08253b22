use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlacesError>;

#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider status {code}: {message}")]
    Provider { code: String, message: String },

    #[error("Quota exhausted")]
    Quota,

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for PlacesError {
    fn from(err: reqwest::Error) -> Self {
        PlacesError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for PlacesError {
    fn from(err: serde_json::Error) -> Self {
        PlacesError::Parse(err.to_string())
    }
}

impl PlacesError {
    /// 429 and 5xx responses are retryable; provider OVER_QUERY_LIMIT is a
    /// quota signal, not a retry candidate.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlacesError::Api { status, .. } => {
                platefinder_common::retry::status_is_retryable(*status)
            }
            PlacesError::Network(_) => true,
            _ => false,
        }
    }
}

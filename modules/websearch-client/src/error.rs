use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchEngineError>;

#[derive(Debug, Error)]
pub enum SearchEngineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SearchEngineError {
    fn from(err: reqwest::Error) -> Self {
        SearchEngineError::Network(err.to_string())
    }
}

impl SearchEngineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchEngineError::Api { status, .. } => {
                platefinder_common::retry::status_is_retryable(*status)
            }
            SearchEngineError::Network(_) | SearchEngineError::Timeout => true,
            _ => false,
        }
    }
}

use thiserror::Error;

use crate::types::FailureReason;

/// Error taxonomy for the search pipeline. Kinds, not transport types:
/// stages catch their collaborators' errors and translate into one of these,
/// and the orchestrator maps them to a deterministic failure reason at
/// response assembly. Cache errors are handled as bypass and never reach
/// this enum.
#[derive(Error, Debug)]
pub enum PlatefinderError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Classifier timeout in stage {0}")]
    ClassifierTimeout(&'static str),

    #[error("Classifier quota exhausted in stage {0}")]
    ClassifierQuota(&'static str),

    #[error("Classifier failure in stage {stage}: {message}")]
    Classifier {
        stage: &'static str,
        message: String,
    },

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream quota exhausted")]
    UpstreamQuota,

    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("Geocoding failed for {0}")]
    Geocoding(String),

    #[error("Request deadline exhausted")]
    Deadline,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error(transparent)]
    System(#[from] anyhow::Error),
}

impl PlatefinderError {
    /// Deterministic mapping to the response failure reason. The detector in
    /// the search crate layers result-shape reasons (NO_RESULTS and weaker)
    /// on top; this covers the explicit-error precedence tier.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            PlatefinderError::ClassifierTimeout(_)
            | PlatefinderError::UpstreamTimeout
            | PlatefinderError::Deadline
            | PlatefinderError::Cancelled => FailureReason::Timeout,
            PlatefinderError::ClassifierQuota(_) | PlatefinderError::UpstreamQuota => {
                FailureReason::QuotaExceeded
            }
            PlatefinderError::Geocoding(_) => FailureReason::GeocodingFailed,
            PlatefinderError::Upstream { .. } => FailureReason::ProviderError,
            PlatefinderError::Classifier { .. }
            | PlatefinderError::Input(_)
            | PlatefinderError::Authorization(_)
            | PlatefinderError::System(_) => FailureReason::ProviderError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_errors_map_to_reasons() {
        assert_eq!(
            PlatefinderError::Deadline.failure_reason(),
            FailureReason::Timeout
        );
        assert_eq!(
            PlatefinderError::UpstreamQuota.failure_reason(),
            FailureReason::QuotaExceeded
        );
        assert_eq!(
            PlatefinderError::Upstream {
                status: 500,
                message: "boom".into()
            }
            .failure_reason(),
            FailureReason::ProviderError
        );
        assert_eq!(
            PlatefinderError::Geocoding("haifa".into()).failure_reason(),
            FailureReason::GeocodingFailed
        );
    }
}

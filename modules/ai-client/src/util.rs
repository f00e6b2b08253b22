use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Race a backend call against its deadline and the request's cancellation.
pub(crate) async fn bounded<F>(
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, LlmError>
where
    F: Future,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        outcome = tokio::time::timeout(timeout, fut) => {
            outcome.map_err(|_| LlmError::Timeout)
        }
    }
}

/// Strip markdown code fences from a model response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        assert_eq!(strip_code_blocks("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }
}

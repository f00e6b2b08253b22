//! Gate: the first, cheap classifier. Single responsibility: refuse
//! non-food queries, ask for clarification, otherwise CONTINUE. This is the
//! only stage allowed a lenient fallback — on any model failure it routes
//! the query into full analysis rather than dropping it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ai_client::{schema_for, StructuredModel};
use platefinder_common::types::{FoodSignal, GateResult, GateRoute, QueryLanguage};

use super::classify;

const STAGE: &str = "gate";
const PROMPT_VERSION: &str = "gate-v3";

const SYSTEM_PROMPT: &str = "\
You are the gate of a restaurant-search assistant. Decide whether the query \
is about finding food or restaurants, and how to proceed.

Rules:
- foodSignal YES: the query clearly seeks food, a restaurant, a cuisine, or delivery.
- foodSignal NO: the query is unrelated to food. Route STOP.
- foodSignal MAYBE: ambiguous. Route ASK_CLARIFY only when a single short \
question would resolve it; otherwise CONTINUE and let full analysis decide.
- language: the dominant language of the query text.
- confidence: your confidence in the route, 0.0 to 1.0.
Keep reason to one short sentence.

Examples:
- \"sushi near me\" → YES, CONTINUE
- \"מסעדה רומנטית בתל אביב\" → YES, CONTINUE
- \"где поесть хумус\" → YES, CONTINUE
- \"fix my carburetor\" → NO, STOP
- \"something nice tonight\" → MAYBE, ASK_CLARIFY (food or activity?)
- \"burgers\" → YES, CONTINUE (thin but routable)";

pub async fn run_gate(
    model: &dyn StructuredModel,
    query: &str,
    detected_language: QueryLanguage,
    timeout: Duration,
    cancel: &CancellationToken,
) -> GateResult {
    let user_prompt = format!("Detected script language: {detected_language}\nQuery: {query}");

    match classify::<GateResult>(
        model,
        STAGE,
        PROMPT_VERSION,
        SYSTEM_PROMPT.to_string(),
        user_prompt,
        schema_for::<GateResult>(),
        timeout,
        cancel,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            // Lenient fallback: a dead gate must not block food searches.
            warn!(error = %e, "Gate classifier failed, continuing to full analysis");
            GateResult {
                food_signal: FoodSignal::Maybe,
                language: detected_language,
                route: GateRoute::Continue,
                confidence: 0.0,
                reason: "gate_fallback".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ai_client::{LlmError, StructuredCall};

    struct FailingModel;

    #[async_trait]
    impl StructuredModel for FailingModel {
        async fn structured(
            &self,
            _call: &StructuredCall,
            _cancel: &CancellationToken,
        ) -> Result<serde_json::Value, LlmError> {
            Err(LlmError::Timeout)
        }
    }

    struct CannedModel(serde_json::Value);

    #[async_trait]
    impl StructuredModel for CannedModel {
        async fn structured(
            &self,
            _call: &StructuredCall,
            _cancel: &CancellationToken,
        ) -> Result<serde_json::Value, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn failure_falls_back_to_continue() {
        let cancel = CancellationToken::new();
        let result = run_gate(
            &FailingModel,
            "pizza near me",
            QueryLanguage::En,
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert_eq!(result.route, GateRoute::Continue);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn stop_route_passes_through() {
        let canned = CannedModel(serde_json::json!({
            "foodSignal": "NO",
            "language": "en",
            "route": "STOP",
            "confidence": 0.96,
            "reason": "query is about car repair"
        }));
        let cancel = CancellationToken::new();
        let result = run_gate(
            &canned,
            "fix my carburetor",
            QueryLanguage::En,
            Duration::from_secs(5),
            &cancel,
        )
        .await;
        assert_eq!(result.route, GateRoute::Stop);
        assert_eq!(result.food_signal, FoodSignal::No);
    }
}

//! Route-LLM: projects the intent and the resolved shared filters into a
//! concrete provider call plan. A post-check promotes anchorless TEXTSEARCH
//! plans to clarify — the late guard behind the early one.

use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ai_client::{schema_for, LlmError, StructuredModel};
use platefinder_common::types::{
    CircleBias, FinalSharedFilters, IntentResult, LatLng, ProviderCall, ProviderCallPlan,
    SearchRoute,
};

use super::classify;

const STAGE: &str = "route_llm";
const PROMPT_VERSION: &str = "route-v4";

const NEARBY_DEFAULT_RADIUS_M: u32 = 1500;
const LANDMARK_DEFAULT_RADIUS_M: u32 = 1000;
const TEXTSEARCH_BIAS_RADIUS_M: u32 = 3000;

const SYSTEM_PROMPT: &str = "\
You turn a routed restaurant query into one concrete provider call.

For TEXTSEARCH produce textQuery: the search phrase including the city when \
one is named, phrased in the provider language. For NEARBY and LANDMARK \
produce keyword: the food phrase alone. For LANDMARK also produce \
geocodeQuery: the landmark as a geocodable phrase. Echo cityText when a \
city is named. Set useLocationBias only when results should be pulled \
toward the user's coordinates. Never invent a city the user did not give.";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct RoutePlanOutput {
    route: SearchRoute,
    text_query: Option<String>,
    keyword: Option<String>,
    geocode_query: Option<String>,
    city_text: Option<String>,
    radius_meters: Option<u32>,
    use_location_bias: bool,
}

/// The plan, or the late anchor guard asking for clarification.
#[derive(Debug)]
pub enum RoutePlanOutcome {
    Plan(ProviderCallPlan),
    NeedsClarify { reason: &'static str },
}

#[allow(clippy::too_many_arguments)]
pub async fn run_route_plan(
    model: &dyn StructuredModel,
    query: &str,
    intent: &IntentResult,
    filters: &FinalSharedFilters,
    user_location: Option<LatLng>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<RoutePlanOutcome, LlmError> {
    let user_prompt = format!(
        "Query: {query}\nRoute: {}\nCity: {}\nLandmark: {}\nCuisine: {}\nProvider language: {}\nRegion: {}",
        intent.route,
        intent.city_text.as_deref().unwrap_or("-"),
        intent.landmark_text.as_deref().unwrap_or("-"),
        intent.hybrid.cuisine_key.as_deref().unwrap_or("-"),
        filters.provider_language,
        filters.region_code,
    );

    let output = classify::<RoutePlanOutput>(
        model,
        STAGE,
        PROMPT_VERSION,
        SYSTEM_PROMPT.to_string(),
        user_prompt,
        schema_for::<RoutePlanOutput>(),
        timeout,
        cancel,
    )
    .await?;

    Ok(project(output, query, intent, filters, user_location))
}

fn project(
    output: RoutePlanOutput,
    query: &str,
    intent: &IntentResult,
    filters: &FinalSharedFilters,
    user_location: Option<LatLng>,
) -> RoutePlanOutcome {
    let keyword = output
        .keyword
        .filter(|k| !k.is_empty())
        .or_else(|| intent.hybrid.cuisine_key.clone())
        .unwrap_or_else(|| query.to_string());
    let radius = output.radius_meters.or(intent.radius_meters);

    let call = match output.route {
        SearchRoute::Textsearch => {
            let city_text = output
                .city_text
                .filter(|c| !c.is_empty())
                .or_else(|| intent.city_text.clone());
            let bias = match (output.use_location_bias, user_location) {
                (true, Some(center)) => Some(CircleBias {
                    center,
                    radius_m: radius.unwrap_or(TEXTSEARCH_BIAS_RADIUS_M),
                }),
                _ => None,
            };

            // Late anchor guard: a TEXTSEARCH plan with neither a city nor a
            // bias would fan out worldwide.
            let allowed = city_text.is_some() || bias.is_some();
            info!(
                route = %output.route,
                has_location = user_location.is_some(),
                allowed,
                "google_parallel_start_decision"
            );
            if !allowed {
                return RoutePlanOutcome::NeedsClarify {
                    reason: "textsearch_without_anchor",
                };
            }

            ProviderCall::TextSearch {
                text_query: output
                    .text_query
                    .filter(|q| !q.is_empty())
                    .unwrap_or_else(|| query.to_string()),
                bias,
                city_text,
            }
        }
        SearchRoute::Nearby => {
            let Some(center) = user_location else {
                info!(
                    route = %output.route,
                    has_location = false,
                    allowed = false,
                    "google_parallel_start_decision"
                );
                return RoutePlanOutcome::NeedsClarify {
                    reason: "nearby_without_location",
                };
            };
            info!(route = %output.route, has_location = true, allowed = true, "google_parallel_start_decision");
            ProviderCall::Nearby {
                center,
                radius_m: radius.unwrap_or(NEARBY_DEFAULT_RADIUS_M),
                keyword,
            }
        }
        SearchRoute::Landmark => {
            let geocode_query = output
                .geocode_query
                .filter(|g| !g.is_empty())
                .or_else(|| intent.landmark_text.clone());
            let Some(geocode_query) = geocode_query else {
                return RoutePlanOutcome::NeedsClarify {
                    reason: "landmark_without_name",
                };
            };
            info!(
                route = %output.route,
                has_location = user_location.is_some(),
                allowed = true,
                "google_parallel_start_decision"
            );
            ProviderCall::Landmark {
                geocode_query,
                radius_m: radius.unwrap_or(LANDMARK_DEFAULT_RADIUS_M),
                keyword,
            }
        }
    };

    RoutePlanOutcome::Plan(ProviderCallPlan {
        call,
        language: filters.provider_language,
        region: filters.region_code.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use platefinder_common::types::{
        Disclaimers, FilterSource, HybridFlags, QueryLanguage, UiLanguage,
    };

    fn filters() -> FinalSharedFilters {
        FinalSharedFilters {
            ui_language: UiLanguage::En,
            provider_language: QueryLanguage::En,
            region_code: "IL".to_string(),
            open_state: None,
            open_at: None,
            open_between: None,
            price_intent: None,
            price_levels: None,
            disclaimers: Disclaimers {
                hours: true,
                dietary: true,
            },
            language_source: FilterSource::Default,
            region_source: FilterSource::Default,
        }
    }

    fn intent(route: SearchRoute) -> IntentResult {
        IntentResult {
            route,
            confidence: 0.9,
            reason: String::new(),
            language: QueryLanguage::En,
            language_confidence: 0.9,
            region_candidate: None,
            region_confidence: 0.0,
            region_reason: String::new(),
            region_code: None,
            city_text: None,
            landmark_text: None,
            radius_meters: None,
            hybrid: HybridFlags::default(),
            clarify: None,
        }
    }

    fn output(route: SearchRoute) -> RoutePlanOutput {
        RoutePlanOutput {
            route,
            text_query: None,
            keyword: None,
            geocode_query: None,
            city_text: None,
            radius_meters: None,
            use_location_bias: false,
        }
    }

    #[test]
    fn textsearch_without_anchor_is_promoted_to_clarify() {
        let outcome = project(
            output(SearchRoute::Textsearch),
            "cheeseburger",
            &intent(SearchRoute::Textsearch),
            &filters(),
            None,
        );
        match outcome {
            RoutePlanOutcome::NeedsClarify { reason } => {
                assert_eq!(reason, "textsearch_without_anchor")
            }
            other => panic!("expected clarify, got {other:?}"),
        }
    }

    #[test]
    fn textsearch_with_city_passes() {
        let mut out = output(SearchRoute::Textsearch);
        out.city_text = Some("Haifa".to_string());
        out.text_query = Some("sushi in Haifa".to_string());
        let outcome = project(
            out,
            "sushi in haifa",
            &intent(SearchRoute::Textsearch),
            &filters(),
            None,
        );
        match outcome {
            RoutePlanOutcome::Plan(plan) => match plan.call {
                ProviderCall::TextSearch {
                    text_query,
                    city_text,
                    bias,
                } => {
                    assert_eq!(text_query, "sushi in Haifa");
                    assert_eq!(city_text.as_deref(), Some("Haifa"));
                    assert!(bias.is_none());
                }
                other => panic!("expected text search, got {other:?}"),
            },
            other => panic!("expected plan, got {other:?}"),
        }
    }

    #[test]
    fn textsearch_bias_counts_as_anchor() {
        let mut out = output(SearchRoute::Textsearch);
        out.use_location_bias = true;
        let location = LatLng {
            lat: 32.08,
            lng: 34.78,
        };
        let outcome = project(
            out,
            "cheeseburger",
            &intent(SearchRoute::Textsearch),
            &filters(),
            Some(location),
        );
        assert!(matches!(outcome, RoutePlanOutcome::Plan(_)));
    }

    #[test]
    fn nearby_defaults_radius_and_keyword() {
        let mut i = intent(SearchRoute::Nearby);
        i.hybrid.cuisine_key = Some("italian".to_string());
        let outcome = project(
            output(SearchRoute::Nearby),
            "italian near me",
            &i,
            &filters(),
            Some(LatLng {
                lat: 40.71,
                lng: -74.0,
            }),
        );
        match outcome {
            RoutePlanOutcome::Plan(plan) => match plan.call {
                ProviderCall::Nearby {
                    radius_m, keyword, ..
                } => {
                    assert_eq!(radius_m, NEARBY_DEFAULT_RADIUS_M);
                    assert_eq!(keyword, "italian");
                }
                other => panic!("expected nearby, got {other:?}"),
            },
            other => panic!("expected plan, got {other:?}"),
        }
    }

    #[test]
    fn landmark_falls_back_to_intent_text() {
        let mut i = intent(SearchRoute::Landmark);
        i.landmark_text = Some("Azrieli mall".to_string());
        let outcome = project(output(SearchRoute::Landmark), "food near azrieli", &i, &filters(), None);
        match outcome {
            RoutePlanOutcome::Plan(plan) => match plan.call {
                ProviderCall::Landmark { geocode_query, .. } => {
                    assert_eq!(geocode_query, "Azrieli mall")
                }
                other => panic!("expected landmark, got {other:?}"),
            },
            other => panic!("expected plan, got {other:?}"),
        }
    }
}

//! Intent: routes the query into TEXTSEARCH | NEARBY | LANDMARK and
//! extracts entities and hybrid flags. Ships a strict schema (every field
//! required, nullables explicit); the schema hash rides along on each call
//! for drift detection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ai_client::{schema_for, LlmError, StructuredModel};
use platefinder_common::cache::{CacheEntry, CacheManager};
use platefinder_common::normalize_for_key;
use platefinder_common::types::{IntentResult, QueryLanguage, SearchRoute};

use super::classify;

const STAGE: &str = "intent";
const PROMPT_VERSION: &str = "intent-v5";

const CONFIDENCE_FALLBACK_THRESHOLD: f64 = 0.7;

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are the intent router of a restaurant-search assistant. The user query \
language is {language}; report it back and do not guess another.

Choose exactly one route:
- TEXTSEARCH: the query names a city or area as free text (\"sushi in Haifa\").
- NEARBY: the query asks for places around the user (\"near me\", \"closest\").
- LANDMARK: the query anchors on a named place (\"near Azrieli mall\"). \
landmarkText must then be the landmark name, never null.

Also extract: cityText when a city is named; radiusMeters when a distance \
is stated; regionCandidate as an ISO-3166-1 alpha-2 code when the query \
implies a country; and the hybrid flags (distanceIntent, openNowRequested, \
priceIntent any|cheap|mid|expensive, qualityIntent, occasion, cuisineKey as \
a lowercase English cuisine keyword). Set clarify only when the query \
cannot be routed without one more answer.

The hybrid flags are language-agnostic: the same query in Hebrew, Russian, \
or English must produce the same flags.

Examples:
- \"cheap italian near me\" → NEARBY, distanceIntent true, priceIntent \
cheap, cuisineKey \"italian\"
- \"איטלקי זול קרוב אליי\" → the same as above, language he
- \"sushi in Haifa\" → TEXTSEARCH, cityText \"Haifa\", cuisineKey \"sushi\"
- \"открыто сейчас возле Азриэли\" → LANDMARK, landmarkText \"Azrieli\", \
openNowRequested true
- \"best steakhouse for an anniversary\" → qualityIntent true, occasion \
\"anniversary\", cuisineKey \"steak\"";

/// Multilingual token → canonical cuisine, used when the model's canonical
/// category is empty or weakly confident.
const CUISINE_FALLBACK: &[(&str, &str)] = &[
    // Hebrew
    ("בשרי", "meat restaurant"),
    ("בשרית", "meat restaurant"),
    ("חלבי", "dairy restaurant"),
    ("חלבית", "dairy restaurant"),
    ("חומוס", "hummus"),
    ("צמחוני", "vegetarian"),
    ("צמחונית", "vegetarian"),
    ("סושי", "sushi"),
    ("פיצה", "pizza"),
    // Russian
    ("мясной", "meat restaurant"),
    ("молочный", "dairy restaurant"),
    ("хумус", "hummus"),
    ("вегетарианский", "vegetarian"),
    ("суши", "sushi"),
    ("пицца", "pizza"),
    // English
    ("meat", "meat restaurant"),
    ("dairy", "dairy restaurant"),
    ("hummus", "hummus"),
    ("vegetarian", "vegetarian"),
    ("sushi", "sushi"),
    ("pizza", "pizza"),
];

fn fallback_cuisine(query: &str) -> Option<&'static str> {
    let lowered = query.to_lowercase();
    for token in lowered.split_whitespace() {
        if let Some((_, canonical)) = CUISINE_FALLBACK.iter().find(|(t, _)| *t == token) {
            return Some(canonical);
        }
    }
    None
}

pub struct IntentOptions {
    pub timeout: Duration,
    /// Off by default: multi-turn context keying is intentionally excluded.
    pub memoize: bool,
    pub memo_ttl: Duration,
}

pub async fn run_intent(
    model: &dyn StructuredModel,
    cache: &CacheManager,
    query: &str,
    pinned_language: QueryLanguage,
    options: &IntentOptions,
    cancel: &CancellationToken,
) -> Result<IntentResult, LlmError> {
    let memo_key = format!("intent:{}:{}", normalize_for_key(query), pinned_language);

    if options.memoize {
        if let Some(entry) = cache.get::<IntentResult>(&memo_key).await {
            debug!(key = %memo_key, "Intent memo hit");
            return Ok(entry.value);
        }
    }

    let system_prompt =
        SYSTEM_PROMPT_TEMPLATE.replace("{language}", pinned_language.code());

    let mut result = classify::<IntentResult>(
        model,
        STAGE,
        PROMPT_VERSION,
        system_prompt,
        query.to_string(),
        schema_for::<IntentResult>(),
        options.timeout,
        cancel,
    )
    .await?;

    // Route invariant from the schema contract, enforced after parse.
    if result.route == SearchRoute::Landmark
        && result.landmark_text.as_deref().map_or(true, str::is_empty)
    {
        return Err(LlmError::SchemaInvalid(
            "LANDMARK route with null landmarkText".to_string(),
        ));
    }

    apply_deterministic_fallback(&mut result, query);

    if options.memoize {
        cache
            .put(&memo_key, &CacheEntry::found(result.clone()), options.memo_ttl)
            .await;
    }

    Ok(result)
}

/// Substitute the canonical category from the fixed token map when the
/// model's answer is empty or weakly confident.
fn apply_deterministic_fallback(result: &mut IntentResult, query: &str) {
    let canonical_empty = result
        .hybrid
        .cuisine_key
        .as_deref()
        .map_or(true, str::is_empty);

    if canonical_empty || result.confidence < CONFIDENCE_FALLBACK_THRESHOLD {
        if let Some(canonical) = fallback_cuisine(query) {
            info!(
                canonical,
                confidence = result.confidence,
                "Intent cuisine fallback applied"
            );
            result.hybrid.cuisine_key = Some(canonical.to_string());
        }
    }
}

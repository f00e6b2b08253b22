//! Canonical-to-provider query normalization.
//!
//! Two compiled tables: canonical → provider-preferred phrasing, and a
//! non-Latin recovery table (Hebrew/Russian token → English canonical). The
//! provider only ever sees Latin text; anything unrecoverable falls back to
//! plain `restaurant`. Normalization is idempotent.

use tracing::{info, warn};

const DEFAULT_QUERY: &str = "restaurant";

/// Canonical category → the phrasing the provider matches best.
const CANONICAL_TO_PROVIDER: &[(&str, &str)] = &[
    ("meat restaurant", "steakhouse"),
    ("dairy restaurant", "dairy cafe"),
    ("fish restaurant", "seafood restaurant"),
    ("hummus", "hummus restaurant"),
    ("vegetarian", "vegetarian restaurant"),
    ("coffee", "cafe"),
    ("burger", "hamburger restaurant"),
];

/// Non-Latin token → English canonical, for recovery when a non-Latin
/// canonical slips through the intent stage.
const RECOVERY_TABLE: &[(&str, &str)] = &[
    // Hebrew
    ("סושי", "sushi"),
    ("פיצה", "pizza"),
    ("המבורגר", "burger"),
    ("חומוס", "hummus"),
    ("בשרי", "meat restaurant"),
    ("בשרית", "meat restaurant"),
    ("חלבי", "dairy restaurant"),
    ("דגים", "fish restaurant"),
    ("צמחוני", "vegetarian"),
    ("קפה", "coffee"),
    ("מסעדה", "restaurant"),
    // Russian
    ("суши", "sushi"),
    ("пицца", "pizza"),
    ("бургер", "burger"),
    ("хумус", "hummus"),
    ("мясной", "meat restaurant"),
    ("молочный", "dairy restaurant"),
    ("вегетарианский", "vegetarian"),
    ("кофе", "coffee"),
    ("ресторан", "restaurant"),
];

fn is_latin_only(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii() || matches!(c as u32, 0x00C0..=0x024F))
}

fn recover(canonical: &str) -> Option<&'static str> {
    // Whole-string match first, then first matching token.
    if let Some((_, english)) = RECOVERY_TABLE.iter().find(|(t, _)| *t == canonical) {
        info!(match_type = "exact", canonical, "normalizer_recovery");
        return Some(english);
    }
    for token in canonical.split_whitespace() {
        if let Some((_, english)) = RECOVERY_TABLE.iter().find(|(t, _)| *t == token) {
            info!(match_type = "token", canonical, token, "normalizer_recovery");
            return Some(english);
        }
    }
    None
}

/// Normalize a canonical category into the provider query.
pub fn normalize_to_provider_query(canonical: &str) -> String {
    let trimmed = canonical.trim().to_lowercase();

    if trimmed.is_empty() {
        return DEFAULT_QUERY.to_string();
    }

    if let Some((_, mapped)) = CANONICAL_TO_PROVIDER.iter().find(|(c, _)| *c == trimmed) {
        return mapped.to_string();
    }

    if is_latin_only(&trimmed) {
        return trimmed;
    }

    // Non-Latin canonical: recover, then re-normalize the recovered value.
    match recover(&trimmed) {
        Some(english) => normalize_to_provider_query(english),
        None => {
            warn!(canonical = %trimmed, "normalizer_recovery_failed");
            DEFAULT_QUERY.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_falls_back_to_restaurant() {
        assert_eq!(normalize_to_provider_query(""), "restaurant");
        assert_eq!(normalize_to_provider_query("   "), "restaurant");
    }

    #[test]
    fn table_match_maps() {
        assert_eq!(normalize_to_provider_query("meat restaurant"), "steakhouse");
        assert_eq!(normalize_to_provider_query("Meat Restaurant"), "steakhouse");
    }

    #[test]
    fn latin_passthrough() {
        assert_eq!(normalize_to_provider_query("thai"), "thai");
        assert_eq!(normalize_to_provider_query("sushi"), "sushi");
    }

    #[test]
    fn hebrew_recovers_exactly() {
        assert_eq!(normalize_to_provider_query("סושי"), "sushi");
    }

    #[test]
    fn russian_recovers_through_canonical_table() {
        // "мясной" → "meat restaurant" → "steakhouse"
        assert_eq!(normalize_to_provider_query("мясной"), "steakhouse");
    }

    #[test]
    fn token_level_recovery() {
        assert_eq!(normalize_to_provider_query("מסעדת סושי טובה"), "sushi");
    }

    #[test]
    fn unrecoverable_falls_back() {
        assert_eq!(normalize_to_provider_query("مأكولات"), "restaurant");
    }

    #[test]
    fn idempotent_over_table_and_recovery() {
        for input in ["meat restaurant", "סושי", "pizza", "", "мясной", "قهوة"] {
            let once = normalize_to_provider_query(input);
            let twice = normalize_to_provider_query(&once);
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn never_returns_non_latin() {
        for input in ["סושי", "мясной", "مطعم", "חלבי", "ресторан"] {
            let out = normalize_to_provider_query(input);
            assert!(is_latin_only(&out), "non-latin output {out} for {input}");
        }
    }
}

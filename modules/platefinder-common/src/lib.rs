pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod language;
pub mod protocol;
pub mod region;
pub mod retry;
pub mod types;

pub use cache::{CacheEntry, CacheManager, CacheStatus, MemoryStore, RedisStore};
pub use config::Config;
pub use error::PlatefinderError;
pub use language::detect_language;
pub use region::sanitize_region_code;
pub use types::*;

/// Normalize a free-text query for use inside a cache key: lowercase,
/// collapse whitespace to single spaces, trim.
///
/// ```
/// assert_eq!(platefinder_common::normalize_for_key("  Cheap   Sushi "), "cheap sushi");
/// assert_eq!(platefinder_common::normalize_for_key("PIZZA"), "pizza");
/// ```
pub fn normalize_for_key(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Normalize a name into a URL-safe slug: lowercase, strip non-alphanumeric
/// (keeping spaces), collapse whitespace, replace spaces with hyphens.
///
/// ```
/// assert_eq!(platefinder_common::slugify("Tel Aviv"), "tel-aviv");
/// assert_eq!(platefinder_common::slugify("Be'er Sheva"), "be-er-sheva");
/// assert_eq!(platefinder_common::slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}

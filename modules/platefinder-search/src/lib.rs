pub mod city_filter;
pub mod context;
pub mod deps;
pub mod failure;
pub mod filters;
pub mod messages;
pub mod normalize;
pub mod orchestrator;
pub mod post_filter;
pub mod rank;
pub mod stages;

pub use context::RequestContext;
pub use deps::{Geocoder, PlacesProvider, SearchDeps};
pub use orchestrator::{Orchestrator, SearchSettings};

/// Stamped into every response's meta for cross-version debugging.
pub const PIPELINE_VERSION: &str = "search-pipeline/2.4";

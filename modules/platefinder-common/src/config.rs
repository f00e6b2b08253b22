use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Per-stage deadlines. Read once at startup; every stage call receives its
/// own budget and the orchestrator owns the total.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub gate: Duration,
    pub intent: Duration,
    pub route_llm: Duration,
    pub post_constraints: Duration,
    pub geocoding: Duration,
    pub provider: Duration,
    pub total: Duration,
    pub websearch_attempt: Duration,
    pub enrichment_job: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            gate: Duration::from_secs(5),
            intent: Duration::from_secs(8),
            route_llm: Duration::from_secs(6),
            post_constraints: Duration::from_secs(5),
            geocoding: Duration::from_secs(3),
            provider: Duration::from_secs(5),
            total: Duration::from_secs(15),
            websearch_attempt: Duration::from_secs(20),
            enrichment_job: Duration::from_secs(30),
        }
    }
}

/// Cache TTLs, status-differentiated where the namespace calls for it.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub geocoding: Duration,
    pub places_static: Duration,
    pub places_live: Duration,
    pub ranking: Duration,
    pub intent: Duration,
    pub provider_found: Duration,
    pub provider_not_found: Duration,
    pub provider_lock: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            geocoding: Duration::from_secs(24 * 3600),
            places_static: Duration::from_secs(3600),
            places_live: Duration::from_secs(300),
            ranking: Duration::from_secs(15 * 60),
            intent: Duration::from_secs(10 * 60),
            provider_found: Duration::from_secs(7 * 24 * 3600),
            provider_not_found: Duration::from_secs(24 * 3600),
            provider_lock: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheCapacities {
    pub geocoding: usize,
    pub places: usize,
    pub ranking: usize,
    pub intent: usize,
}

impl Default for CacheCapacities {
    fn default() -> Self {
        Self {
            geocoding: 500,
            places: 1000,
            ranking: 500,
            intent: 200,
        }
    }
}

impl CacheCapacities {
    /// Namespace → capacity map for the in-process store.
    pub fn as_map(&self) -> HashMap<String, usize> {
        HashMap::from([
            ("geo".to_string(), self.geocoding),
            ("places".to_string(), self.places),
            ("rank".to_string(), self.ranking),
            ("intent".to_string(), self.intent),
        ])
    }
}

/// Deep-link enrichment feature flags, one per delivery provider.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentFlags {
    pub wolt: bool,
    pub tenbis: bool,
    pub mishloha: bool,
}

impl Default for EnrichmentFlags {
    fn default() -> Self {
        Self {
            wolt: true,
            tenbis: true,
            mishloha: true,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Model providers (at least one required)
    pub openai_api_key: String,
    pub anthropic_api_key: String,

    // Places + geocoding
    pub places_api_key: String,

    // Web search (optional; resolver degrades to NOT_FOUND without one)
    pub brave_search_api_key: String,
    pub google_cse_key: String,
    pub google_cse_cx: String,

    // Shared cache (optional)
    pub redis_url: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Session layer
    pub ws_require_auth: bool,
    pub ws_heartbeat: Duration,
    pub ws_idle_timeout: Duration,
    /// Allowed WebSocket origins. Empty means any origin (dev).
    pub ws_allowed_origins: Vec<String>,

    // Pipeline knobs
    pub timeouts: StageTimeouts,
    pub cache_ttls: CacheTtls,
    pub cache_capacities: CacheCapacities,
    pub enrichment: EnrichmentFlags,
    pub strict_city_filter: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            places_api_key: required_env("PLACES_API_KEY"),
            brave_search_api_key: env::var("BRAVE_SEARCH_API_KEY").unwrap_or_default(),
            google_cse_key: env::var("GOOGLE_CSE_KEY").unwrap_or_default(),
            google_cse_cx: env::var("GOOGLE_CSE_CX").unwrap_or_default(),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            ws_require_auth: env_bool("WS_REQUIRE_AUTH", true),
            ws_heartbeat: env_secs("WS_HEARTBEAT_SECS", 30),
            ws_idle_timeout: env_secs("WS_IDLE_TIMEOUT_SECS", 300),
            ws_allowed_origins: env::var("WS_ALLOWED_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            timeouts: StageTimeouts {
                gate: env_secs("GATE_TIMEOUT_SECS", 5),
                intent: env_secs("INTENT_TIMEOUT_SECS", 8),
                route_llm: env_secs("ROUTE_LLM_TIMEOUT_SECS", 6),
                post_constraints: env_secs("POST_CONSTRAINTS_TIMEOUT_SECS", 5),
                geocoding: env_secs("GEOCODING_TIMEOUT_SECS", 3),
                provider: env_secs("PROVIDER_TIMEOUT_SECS", 5),
                total: env_secs("TOTAL_TIMEOUT_SECS", 15),
                websearch_attempt: env_secs("WEBSEARCH_ATTEMPT_TIMEOUT_SECS", 20),
                enrichment_job: env_secs("ENRICHMENT_JOB_TIMEOUT_SECS", 30),
            },
            cache_ttls: CacheTtls::default(),
            cache_capacities: CacheCapacities {
                geocoding: env_usize("GEO_CACHE_CAPACITY", 500),
                places: env_usize("PLACES_CACHE_CAPACITY", 1000),
                ranking: env_usize("RANK_CACHE_CAPACITY", 500),
                intent: env_usize("INTENT_CACHE_CAPACITY", 200),
            },
            enrichment: EnrichmentFlags {
                wolt: env_bool("ENABLE_WOLT_ENRICHMENT", true),
                tenbis: env_bool("ENABLE_TENBIS_ENRICHMENT", true),
                mishloha: env_bool("ENABLE_MISHLOHA_ENRICHMENT", true),
            },
            strict_city_filter: env_bool("STRICT_CITY_FILTER", false),
        }
    }

    /// Log the presence of each sensitive env var without its contents.
    pub fn log_redacted(&self) {
        let vars = [
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("PLACES_API_KEY", &self.places_api_key),
            ("BRAVE_SEARCH_API_KEY", &self.brave_search_api_key),
            ("GOOGLE_CSE_KEY", &self.google_cse_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        match &self.redis_url {
            Some(url) => tracing::info!("REDIS_URL = ({} chars)", url.len()),
            None => tracing::info!("REDIS_URL = (unset, using in-process cache)"),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Per-provider host and path allowlists. Adding a provider means adding a
//! rules entry here and nothing else.

use platefinder_common::types::DeliveryProvider;

pub struct ProviderRules {
    pub provider: DeliveryProvider,
    /// Exact hosts or wildcard-suffix patterns (`*.wolt.com`).
    pub hosts: &'static [&'static str],
    /// A candidate path must contain at least one of these segments.
    pub path_segments: &'static [&'static str],
    /// The host used in the `site:` search operator.
    pub site_host: &'static str,
    /// Wolt URLs carry a city slug; candidates containing it win selection.
    pub prefers_city_slug: bool,
}

const WOLT: ProviderRules = ProviderRules {
    provider: DeliveryProvider::Wolt,
    hosts: &["wolt.com", "*.wolt.com"],
    path_segments: &["/restaurant/"],
    site_host: "wolt.com",
    prefers_city_slug: true,
};

const TENBIS: ProviderRules = ProviderRules {
    provider: DeliveryProvider::Tenbis,
    hosts: &["10bis.co.il", "*.10bis.co.il"],
    path_segments: &["/next/"],
    site_host: "10bis.co.il",
    prefers_city_slug: false,
};

const MISHLOHA: ProviderRules = ProviderRules {
    provider: DeliveryProvider::Mishloha,
    hosts: &["mishloha.co.il", "*.mishloha.co.il"],
    path_segments: &["/now/r/"],
    site_host: "mishloha.co.il",
    prefers_city_slug: false,
};

pub fn provider_rules(provider: DeliveryProvider) -> &'static ProviderRules {
    match provider {
        DeliveryProvider::Wolt => &WOLT,
        DeliveryProvider::Tenbis => &TENBIS,
        DeliveryProvider::Mishloha => &MISHLOHA,
    }
}

fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => {
            host.ends_with(suffix) && host.len() > suffix.len() && {
                let boundary = host.len() - suffix.len();
                host.as_bytes()[boundary - 1] == b'.'
            }
        }
        None => host == pattern,
    }
}

impl ProviderRules {
    /// The verified-deep-link check: https, allowlisted host, required path
    /// segment. Anything else — search pages, home pages, lookalike hosts —
    /// is rejected.
    pub fn validate_url(&self, raw: &str) -> bool {
        let Ok(parsed) = url::Url::parse(raw) else {
            return false;
        };
        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if !self.hosts.iter().any(|p| host_matches(p, host)) {
            return false;
        }
        let path = parsed.path();
        self.path_segments.iter().any(|s| path.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wolt_restaurant_url_passes() {
        let rules = provider_rules(DeliveryProvider::Wolt);
        assert!(rules.validate_url("https://wolt.com/en/isr/tel-aviv/restaurant/pizza-joe"));
        assert!(rules.validate_url("https://wolt.com/he/isr/haifa/restaurant/abu-hasan"));
    }

    #[test]
    fn wolt_search_url_is_rejected() {
        let rules = provider_rules(DeliveryProvider::Wolt);
        assert!(!rules.validate_url("https://wolt.com/search?q=pizza-joe"));
        assert!(!rules.validate_url("https://wolt.com/"));
    }

    #[test]
    fn lookalike_hosts_are_rejected() {
        let rules = provider_rules(DeliveryProvider::Wolt);
        assert!(!rules.validate_url("https://notwolt.com/restaurant/x"));
        assert!(!rules.validate_url("https://wolt.com.evil.io/restaurant/x"));
    }

    #[test]
    fn wildcard_subdomains_pass() {
        let rules = provider_rules(DeliveryProvider::Wolt);
        assert!(rules.validate_url("https://www.wolt.com/en/isr/tlv/restaurant/x"));
    }

    #[test]
    fn tenbis_and_mishloha_segments() {
        let tenbis = provider_rules(DeliveryProvider::Tenbis);
        assert!(tenbis.validate_url("https://www.10bis.co.il/next/restaurants/menu/delivery/123"));
        assert!(!tenbis.validate_url("https://www.10bis.co.il/about"));

        let mishloha = provider_rules(DeliveryProvider::Mishloha);
        assert!(mishloha.validate_url("https://www.mishloha.co.il/now/r/pizza-joe"));
        assert!(!mishloha.validate_url("https://www.mishloha.co.il/now/"));
    }

    #[test]
    fn garbage_is_rejected() {
        let rules = provider_rules(DeliveryProvider::Wolt);
        assert!(!rules.validate_url("not a url"));
        assert!(!rules.validate_url("ftp://wolt.com/restaurant/x"));
    }
}

//! Effective access policy.
//!
//! The operator's [`PolicyConfig`] is kept as written inside a [`SharedPolicy`]
//! and turned into a typed [`AccessPolicy`] each time a request asks for it, so
//! a reload is visible to the very next request without any invalidation step.

use std::collections::HashSet;
use std::net::IpAddr;

use arc_swap::ArcSwap;

use crate::config::schema::PolicyConfig;
use crate::security::origin::OriginPattern;

/// Sanitized, immutable view of the policy for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPolicy {
    /// Parsed allow-list entries.
    pub allow_ips: HashSet<IpAddr>,
    /// Set when the operator listed any address. A restricted policy whose
    /// `allow_ips` ended up empty admits nobody.
    pub restrict_ips: bool,
    pub allow_user_ids: HashSet<u64>,
    pub allow_caps: Vec<String>,
    pub allow_bearer: bool,
    pub cors_enabled: bool,
    pub allowed_origins: Vec<OriginPattern>,
    /// Zero disables rate limiting.
    pub rate_limit_threshold: u64,
    /// Window length in seconds. Zero disables rate limiting.
    pub rate_limit_window: u64,
    /// Zero disables snapshot caching.
    pub cache_ttl: u64,
    pub expose_updates: bool,
    pub expose_database_version: bool,
    pub required_capability: String,
    pub signature_skew_secs: u64,
}

impl AccessPolicy {
    /// Apply every default and sanitization rule to the raw configuration.
    pub fn from_config(raw: &PolicyConfig) -> Self {
        let mut seen_origins = HashSet::new();
        let allowed_origins = raw
            .allowed_origins
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .filter(|o| seen_origins.insert(o.to_ascii_lowercase()))
            .filter_map(|o| OriginPattern::parse(o).ok())
            .collect();

        let mut seen_caps = HashSet::new();
        let allow_caps = raw
            .allow_caps
            .iter()
            .map(|c| sanitize_capability(c))
            .filter(|c| !c.is_empty())
            .filter(|c| seen_caps.insert(c.clone()))
            .collect();

        let listed_ips: Vec<&str> = raw
            .allow_ips
            .iter()
            .map(|ip| ip.trim())
            .filter(|ip| !ip.is_empty())
            .collect();
        let allow_ips: HashSet<IpAddr> = listed_ips
            .iter()
            .filter_map(|ip| ip.parse::<IpAddr>().ok())
            .map(|ip| ip.to_canonical())
            .collect();
        let restrict_ips = !listed_ips.is_empty();

        let allow_user_ids = raw
            .allow_user_ids
            .iter()
            .filter(|id| **id > 0)
            .map(|id| *id as u64)
            .collect();

        let required_capability = match sanitize_capability(&raw.required_capability) {
            cap if cap.is_empty() => PolicyConfig::default().required_capability,
            cap => cap,
        };

        Self {
            allow_ips,
            restrict_ips,
            allow_user_ids,
            allow_caps,
            allow_bearer: raw.allow_bearer,
            cors_enabled: raw.cors_enabled,
            allowed_origins,
            rate_limit_threshold: non_negative(raw.rate_limit_threshold),
            rate_limit_window: non_negative(raw.rate_limit_window),
            cache_ttl: non_negative(raw.cache_ttl),
            expose_updates: raw.expose_updates,
            expose_database_version: raw.expose_database_version,
            required_capability,
            signature_skew_secs: non_negative(raw.signature_skew_secs).max(1),
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Lowercase and keep only `[a-z0-9_-]`.
pub fn sanitize_capability(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Host-side configuration store the pipeline reads on every request.
pub trait PolicySource: Send + Sync {
    /// Current effective policy.
    fn policy(&self) -> AccessPolicy;
}

/// Hot-swappable policy backed by the loaded config file.
#[derive(Debug)]
pub struct SharedPolicy {
    raw: ArcSwap<PolicyConfig>,
}

impl SharedPolicy {
    pub fn new(raw: PolicyConfig) -> Self {
        Self {
            raw: ArcSwap::from_pointee(raw),
        }
    }

    /// Atomically replace the policy seen by subsequent requests.
    pub fn replace(&self, raw: PolicyConfig) {
        self.raw.store(std::sync::Arc::new(raw));
    }
}

impl PolicySource for SharedPolicy {
    fn policy(&self) -> AccessPolicy {
        AccessPolicy::from_config(&self.raw.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = AccessPolicy::default();
        assert!(policy.allow_ips.is_empty());
        assert!(!policy.restrict_ips);
        assert_eq!(policy.rate_limit_threshold, 60);
        assert_eq!(policy.rate_limit_window, 60);
        assert_eq!(policy.cache_ttl, 300);
        assert_eq!(policy.required_capability, "manage_options");
        assert_eq!(policy.signature_skew_secs, 300);
    }

    #[test]
    fn test_sanitization() {
        let raw = PolicyConfig {
            allowed_origins: vec![
                " https://a.example.com ".into(),
                "HTTPS://A.EXAMPLE.COM".into(),
                "".into(),
                "*.example.org".into(),
            ],
            allow_caps: vec!["View Site_Health".into(), "viewsite_health".into(), "!!".into()],
            allow_user_ids: vec![0, -4, 42, 42, 7],
            allow_ips: vec!["127.0.0.1".into(), "not-an-ip".into(), " ::1 ".into()],
            cache_ttl: -5,
            rate_limit_threshold: -1,
            required_capability: "   ".into(),
            ..PolicyConfig::default()
        };
        let policy = AccessPolicy::from_config(&raw);

        assert_eq!(policy.allowed_origins.len(), 2);
        assert_eq!(policy.allow_caps, vec!["viewsite_health".to_string()]);
        assert_eq!(policy.allow_user_ids, HashSet::from([42, 7]));
        assert_eq!(policy.allow_ips.len(), 2);
        assert!(policy.restrict_ips);
        assert_eq!(policy.cache_ttl, 0);
        assert_eq!(policy.rate_limit_threshold, 0);
        assert_eq!(policy.required_capability, "manage_options");
    }

    #[test]
    fn test_unparseable_allow_list_stays_restricted() {
        let policy = AccessPolicy::from_config(&PolicyConfig {
            allow_ips: vec!["192.0.2.0/24".into(), "localhost".into()],
            ..PolicyConfig::default()
        });
        assert!(policy.allow_ips.is_empty());
        assert!(policy.restrict_ips);

        let blank = AccessPolicy::from_config(&PolicyConfig {
            allow_ips: vec!["  ".into()],
            ..PolicyConfig::default()
        });
        assert!(!blank.restrict_ips);
    }

    #[test]
    fn test_shared_policy_replace_is_visible() {
        let shared = SharedPolicy::new(PolicyConfig::default());
        assert!(!shared.policy().allow_bearer);

        shared.replace(PolicyConfig {
            allow_bearer: true,
            ..PolicyConfig::default()
        });
        assert!(shared.policy().allow_bearer);
    }
}

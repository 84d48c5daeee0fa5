//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the connector.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the snapshot service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// API namespace and request handling.
    pub api: ApiConfig,

    /// Access policy as the operator wrote it. Sanitized per request.
    pub policy: PolicyConfig,

    /// Identities recognised by the built-in token resolver.
    pub identities: Vec<IdentityConfig>,

    /// Snapshot source settings.
    pub snapshot: SnapshotConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Take the client IP from the first `X-Forwarded-For` entry.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            trust_forwarded_for: false,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Route namespace and per-request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Path prefix both snapshot routes live under. No trailing slash.
    pub namespace: String,

    /// Total time allowed for a request in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            namespace: "/wp-json/pcc/v1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Operator-facing access policy. Loosely typed on purpose: it is turned into
/// an [`AccessPolicy`](crate::config::AccessPolicy) on every request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub cors_enabled: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_threshold: i64,
    pub rate_limit_window: i64,
    pub cache_ttl: i64,
    pub expose_updates: bool,
    pub expose_database_version: bool,
    pub allow_caps: Vec<String>,
    pub allow_user_ids: Vec<i64>,
    pub allow_ips: Vec<String>,
    pub allow_bearer: bool,

    /// Capability that grants read access on its own.
    pub required_capability: String,

    /// Tolerated clock difference for signed requests in seconds.
    pub signature_skew_secs: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cors_enabled: false,
            allowed_origins: Vec::new(),
            rate_limit_threshold: 60,
            rate_limit_window: 60,
            cache_ttl: 300,
            expose_updates: false,
            expose_database_version: true,
            allow_caps: Vec::new(),
            allow_user_ids: Vec::new(),
            allow_ips: Vec::new(),
            allow_bearer: false,
            required_capability: "manage_options".to_string(),
            signature_skew_secs: 300,
        }
    }
}

/// An identity known to the built-in token resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Numeric user id (must be positive).
    pub id: u64,

    /// Display name, used only in logs.
    #[serde(default)]
    pub name: String,

    /// Access token presented by the caller.
    pub token: String,

    /// Capabilities held by this identity.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Snapshot source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Site manifest read by the built-in producer (TOML or JSON).
    pub manifest_path: String,

    /// Interval between sweeps of expired cache and rate-limit entries.
    pub sweep_interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            manifest_path: "site-manifest.toml".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.api.namespace, "/wp-json/pcc/v1");
        assert_eq!(config.policy.rate_limit_threshold, 60);
        assert_eq!(config.policy.cache_ttl, 300);
        assert!(!config.policy.allow_bearer);
        assert!(config.policy.expose_database_version);
        assert!(config.identities.is_empty());
    }

    #[test]
    fn test_partial_policy_section() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [policy]
            cors_enabled = true
            allowed_origins = ["https://app.example.com"]

            [[identities]]
            id = 1
            token = "t0ken"
            capabilities = ["manage_options"]
            "#,
        )
        .unwrap();
        assert!(config.policy.cors_enabled);
        assert_eq!(config.policy.rate_limit_window, 60);
        assert_eq!(config.identities.len(), 1);
        assert_eq!(config.identities[0].name, "");
    }
}

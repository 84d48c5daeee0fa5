//! HMAC credential resolution.
//!
//! Secrets live only in the process environment. Nothing here writes them
//! anywhere, and [`Secret`] never prints its contents.

use std::collections::HashMap;
use std::fmt;

/// Opaque shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Resolves a key id to its shared secret.
pub trait CredentialProvider: Send + Sync {
    /// Exact-match lookup. Empty secrets count as absent.
    fn resolve(&self, key_id: &str) -> Option<Secret>;
}

/// Name of the env var holding a JSON object of `key_id -> secret`.
pub const KEYS_JSON_VAR: &str = "PCC_HMAC_KEYS_JSON";

/// Prefix of per-key env vars, e.g. `PCC_HMAC_KEY_ci_bot`.
pub const KEY_VAR_PREFIX: &str = "PCC_HMAC_KEY_";

/// Reads credentials from the process environment at lookup time.
///
/// Resolution order:
/// 1. `PCC_HMAC_KEYS_JSON`, a JSON object mapping key ids to secrets
/// 2. `PCC_HMAC_KEY_<key_id>`, with every character outside `[A-Za-z0-9_]`
///    in the key id replaced by `_`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn var_name(key_id: &str) -> String {
        let sanitized: String = key_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{KEY_VAR_PREFIX}{sanitized}")
    }
}

impl CredentialProvider for EnvCredentials {
    fn resolve(&self, key_id: &str) -> Option<Secret> {
        if let Ok(json) = std::env::var(KEYS_JSON_VAR) {
            match serde_json::from_str::<HashMap<String, String>>(&json) {
                Ok(map) => {
                    if let Some(secret) = map.get(key_id).filter(|s| !s.is_empty()) {
                        return Some(Secret::new(secret.as_bytes()));
                    }
                }
                Err(e) => {
                    tracing::warn!(var = KEYS_JSON_VAR, error = %e, "Ignoring malformed HMAC key map");
                }
            }
        }

        std::env::var(Self::var_name(key_id))
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| Secret::new(s.into_bytes()))
    }
}

/// Fixed in-memory credentials, handy for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    keys: HashMap<String, Secret>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.keys.insert(key_id.into(), Secret::new(secret));
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn resolve(&self, key_id: &str) -> Option<Secret> {
        self.keys.get(key_id).filter(|s| !s.is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn test_static_lookup_is_exact() {
        let creds = StaticCredentials::new()
            .with_key("ci", "s3cret")
            .with_key("empty", "");
        assert_eq!(creds.resolve("ci").unwrap().expose(), b"s3cret");
        assert!(creds.resolve("CI").is_none());
        assert!(creds.resolve("empty").is_none());
        assert!(creds.resolve("missing").is_none());
    }

    #[test]
    fn test_env_var_name_sanitized() {
        assert_eq!(EnvCredentials::var_name("ci-bot.v2"), "PCC_HMAC_KEY_ci_bot_v2");
        assert_eq!(EnvCredentials::var_name("key_AbC123"), "PCC_HMAC_KEY_key_AbC123");
    }

    #[test]
    fn test_env_resolution_order() {
        // Key ids are unique to this test so parallel tests do not collide.
        std::env::set_var(
            KEYS_JSON_VAR,
            r#"{"envtest_json":"from-json","envtest_both":"json-wins"}"#,
        );
        std::env::set_var(EnvCredentials::var_name("envtest_single"), "from-var");
        std::env::set_var(EnvCredentials::var_name("envtest_both"), "var-loses");

        let creds = EnvCredentials;
        assert_eq!(creds.resolve("envtest_json").unwrap().expose(), b"from-json");
        assert_eq!(creds.resolve("envtest_single").unwrap().expose(), b"from-var");
        assert_eq!(creds.resolve("envtest_both").unwrap().expose(), b"json-wins");
        assert!(creds.resolve("envtest_absent").is_none());
    }
}

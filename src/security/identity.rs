//! Caller identity as supplied by the host.
//!
//! The pipeline never authenticates anyone itself. It asks an
//! [`IdentityResolver`] who is calling and then only inspects the result
//! through [`IdentityContext`].

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use crate::config::schema::IdentityConfig;

/// Header carrying an application token as an alternative to `Authorization`.
pub const API_TOKEN_HEADER: &str = "x-api-token";

/// An authenticated caller.
pub trait IdentityContext: Send + Sync {
    /// Numeric user id, if the identity system has one.
    fn id(&self) -> Option<u64>;

    fn has_capability(&self, name: &str) -> bool;
}

/// Looks up the caller for a request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Option<Arc<dyn IdentityContext>>;
}

/// Whether the request carries `Authorization: Bearer ...`.
pub fn presents_bearer(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.get(..7))
        .map(|scheme| scheme.eq_ignore_ascii_case("bearer "))
        .unwrap_or(false)
}

/// A user from the static identity table.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    pub id: u64,
    pub name: String,
    capabilities: HashSet<String>,
}

impl StaticIdentity {
    pub fn new<I, S>(id: u64, name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

impl IdentityContext for StaticIdentity {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn has_capability(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }
}

struct TokenEntry {
    token: Vec<u8>,
    identity: Arc<StaticIdentity>,
}

/// Resolves callers from tokens configured in `[[identities]]`.
///
/// Accepts `Authorization: Bearer <token>` or `X-Api-Token: <token>`.
/// The table can be swapped on config reload.
pub struct StaticIdentityResolver {
    entries: ArcSwap<Vec<TokenEntry>>,
}

impl StaticIdentityResolver {
    pub fn new(identities: &[IdentityConfig]) -> Self {
        Self {
            entries: ArcSwap::from_pointee(Self::table(identities)),
        }
    }

    pub fn replace(&self, identities: &[IdentityConfig]) {
        self.entries.store(Arc::new(Self::table(identities)));
    }

    fn table(identities: &[IdentityConfig]) -> Vec<TokenEntry> {
        identities
            .iter()
            .filter(|i| !i.token.is_empty())
            .map(|i| TokenEntry {
                token: i.token.as_bytes().to_vec(),
                identity: Arc::new(StaticIdentity::new(
                    i.id,
                    i.name.clone(),
                    i.capabilities.iter().cloned(),
                )),
            })
            .collect()
    }

    fn presented_token(headers: &HeaderMap) -> Option<&str> {
        if let Some(token) = headers
            .get(API_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return Some(token);
        }
        if !presents_bearer(headers) {
            return None;
        }
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.get(7..))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Option<Arc<dyn IdentityContext>> {
        let presented = Self::presented_token(headers)?.as_bytes();
        let entries = self.entries.load();
        // Compare against every entry so timing does not reveal which one matched.
        let mut found: Option<Arc<StaticIdentity>> = None;
        for entry in entries.iter() {
            if bool::from(entry.token.as_slice().ct_eq(presented)) && found.is_none() {
                found = Some(entry.identity.clone());
            }
        }
        found.map(|identity| identity as Arc<dyn IdentityContext>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> StaticIdentityResolver {
        StaticIdentityResolver::new(&[
            IdentityConfig {
                id: 1,
                name: "admin".into(),
                token: "admin-token".into(),
                capabilities: vec!["manage_options".into()],
            },
            IdentityConfig {
                id: 42,
                name: "ci".into(),
                token: "ci-token".into(),
                capabilities: vec![],
            },
        ])
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_bearer_detection() {
        assert!(presents_bearer(&headers(&[("authorization", "Bearer abc")])));
        assert!(presents_bearer(&headers(&[("authorization", "bearer abc")])));
        assert!(!presents_bearer(&headers(&[("authorization", "Basic abc")])));
        assert!(!presents_bearer(&headers(&[("authorization", "Bear")])));
        assert!(!presents_bearer(&HeaderMap::new()));
    }

    #[test]
    fn test_resolves_api_token_and_bearer() {
        let r = resolver();
        let admin = r.resolve(&headers(&[("x-api-token", "admin-token")])).unwrap();
        assert_eq!(admin.id(), Some(1));
        assert!(admin.has_capability("manage_options"));

        let ci = r.resolve(&headers(&[("authorization", "Bearer ci-token")])).unwrap();
        assert_eq!(ci.id(), Some(42));
        assert!(!ci.has_capability("manage_options"));
    }

    #[test]
    fn test_unknown_or_missing_token() {
        let r = resolver();
        assert!(r.resolve(&HeaderMap::new()).is_none());
        assert!(r.resolve(&headers(&[("x-api-token", "nope")])).is_none());
        assert!(r.resolve(&headers(&[("authorization", "Basic admin-token")])).is_none());
    }

    #[test]
    fn test_replace_table() {
        let r = resolver();
        r.replace(&[]);
        assert!(r.resolve(&headers(&[("x-api-token", "admin-token")])).is_none());
    }
}

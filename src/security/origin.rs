//! Origin allow-list matching for CORS.
//!
//! # Responsibilities
//! - Parse operator-supplied origin patterns
//! - Decide whether a request `Origin` is allowed cross-origin access
//!
//! # Design Decisions
//! - Exact patterns compare case-insensitively after stripping one trailing slash
//! - `*.example.com` matches strict subdomains only, never `example.com` itself
//! - Wildcards are scheme-bound; an unqualified wildcard means `https`
//! - Matching is a pure predicate: a miss only withholds CORS headers

use thiserror::Error;
use url::Url;

/// Why an origin pattern was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OriginPatternError {
    #[error("origin pattern is empty")]
    Empty,
    #[error("wildcard pattern {0:?} must look like *.example.com or https://*.example.com")]
    BadWildcard(String),
}

/// One entry of the CORS allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    /// Full origin, stored lowercased without trailing slash.
    Exact(String),
    /// Any strict subdomain of `base_domain` under `scheme`.
    Wildcard { scheme: String, base_domain: String },
}

impl OriginPattern {
    pub fn parse(raw: &str) -> Result<Self, OriginPatternError> {
        let normalized = strip_trailing_slash(raw.trim());
        if normalized.is_empty() {
            return Err(OriginPatternError::Empty);
        }
        if !normalized.contains('*') {
            return Ok(Self::Exact(normalized.to_ascii_lowercase()));
        }

        let (scheme, rest) = match normalized.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("https", normalized),
        };
        let base_domain = rest
            .strip_prefix("*.")
            .ok_or_else(|| OriginPatternError::BadWildcard(raw.to_string()))?;

        let valid_scheme =
            !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c));
        let valid_base = !base_domain.is_empty()
            && !base_domain.starts_with('.')
            && !base_domain.contains(['*', '/', ':', '@']);
        if !valid_scheme || !valid_base {
            return Err(OriginPatternError::BadWildcard(raw.to_string()));
        }

        Ok(Self::Wildcard {
            scheme: scheme.to_ascii_lowercase(),
            base_domain: base_domain.to_ascii_lowercase(),
        })
    }

    /// Test one already-trimmed origin against this pattern.
    pub fn matches(&self, origin: &str) -> bool {
        let origin = strip_trailing_slash(origin);
        match self {
            Self::Exact(expected) => origin.eq_ignore_ascii_case(expected),
            Self::Wildcard {
                scheme,
                base_domain,
            } => {
                let Ok(url) = Url::parse(origin) else {
                    return false;
                };
                if !url.scheme().eq_ignore_ascii_case(scheme) {
                    return false;
                }
                let host = match url.host_str() {
                    Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
                    _ => return false,
                };
                host != *base_domain
                    && host.len() > base_domain.len() + 1
                    && host.ends_with(base_domain.as_str())
                    && host.as_bytes()[host.len() - base_domain.len() - 1] == b'.'
            }
        }
    }
}

/// Whether `origin` is permitted by any of `patterns`.
pub fn matches(origin: &str, patterns: &[OriginPattern]) -> bool {
    let origin = origin.trim();
    if origin.is_empty() {
        return false;
    }
    patterns.iter().any(|p| p.matches(origin))
}

fn strip_trailing_slash(value: &str) -> &str {
    value.strip_suffix('/').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(raw: &[&str]) -> Vec<OriginPattern> {
        raw.iter().map(|p| OriginPattern::parse(p).unwrap()).collect()
    }

    #[test]
    fn test_exact_match_normalizes() {
        let list = patterns(&["https://App.Example.com/"]);
        assert!(matches("https://app.example.com", &list));
        assert!(matches("HTTPS://APP.EXAMPLE.COM/", &list));
        assert!(!matches("https://app.example.com:8443", &list));
        assert!(!matches("http://app.example.com", &list));
        assert!(!matches("", &list));
    }

    #[test]
    fn test_wildcard_subdomains_only() {
        let list = patterns(&["*.example.com"]);
        assert!(matches("https://a.example.com", &list));
        assert!(matches("https://deep.a.example.com", &list));
        assert!(!matches("https://example.com", &list));
        assert!(!matches("http://a.example.com", &list));
        assert!(!matches("https://badexample.com", &list));
        assert!(!matches("https://a.example.com.evil.net", &list));
    }

    #[test]
    fn test_wildcard_with_scheme() {
        let list = patterns(&["http://*.local.test"]);
        assert!(matches("http://ci.local.test", &list));
        assert!(matches("http://ci.local.test:3000", &list));
        assert!(!matches("https://ci.local.test", &list));
    }

    #[test]
    fn test_bare_domain_needs_its_own_entry() {
        let list = patterns(&["*.example.com", "https://example.com"]);
        assert!(matches("https://example.com", &list));
        assert!(matches("https://www.example.com", &list));
    }

    #[test]
    fn test_garbage_origins_never_match_wildcards() {
        let list = patterns(&["*.example.com"]);
        assert!(!matches("null", &list));
        assert!(!matches("a.example.com", &list));
    }

    #[test]
    fn test_parse_rejects_malformed_wildcards() {
        assert_eq!(OriginPattern::parse("  "), Err(OriginPatternError::Empty));
        assert!(OriginPattern::parse("https://a.*.com").is_err());
        assert!(OriginPattern::parse("*.").is_err());
        assert!(OriginPattern::parse("*example.com").is_err());
        assert!(OriginPattern::parse("https://*.example.com:443").is_err());
    }
}

//! HMAC-SHA256 request signatures.
//!
//! Signing scheme shared with clients:
//!
//! ```text
//! base      = UPPER(method) + "\n" + path + "\n" + timestamp
//! signature = lowercase_hex(HMAC-SHA256(secret, base))
//! ```
//!
//! Carried in `X-PCC-Key`, `X-PCC-Timestamp` and `X-PCC-Signature`.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::security::credentials::CredentialProvider;

type HmacSha256 = Hmac<Sha256>;

pub const KEY_HEADER: &str = "x-pcc-key";
pub const TIMESTAMP_HEADER: &str = "x-pcc-timestamp";
pub const SIGNATURE_HEADER: &str = "x-pcc-signature";

/// Default tolerated clock difference in seconds.
pub const DEFAULT_SKEW_SECS: u64 = 300;

/// 2000-01-01T00:00:00Z
const MIN_TIMESTAMP: u64 = 946_684_800;
/// 2100-01-01T00:00:00Z
const MAX_TIMESTAMP: u64 = 4_102_444_800;
const MAX_TIMESTAMP_DIGITS: usize = 11;

/// Signature headers of one request. Never stored.
#[derive(Debug, Clone, Default)]
pub struct SignedRequest<'a> {
    pub key_id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
    pub method: &'a str,
    pub path: &'a str,
}

/// Build the canonical string a signature covers.
pub fn canonical_string(method: &str, path: &str, timestamp: &str) -> String {
    format!("{}\n{}\n{}", method.to_ascii_uppercase(), path, timestamp)
}

/// Compute the lowercase hex signature for a request.
pub fn sign(secret: &[u8], method: &str, path: &str, timestamp: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC key size is always valid");
    mac.update(canonical_string(method, path, timestamp).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Parse a unix timestamp in its one canonical decimal spelling.
fn parse_timestamp(raw: &str) -> Option<u64> {
    if raw.is_empty() || raw.len() > MAX_TIMESTAMP_DIGITS {
        return None;
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return None;
    }
    let ts: u64 = raw.parse().ok()?;
    (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&ts).then_some(ts)
}

/// Verifies signed requests against configured credentials.
pub struct SignatureValidator {
    credentials: Arc<dyn CredentialProvider>,
    clock: Arc<dyn Clock>,
}

impl SignatureValidator {
    pub fn new(credentials: Arc<dyn CredentialProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { credentials, clock }
    }

    /// Whether the request carries a fresh, correct signature.
    ///
    /// Every failure mode yields `false` with nothing to distinguish them.
    pub fn is_valid(&self, req: &SignedRequest<'_>, skew_secs: u64) -> bool {
        if req.key_id.is_empty() || req.timestamp.is_empty() || req.signature.is_empty() {
            return false;
        }

        let Some(secret) = self.credentials.resolve(req.key_id) else {
            tracing::debug!(key_id = %req.key_id, "Unknown signing key");
            return false;
        };

        let Some(ts) = parse_timestamp(req.timestamp) else {
            return false;
        };

        let now = self.clock.now_secs();
        if now.abs_diff(ts) > skew_secs.max(1) {
            tracing::debug!(key_id = %req.key_id, drift = now.abs_diff(ts), "Signed request outside skew window");
            return false;
        }

        let expected = sign(secret.expose(), req.method, req.path, req.timestamp);
        let supplied = req.signature.to_ascii_lowercase();
        expected.as_bytes().ct_eq(supplied.as_bytes()).into()
    }
}

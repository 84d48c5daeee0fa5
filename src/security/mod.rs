//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per origin/IP/user fixed window)
//!     → authorizer.rs (IP allow-list, bearer policy, capabilities)
//!       or signature.rs (HMAC over method, path, timestamp)
//!     → Pass to snapshot cache
//!
//! Response decoration:
//!     → origin.rs (CORS allow-list)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: independent gates, each a single deterministic check
//! - Fail closed: reject on any security check failure
//! - No trust in client input; secrets never leave credentials.rs

pub mod authorizer;
pub mod credentials;
pub mod identity;
pub mod origin;
pub mod rate_limit;
pub mod signature;

pub use authorizer::{AccessAuthorizer, AuthContext, Denial};
pub use credentials::{CredentialProvider, EnvCredentials, Secret, StaticCredentials};
pub use identity::{IdentityContext, IdentityResolver, StaticIdentity, StaticIdentityResolver};
pub use origin::OriginPattern;
pub use rate_limit::{RateDecision, RateLimiter};
pub use signature::{SignatureValidator, SignedRequest};

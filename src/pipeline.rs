//! Request pipeline.
//!
//! Composes the gates in a fixed order per route and only touches the cache
//! once every gate has passed:
//!
//! ```text
//! capability route: ip → rate limit → bearer/identity/capability → cache → producer
//! signed route:     rate limit → ip → HMAC signature            → cache → producer
//! ```
//!
//! The first failing gate ends the request; nothing after it runs.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::{AccessPolicy, PolicySource};
use crate::observability::metrics;
use crate::security::authorizer::{ip_allowed, AccessAuthorizer, AuthContext, Denial};
use crate::security::identity::IdentityContext;
use crate::security::rate_limit::{key_from_request, RateLimiter};
use crate::security::signature::{SignatureValidator, SignedRequest};
use crate::snapshot::{SnapshotCache, SnapshotProducer, StateChange};

/// Terminal outcome of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Access denied for this IP address.")]
    ForbiddenIp,
    #[error("Bearer authentication is disabled for this endpoint.")]
    BearerDisabled,
    #[error("Authentication required.")]
    Unauthorized,
    #[error("You do not have permission to view the project snapshot.")]
    Forbidden,
    #[error("Invalid or missing HMAC signature.")]
    BadSignature,
    #[error("Too many requests; retry after {retry_after} seconds.")]
    RateLimited { retry_after: u64 },
    #[error("The snapshot could not be built.")]
    SnapshotUnavailable,
}

impl PipelineError {
    /// Machine-readable error code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::ForbiddenIp => "pcc_forbidden_ip",
            PipelineError::BearerDisabled => "pcc_bearer_disabled",
            PipelineError::Unauthorized => "pcc_unauthorized",
            PipelineError::Forbidden => "pcc_forbidden",
            PipelineError::BadSignature => "pcc_bad_signature",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::SnapshotUnavailable => "pcc_snapshot_unavailable",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            PipelineError::BearerDisabled
            | PipelineError::Unauthorized
            | PipelineError::BadSignature => 401,
            PipelineError::ForbiddenIp | PipelineError::Forbidden => 403,
            PipelineError::RateLimited { .. } => 429,
            PipelineError::SnapshotUnavailable => 503,
        }
    }
}

impl From<Denial> for PipelineError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::ForbiddenIp => PipelineError::ForbiddenIp,
            Denial::BearerDisabled => PipelineError::BearerDisabled,
            Denial::Unauthorized => PipelineError::Unauthorized,
            Denial::Forbidden => PipelineError::Forbidden,
        }
    }
}

/// What the pipeline knows about the caller.
#[derive(Clone)]
pub struct RequestContext {
    pub client_ip: IpAddr,
    /// Raw `Origin` header, empty when absent.
    pub origin: String,
    pub presented_bearer: bool,
    pub identity: Option<Arc<dyn IdentityContext>>,
}

impl RequestContext {
    pub fn anonymous(client_ip: IpAddr) -> Self {
        Self {
            client_ip,
            origin: String::new(),
            presented_bearer: false,
            identity: None,
        }
    }
}

/// A snapshot ready to send.
#[derive(Debug, Clone)]
pub struct SnapshotResponse {
    pub payload: Arc<Value>,
    /// Seconds intermediaries may cache the response.
    pub max_age: u64,
}

/// The composed gate chain.
pub struct SnapshotPipeline {
    policy: Arc<dyn PolicySource>,
    rate_limiter: Arc<RateLimiter>,
    authorizer: AccessAuthorizer,
    signatures: Arc<SignatureValidator>,
    cache: Arc<SnapshotCache>,
    producer: Arc<dyn SnapshotProducer>,
}

impl SnapshotPipeline {
    pub fn new(
        policy: Arc<dyn PolicySource>,
        rate_limiter: Arc<RateLimiter>,
        signatures: Arc<SignatureValidator>,
        cache: Arc<SnapshotCache>,
        producer: Arc<dyn SnapshotProducer>,
    ) -> Self {
        Self {
            policy,
            rate_limiter,
            authorizer: AccessAuthorizer,
            signatures,
            cache,
            producer,
        }
    }

    /// Effective policy right now.
    pub fn policy(&self) -> AccessPolicy {
        self.policy.policy()
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Forward a host lifecycle event to the cache.
    pub fn on_state_change(&self, event: &StateChange) {
        self.cache.on_state_change(event);
    }

    /// `GET /snapshot`: capability-authorized access.
    pub fn serve_capability(&self, ctx: &RequestContext) -> Result<SnapshotResponse, PipelineError> {
        let policy = self.policy.policy();

        if !ip_allowed(&policy, ctx.client_ip) {
            return Err(self.deny("ip", ctx, PipelineError::ForbiddenIp));
        }

        self.throttle("snapshot", &policy, ctx)?;

        let auth = AuthContext {
            client_ip: ctx.client_ip,
            presented_bearer: ctx.presented_bearer,
            identity: ctx.identity.as_ref(),
            policy: &policy,
        };
        if let Err(denial) = self.authorizer.authorize(&auth) {
            return Err(self.deny("authorization", ctx, denial.into()));
        }

        self.cached_or_build(&policy)
    }

    /// `GET /snapshot/signed`: HMAC-authenticated access.
    pub fn serve_signed(
        &self,
        ctx: &RequestContext,
        signed: &SignedRequest<'_>,
    ) -> Result<SnapshotResponse, PipelineError> {
        let policy = self.policy.policy();

        self.throttle("snapshot_signed", &policy, ctx)?;

        if !ip_allowed(&policy, ctx.client_ip) {
            return Err(self.deny("ip", ctx, PipelineError::ForbiddenIp));
        }

        if !self.signatures.is_valid(signed, policy.signature_skew_secs) {
            return Err(self.deny("signature", ctx, PipelineError::BadSignature));
        }

        self.cached_or_build(&policy)
    }

    fn throttle(
        &self,
        route: &'static str,
        policy: &AccessPolicy,
        ctx: &RequestContext,
    ) -> Result<(), PipelineError> {
        let user_id = ctx.identity.as_ref().and_then(|i| i.id());
        let key = key_from_request(&ctx.origin, &ctx.client_ip.to_string(), user_id);
        let decision =
            self.rate_limiter
                .check(&key, policy.rate_limit_threshold, policy.rate_limit_window);
        if decision.allowed {
            return Ok(());
        }
        metrics::record_rate_limited(route);
        Err(self.deny(
            "rate_limit",
            ctx,
            PipelineError::RateLimited {
                retry_after: decision.retry_after,
            },
        ))
    }

    fn deny(&self, gate: &'static str, ctx: &RequestContext, err: PipelineError) -> PipelineError {
        tracing::warn!(
            gate,
            reason = err.code(),
            client_ip = %ctx.client_ip,
            "Request rejected"
        );
        metrics::record_gate_denial(gate, err.code());
        err
    }

    fn cached_or_build(&self, policy: &AccessPolicy) -> Result<SnapshotResponse, PipelineError> {
        if let Some(payload) = self.cache.get() {
            return Ok(SnapshotResponse {
                payload,
                max_age: policy.cache_ttl,
            });
        }

        let payload = match self.producer.produce(policy) {
            Ok(value) => Arc::new(value),
            Err(e) => {
                tracing::error!(error = %e, "Snapshot producer failed");
                return Err(PipelineError::SnapshotUnavailable);
            }
        };
        self.cache.set(payload.clone(), policy.cache_ttl);

        Ok(SnapshotResponse {
            payload,
            max_age: policy.cache_ttl,
        })
    }
}

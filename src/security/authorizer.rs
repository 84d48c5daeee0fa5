//! Read-access authorization for the capability route.
//!
//! Two hard gates (client IP, bearer scheme policy) sit in front of three
//! independent allow mechanisms: the baseline capability, an explicit user id
//! list and an explicit capability list. The first mechanism that grants
//! access wins.

use std::net::IpAddr;
use std::sync::Arc;

use crate::config::AccessPolicy;
use crate::security::identity::IdentityContext;

/// Why a caller was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    ForbiddenIp,
    BearerDisabled,
    Unauthorized,
    Forbidden,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::ForbiddenIp => "forbidden_ip",
            Denial::BearerDisabled => "bearer_disabled",
            Denial::Unauthorized => "unauthorized",
            Denial::Forbidden => "forbidden",
        }
    }
}

/// Everything the authorizer looks at for one request.
pub struct AuthContext<'a> {
    pub client_ip: IpAddr,
    pub presented_bearer: bool,
    pub identity: Option<&'a Arc<dyn IdentityContext>>,
    pub policy: &'a AccessPolicy,
}

/// Whether `ip` passes the allow-list. An unrestricted policy allows
/// everyone; a restricted one only its parsed entries.
pub fn ip_allowed(policy: &AccessPolicy, ip: IpAddr) -> bool {
    !policy.restrict_ips || policy.allow_ips.contains(&ip.to_canonical())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessAuthorizer;

impl AccessAuthorizer {
    pub fn authorize(&self, ctx: &AuthContext<'_>) -> Result<(), Denial> {
        let policy = ctx.policy;

        if !ip_allowed(policy, ctx.client_ip) {
            return Err(Denial::ForbiddenIp);
        }

        // Rejects the scheme itself, before we even know who is calling.
        if ctx.presented_bearer && !policy.allow_bearer {
            return Err(Denial::BearerDisabled);
        }

        let Some(identity) = ctx.identity else {
            return Err(Denial::Unauthorized);
        };

        if identity.has_capability(&policy.required_capability) {
            return Ok(());
        }

        if identity
            .id()
            .is_some_and(|id| policy.allow_user_ids.contains(&id))
        {
            return Ok(());
        }

        if policy
            .allow_caps
            .iter()
            .any(|cap| identity.has_capability(cap))
        {
            return Ok(());
        }

        Err(Denial::Forbidden)
    }
}

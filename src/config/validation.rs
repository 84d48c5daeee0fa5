//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that would leave the
//! service unable to start or impossible to reach. Most policy values are not
//! rejected here: out-of-range numbers and malformed origins are sanitized away
//! when the policy is evaluated. IP allow-list entries are the exception, since
//! dropping one would widen access.
//!
//! Returns all validation errors, not just the first.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    let namespace = &config.api.namespace;
    if !namespace.starts_with('/') || namespace.len() < 2 {
        errors.push(ValidationError::new(
            "api.namespace",
            "must start with '/' and name at least one segment",
        ));
    }
    if namespace.ends_with('/') {
        errors.push(ValidationError::new("api.namespace", "must not end with '/'"));
    }
    if config.api.request_timeout_secs == 0 {
        errors.push(ValidationError::new("api.request_timeout_secs", "must be positive"));
    }

    for (i, entry) in config.policy.allow_ips.iter().enumerate() {
        if entry.trim().parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("policy.allow_ips[{i}]"),
                format!("'{}' is not an IP address", entry.trim()),
            ));
        }
    }

    let mut ids = HashSet::new();
    let mut tokens = HashSet::new();
    for (i, identity) in config.identities.iter().enumerate() {
        let field = format!("identities[{i}]");
        if identity.id == 0 {
            errors.push(ValidationError::new(format!("{field}.id"), "must be positive"));
        } else if !ids.insert(identity.id) {
            errors.push(ValidationError::new(
                format!("{field}.id"),
                format!("duplicate id {}", identity.id),
            ));
        }
        if identity.token.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.token"), "must not be empty"));
        } else if !tokens.insert(identity.token.as_str()) {
            // Never echo the token itself.
            errors.push(ValidationError::new(format!("{field}.token"), "duplicate token"));
        }
    }

    if config.snapshot.manifest_path.trim().is_empty() {
        errors.push(ValidationError::new("snapshot.manifest_path", "must not be empty"));
    }
    if config.snapshot.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("snapshot.sweep_interval_secs", "must be positive"));
    }

    let format = config.observability.log_format.to_ascii_lowercase();
    if format != "pretty" && format != "json" {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be \"pretty\" or \"json\"",
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated)
//!
//! Per request:
//!     SharedPolicy (raw [policy] section)
//!     → policy.rs (sanitize into AccessPolicy)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of policy and identities
//!     → snapshot cache purged
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener and namespace changes need a restart; policy changes do not

pub mod loader;
pub mod policy;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use policy::{AccessPolicy, PolicySource, SharedPolicy};
pub use schema::{IdentityConfig, ListenerConfig, PolicyConfig, ServiceConfig};
pub use watcher::{ConfigWatcher, ReloadEvent};

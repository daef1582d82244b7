//! # Configuration Management
//!
//! Environment-driven configuration. An optional `.env` file is loaded by the
//! binary before [`IdentityConfig::from_env`] runs; command line flags then
//! override the few settings they cover.

pub mod settings;

pub use settings::{parse_duration, BackupMode, IdentityConfig, ObservabilityConfig, ENV_PREFIX};

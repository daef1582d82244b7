//! # identityd
//!
//! Credential lifecycle engine of an identity sidecar. It obtains X.509
//! identity certificates, role certificates, role tokens and access tokens
//! from an identity provider, writes them atomically for the workload,
//! refreshes them on a schedule and serves cached tokens over local HTTP.
//!
//! ## Architecture
//!
//! ```text
//! stop signal ─▶ RefreshEngine (jitter → first cycle → ticks/triggers → drain)
//!                  ├─ CertificateWorkflow ─▶ ProviderClient, AtomicWriter
//!                  └─ TokenWorkflow ──────▶ ProviderClient, AtomicWriter, TokenCache
//!                                                                          │
//!                                                         token endpoint ◀─┘
//! ```

pub mod api;
pub mod backoff;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod secrets;
pub mod store;
pub mod utils;
pub mod workflows;

pub use config::IdentityConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

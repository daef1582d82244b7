//! Secret backend used to keep a backup of the instance identity.
//!
//! The identity certificate and its private key are stored as one JSON
//! document under a configured secret name so a restarted sidecar can come
//! back up while the provider is unreachable. The [`SecretsClient`] trait
//! keeps the storage backend pluggable; [`VaultSecretsClient`] stores the
//! document in a HashiCorp Vault KV v2 mount.

pub mod client;
pub mod error;
pub mod types;
pub mod vault;

pub use client::SecretsClient;
pub use error::{Result, SecretsError};
pub use types::SecretString;
pub use vault::{VaultConfig, VaultSecretsClient};

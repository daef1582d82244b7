//! Backend-agnostic secret access.

use async_trait::async_trait;

use super::error::Result;

/// Read/write access to named secrets.
///
/// Implementations must never log secret values and must not retry
/// internally; retries belong to the refresh engine.
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Retrieve a secret value by name.
    ///
    /// Returns [`super::SecretsError::NotFound`] when the secret does not exist.
    async fn get_secret(&self, key: &str) -> Result<String>;

    /// Store or replace a secret value.
    async fn set_secret(&self, key: &str, value: &str) -> Result<()>;
}

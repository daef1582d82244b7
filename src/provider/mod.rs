//! Identity provider boundary.
//!
//! The refresh workflows only talk to [`ProviderClient`]. [`IdentityHandler`]
//! is the production implementation: it combines the ZTS-style HTTP client
//! with the optional backup secret. No implementation retries internally.

pub mod backup;
pub mod handler;
pub mod zts;

pub use backup::BackupSecretStore;
pub use handler::IdentityHandler;
pub use zts::{ZtsClient, ZtsConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AccessToken, DomainRole, InstanceIdentity, RoleCertificate, RoleToken};
use crate::errors::PemError;
use crate::secrets::{SecretString, SecretsError};

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The operation needs a collaborator that is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Http(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("unable to build certificate signing request: {0}")]
    Csr(String),

    #[error("backup secret: {0}")]
    Backup(#[from] SecretsError),

    #[error(transparent)]
    Pem(#[from] PemError),

    #[error("unable to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("certificate {0} carries no instance id")]
    MissingInstanceId(String),
}

impl ProviderError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

/// An identity certificate together with its private key.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedIdentity {
    pub identity: InstanceIdentity,
    pub key: SecretString,
}

impl IssuedIdentity {
    pub fn new(identity: InstanceIdentity, key: SecretString) -> Self {
        Self { identity, key }
    }

    /// Usable only when both the certificate and the key carry material.
    pub fn is_usable(&self) -> bool {
        self.identity.has_certificate() && !self.key.is_empty()
    }
}

/// Tokens returned for one target set.
#[derive(Debug, Clone, Default)]
pub struct IssuedTokens {
    pub role_tokens: Vec<RoleToken>,
    pub access_tokens: Vec<AccessToken>,
}

/// Operations the refresh workflows need from the identity provider and the
/// backup secret.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Register or refresh the instance and obtain a new identity.
    async fn issue_certificate(&self) -> Result<IssuedIdentity, ProviderError>;

    /// Role certificates for every target, signed for `identity`.
    async fn issue_role_certificates(
        &self,
        identity: &InstanceIdentity,
        key: &SecretString,
        targets: &[DomainRole],
    ) -> Result<Vec<RoleCertificate>, ProviderError>;

    /// Role tokens and access tokens for every target, authenticated with
    /// the given certificate and key.
    async fn issue_tokens(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        targets: &[DomainRole],
    ) -> Result<IssuedTokens, ProviderError>;

    /// Remove the provider-side instance record. Returns the deleted
    /// instance id.
    async fn delete_instance_record(&self) -> Result<String, ProviderError>;

    /// Whether a backup secret backend is wired up.
    fn has_backup(&self) -> bool;

    /// Load the identity saved in the backup secret, `None` when empty.
    async fn read_backup_secret(&self) -> Result<Option<IssuedIdentity>, ProviderError>;

    async fn write_backup_secret(&self, issued: &IssuedIdentity) -> Result<(), ProviderError>;
}

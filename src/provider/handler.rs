//! Production [`ProviderClient`]: the ZTS-style client plus the optional
//! backup secret, assembled from [`IdentityConfig`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{BackupSecretStore, IssuedIdentity, IssuedTokens, ProviderClient, ProviderError, ZtsClient};
use crate::config::IdentityConfig;
use crate::domain::{DomainRole, InstanceIdentity, RoleCertificate};
use crate::errors::PemError;
use crate::secrets::{SecretString, VaultSecretsClient};

pub struct IdentityHandler {
    zts: Option<ZtsClient>,
    backup: Option<BackupSecretStore>,
    cert_file: PathBuf,
    key_file: PathBuf,
}

impl IdentityHandler {
    pub fn new(
        zts: Option<ZtsClient>,
        backup: Option<BackupSecretStore>,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self { zts, backup, cert_file: cert_file.into(), key_file: key_file.into() }
    }

    /// Connects to the secret backend only when a backup mode and a secret
    /// name are both configured.
    pub async fn from_config(config: &IdentityConfig) -> Result<Self, ProviderError> {
        let zts = config.zts_config().map(ZtsClient::new).transpose()?;

        let backup = if config.backup.is_enabled() && !config.cert_secret.is_empty() {
            match &config.vault {
                Some(vault) => {
                    let client = VaultSecretsClient::new(vault.clone()).await?;
                    info!(secret = %config.cert_secret, mode = %config.backup, "Identity backup enabled");
                    Some(BackupSecretStore::new(Arc::new(client), &config.cert_secret))
                }
                None => {
                    warn!(
                        secret = %config.cert_secret,
                        "Backup mode is set but no secret backend is configured; set VAULT_ADDR"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(zts, backup, &config.cert_file, &config.key_file))
    }

    fn zts(&self) -> Result<&ZtsClient, ProviderError> {
        self.zts.as_ref().ok_or(ProviderError::NotConfigured("identity provider"))
    }

    fn backup(&self) -> Result<&BackupSecretStore, ProviderError> {
        self.backup.as_ref().ok_or(ProviderError::NotConfigured("backup secret"))
    }
}

#[async_trait]
impl ProviderClient for IdentityHandler {
    fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    async fn issue_certificate(&self) -> Result<IssuedIdentity, ProviderError> {
        self.zts()?.register_instance().await
    }

    async fn issue_role_certificates(
        &self,
        identity: &InstanceIdentity,
        key: &SecretString,
        targets: &[DomainRole],
    ) -> Result<Vec<RoleCertificate>, ProviderError> {
        self.zts()?.role_certificates(identity, key, targets).await
    }

    async fn issue_tokens(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        targets: &[DomainRole],
    ) -> Result<IssuedTokens, ProviderError> {
        self.zts()?.tokens(cert_pem, key_pem, targets).await
    }

    /// Authenticates with the certificate currently on disk; the instance id
    /// is taken from that certificate.
    async fn delete_instance_record(&self) -> Result<String, ProviderError> {
        let zts = self.zts()?;
        let cert = read_file(&self.cert_file, true).await?;
        let key = read_file(&self.key_file, false).await?;

        let identity = InstanceIdentity::from_pem_bytes(&cert)?;
        if identity.instance_id.is_empty() {
            return Err(ProviderError::MissingInstanceId(self.cert_file.display().to_string()));
        }

        zts.delete_instance(&cert, &key, &identity.instance_id).await?;
        Ok(identity.instance_id)
    }

    async fn read_backup_secret(&self) -> Result<Option<IssuedIdentity>, ProviderError> {
        self.backup()?.read().await
    }

    async fn write_backup_secret(&self, issued: &IssuedIdentity) -> Result<(), ProviderError> {
        self.backup()?.write(issued).await
    }
}

async fn read_file(path: &Path, certificate: bool) -> Result<Vec<u8>, PemError> {
    tokio::fs::read(path).await.map_err(|source| {
        let path = path.to_path_buf();
        if certificate {
            PemError::CertificateReadError { path, source }
        } else {
            PemError::PrivateKeyReadError { path, source }
        }
    })
}

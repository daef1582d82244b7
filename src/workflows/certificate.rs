//! Certificate workflow.
//!
//! Each cycle obtains an identity from the first source that has one
//! (provider, then backup secret, then the files written by an earlier
//! cycle), requests role certificates for it and writes everything in one
//! atomic batch. On shutdown the provider-side instance record can be
//! deleted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::{log_certificate, write_files, PendingFile};
use crate::backoff::{retry_notify, BackoffPolicy};
use crate::config::IdentityConfig;
use crate::domain::{DomainRole, InstanceIdentity, RoleCertificate};
use crate::engine::{EngineSettings, Workflow};
use crate::errors::{Error, PemError, Result};
use crate::observability::RefreshMetrics;
use crate::provider::{IssuedIdentity, ProviderClient, ProviderError};
use crate::secrets::SecretString;
use crate::utils::{PRIVATE_FILE_MODE, PUBLIC_FILE_MODE};

/// Where a cycle's identity came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Provider,
    Backup,
    LocalFile,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Provider => "provider",
            CredentialSource::Backup => "backup",
            CredentialSource::LocalFile => "local_file",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of walking the source chain.
#[derive(Debug, Default)]
pub struct SourceOutcome {
    pub identity: Option<(IssuedIdentity, CredentialSource)>,
    /// Set when the provider was asked and failed, even if a fallback
    /// produced an identity.
    pub provider_error: Option<ProviderError>,
}

pub struct CertificateWorkflow {
    config: Arc<IdentityConfig>,
    provider: Arc<dyn ProviderClient>,
    metrics: RefreshMetrics,
}

impl CertificateWorkflow {
    pub fn new(config: Arc<IdentityConfig>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { config, provider, metrics: RefreshMetrics::new() }
    }

    /// Refresh every `refresh`, after a startup jitter of up to
    /// `delay_jitter_seconds`.
    pub fn engine_settings(config: &IdentityConfig) -> EngineSettings {
        EngineSettings {
            interval: config.refresh,
            jitter_bound: Duration::from_secs(config.delay_jitter_seconds),
            init_only: config.init,
            backoff: BackoffPolicy::for_refresh(config.refresh),
        }
    }

    /// Backup modes only apply when the provider has a backend for them.
    fn backup_read_enabled(&self) -> bool {
        self.config.backup_read_enabled() && self.provider.has_backup()
    }

    fn backup_write_enabled(&self) -> bool {
        self.config.backup_write_enabled() && self.provider.has_backup()
    }

    /// Try provider, backup secret and local files in order and stop at the
    /// first usable identity.
    ///
    /// Only two failures abort the chain: a provider failure, and a failed
    /// backup write, both while backup writing is enabled.
    pub async fn source_identity(&self) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::default();

        if self.config.provider_enabled() {
            match self.fetch_from_provider().await {
                Ok(issued) => {
                    if self.backup_write_enabled() {
                        self.provider.write_backup_secret(&issued).await?;
                        info!(secret = %self.config.cert_secret, "Saved identity to backup secret");
                    }
                    outcome.identity = Some((issued, CredentialSource::Provider));
                    return Ok(outcome);
                }
                Err(e) if self.backup_write_enabled() => return Err(e.into()),
                Err(e) => {
                    error!(error = %e, "Failed to get identity certificate from provider");
                    outcome.provider_error = Some(e);
                }
            }
        }

        if self.backup_read_enabled() {
            match self.provider.read_backup_secret().await {
                Ok(Some(issued)) => {
                    info!(secret = %self.config.cert_secret, "Loaded identity from backup secret");
                    outcome.identity = Some((issued, CredentialSource::Backup));
                    return Ok(outcome);
                }
                Ok(None) => {
                    warn!(secret = %self.config.cert_secret, "Backup secret holds no identity")
                }
                Err(e) => {
                    error!(secret = %self.config.cert_secret, error = %e, "Failed to read backup secret")
                }
            }
        }

        if self.config.role_certs_enabled() {
            match self.read_local_identity().await {
                Ok(issued) => {
                    info!(path = %self.config.cert_file, "Using identity from local files");
                    outcome.identity = Some((issued, CredentialSource::LocalFile));
                }
                Err(e) => error!(
                    path = %self.config.cert_file,
                    error = %e,
                    "Failed to load identity from local files"
                ),
            }
        }

        Ok(outcome)
    }

    async fn fetch_from_provider(&self) -> std::result::Result<IssuedIdentity, ProviderError> {
        let issued = self.provider.issue_certificate().await?;
        if !issued.is_usable() {
            return Err(ProviderError::invalid_response("empty certificate or private key"));
        }
        Ok(issued)
    }

    async fn read_local_identity(&self) -> Result<IssuedIdentity> {
        let cert = tokio::fs::read(&self.config.cert_file).await.map_err(|source| {
            PemError::CertificateReadError { path: self.config.cert_file.clone().into(), source }
        })?;
        let key = tokio::fs::read(&self.config.key_file).await.map_err(|source| {
            PemError::PrivateKeyReadError { path: self.config.key_file.clone().into(), source }
        })?;

        let issued =
            IssuedIdentity::new(InstanceIdentity::from_pem_bytes(&cert)?, SecretString::from_bytes(&key));
        if !issued.is_usable() {
            return Err(PemError::Empty.into());
        }
        Ok(issued)
    }

    /// Output batch for one cycle. Identities read back from the local
    /// files are not rewritten.
    fn pending_files(
        &self,
        issued: &IssuedIdentity,
        source: CredentialSource,
        role_certs: &[RoleCertificate],
    ) -> Vec<PendingFile> {
        let mut files = Vec::new();
        let identity = &issued.identity;

        if source != CredentialSource::LocalFile && issued.is_usable() {
            files.push(PendingFile::new(
                &self.config.cert_file,
                PUBLIC_FILE_MODE,
                identity.x509_certificate_pem.as_bytes(),
            ));
            files.push(PendingFile::new(&self.config.key_file, PRIVATE_FILE_MODE, issued.key.as_bytes()));
        }

        if !identity.x509_ca_certificate_pem.trim().is_empty() && !self.config.ca_cert_file.is_empty() {
            files.push(PendingFile::new(
                &self.config.ca_cert_file,
                PUBLIC_FILE_MODE,
                identity.x509_ca_certificate_pem.as_bytes(),
            ));
        }

        for cert in role_certs {
            if cert.x509_certificate_pem.trim().is_empty() {
                warn!(domain = %cert.domain, role = %cert.role, "Skipping empty role certificate");
                continue;
            }
            let target = DomainRole::new(&cert.domain, &cert.role);
            files.push(PendingFile::new(
                self.config.role_cert_path(&target),
                PUBLIC_FILE_MODE,
                cert.x509_certificate_pem.as_bytes(),
            ));
        }

        files
    }
}

#[async_trait]
impl Workflow for CertificateWorkflow {
    fn name(&self) -> &'static str {
        "certificate"
    }

    async fn run_cycle(&self) -> Result<()> {
        let outcome = self.source_identity().await?;

        let Some((issued, source)) = outcome.identity else {
            // With no role certificates to fall back on, the provider fetch
            // was the whole cycle.
            if let Some(e) = outcome.provider_error {
                if !self.config.role_certs_enabled() {
                    return Err(e.into());
                }
            }
            warn!("No identity available from any source, skipping role certificates");
            return Ok(());
        };

        self.metrics.record_credential_source(source.as_str());
        if source != CredentialSource::LocalFile {
            log_certificate("identity", issued.identity.certificate_info().ok().as_ref());
        }

        let role_certs = if self.config.role_certs_enabled() {
            let certs = self
                .provider
                .issue_role_certificates(&issued.identity, &issued.key, &self.config.target_domain_roles)
                .await?;
            for cert in &certs {
                log_certificate("role", cert.info.as_ref());
            }
            certs
        } else {
            Vec::new()
        };

        let files = self.pending_files(&issued, source, &role_certs);
        let written = write_files(files).await?;
        info!(
            source = %source,
            instance_id = %issued.identity.instance_id,
            role_certificates = role_certs.len(),
            files = written,
            "Credentials refreshed"
        );
        Ok(())
    }

    async fn on_shutdown(&self) -> Result<()> {
        if !self.config.delete_instance_id {
            return Ok(());
        }

        let provider = &self.provider;
        let instance_id = retry_notify(
            BackoffPolicy::for_refresh(self.config.refresh),
            move || provider.delete_instance_record(),
            |err: &ProviderError, delay| {
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "Failed to delete instance record, retrying");
            },
        )
        .await
        .map_err(Error::from)?;

        info!(instance_id = %instance_id, "Deleted instance record");
        Ok(())
    }
}

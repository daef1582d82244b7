//! Shared helpers for the workflow integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use identityd::domain::{AccessToken, DomainRole, InstanceIdentity, RoleCertificate, RoleToken};
use identityd::provider::{IssuedIdentity, IssuedTokens, ProviderClient, ProviderError};
use identityd::secrets::SecretString;
use identityd::IdentityConfig;
use rcgen::{CertificateParams, DnType, KeyPair, SanType};

/// Self-signed certificate and key carrying `instance_id` in a SAN URI.
pub fn identity_pem(instance_id: &str) -> (String, String) {
    let key = KeyPair::generate().expect("key generation");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("certificate params");
    params.distinguished_name.push(DnType::CommonName, "media.prod.frontend");
    let uri = format!("athenz://instanceid/sys.auth.k8s/{}", instance_id);
    params.subject_alt_names.push(SanType::URI(uri.try_into().expect("uri")));
    let cert = params.self_signed(&key).expect("self-signed certificate");
    (cert.pem(), key.serialize_pem())
}

/// In-memory provider whose availability can be switched while an engine
/// is running.
pub struct FakeProvider {
    pub available: AtomicBool,
    pub backup: Mutex<Option<IssuedIdentity>>,
    pub issued: AtomicUsize,
    pub token_requests: AtomicUsize,
    pub deletions: AtomicUsize,
}

impl FakeProvider {
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(available),
            backup: Mutex::new(None),
            issued: AtomicUsize::new(0),
            token_requests: AtomicUsize::new(0),
            deletions: AtomicUsize::new(0),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::status(503, "provider unavailable"))
        }
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn has_backup(&self) -> bool {
        true
    }

    async fn issue_certificate(&self) -> Result<IssuedIdentity, ProviderError> {
        self.check()?;
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        let (cert, key) = identity_pem(&format!("pod-{}", serial));
        Ok(IssuedIdentity::new(
            InstanceIdentity {
                x509_certificate_pem: cert,
                x509_ca_certificate_pem: "CA-PEM".into(),
                instance_id: format!("pod-{}", serial),
            },
            SecretString::new(key),
        ))
    }

    async fn issue_role_certificates(
        &self,
        _identity: &InstanceIdentity,
        _key: &SecretString,
        targets: &[DomainRole],
    ) -> Result<Vec<RoleCertificate>, ProviderError> {
        self.check()?;
        Ok(targets
            .iter()
            .map(|t| RoleCertificate::new(&t.domain, &t.role, format!("ROLE {}", t)))
            .collect())
    }

    async fn issue_tokens(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        targets: &[DomainRole],
    ) -> Result<IssuedTokens, ProviderError> {
        self.check()?;
        if cert_pem.is_empty() || key_pem.is_empty() {
            return Err(ProviderError::status(401, "no client certificate"));
        }
        let serial = self.token_requests.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedTokens {
            role_tokens: targets.iter().map(|t| RoleToken::new(t, format!("rt{}", serial))).collect(),
            access_tokens: targets.iter().map(|t| AccessToken::new(t, format!("at{}", serial))).collect(),
        })
    }

    async fn delete_instance_record(&self) -> Result<String, ProviderError> {
        self.check()?;
        self.deletions.fetch_add(1, Ordering::SeqCst);
        Ok("pod-0".into())
    }

    async fn read_backup_secret(&self) -> Result<Option<IssuedIdentity>, ProviderError> {
        Ok(self.backup.lock().unwrap().clone())
    }

    async fn write_backup_secret(&self, issued: &IssuedIdentity) -> Result<(), ProviderError> {
        *self.backup.lock().unwrap() = Some(issued.clone());
        Ok(())
    }
}

/// Configuration with every output under `dir`, one role target, no
/// jitter and short intervals.
pub fn config(dir: &Path) -> IdentityConfig {
    IdentityConfig {
        refresh: Duration::from_millis(400),
        token_refresh: Duration::from_millis(400),
        cert_file: dir.join("service.cert.pem").display().to_string(),
        key_file: dir.join("service.key.pem").display().to_string(),
        ca_cert_file: dir.join("ca.cert.pem").display().to_string(),
        role_cert_dir: dir.join("roles").display().to_string(),
        token_dir: dir.join("tokens").display().to_string(),
        target_domain_roles: vec![DomainRole::new("media.prod", "readers")],
        provider_service: "sys.auth.k8s".into(),
        zts_url: "http://zts.invalid".into(),
        token_server_addr: "127.0.0.1:0".into(),
        shutdown_grace: Duration::from_secs(2),
        ..IdentityConfig::default()
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

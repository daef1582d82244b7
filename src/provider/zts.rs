//! HTTP client for a ZTS-style identity provider.
//!
//! Instance registration uses server-side TLS only and a locally generated
//! key; every other call authenticates with the instance certificate over
//! mutual TLS.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rcgen::{CertificateParams, DnType, KeyPair, SanType};
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IssuedIdentity, IssuedTokens, ProviderError};
use crate::domain::{AccessToken, DomainRole, InstanceIdentity, RoleCertificate, RoleToken};
use crate::secrets::SecretString;

/// Connection and naming settings for the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ZtsConfig {
    /// Base URL, e.g. `https://zts.example.cloud:4443/zts/v1`
    pub url: String,
    pub provider_service: String,
    pub domain: String,
    pub service: String,
    /// Suffix for the instance DNS SAN; empty disables the SAN.
    pub dns_suffix: String,
    /// File holding the attestation document sent on registration.
    pub attestation_path: Option<PathBuf>,
    /// Extra trust anchor for the provider's server certificate.
    pub ca_cert_file: Option<PathBuf>,
    /// Requested lifetime for role certificates and tokens.
    pub token_expiry: Duration,
    pub timeout: Duration,
}

impl ZtsConfig {
    /// Principal name, `<domain>.<service>`.
    pub fn principal(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Instance DNS name, `<service>.<domain with dashes>.<suffix>`.
    pub fn instance_dns_name(&self) -> Option<String> {
        if self.dns_suffix.trim().is_empty() {
            return None;
        }
        Some(format!("{}.{}.{}", self.service, self.domain.replace('.', "-"), self.dns_suffix))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceRegisterRequest<'a> {
    provider: &'a str,
    domain: &'a str,
    service: &'a str,
    attestation_data: String,
    csr: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceIdentityResponse {
    x509_certificate: String,
    #[serde(default)]
    x509_certificate_signer: String,
    #[serde(default)]
    instance_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleCertificateRequest {
    csr: String,
    expiry_time: u64,
}

/// Response shape shared by role certificates (PEM in `token`) and role tokens.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleTokenResponse {
    token: String,
    #[serde(default)]
    expiry_time: Option<i64>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Provider client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ZtsClient {
    client: Client,
    root: Option<Certificate>,
    config: ZtsConfig,
}

impl ZtsClient {
    pub fn new(config: ZtsConfig) -> Result<Self, ProviderError> {
        let root = match &config.ca_cert_file {
            Some(path) => {
                let pem = std::fs::read(path).map_err(|e| ProviderError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                Some(Certificate::from_pem(&pem)?)
            }
            None => None,
        };

        let client = Self::builder(&config, root.as_ref()).build()?;
        Ok(Self { client, root, config })
    }

    pub fn config(&self) -> &ZtsConfig {
        &self.config
    }

    fn builder(config: &ZtsConfig, root: Option<&Certificate>) -> reqwest::ClientBuilder {
        let mut builder = Client::builder().timeout(config.timeout);
        if let Some(root) = root {
            builder = builder.add_root_certificate(root.clone());
        }
        builder
    }

    /// Client authenticating with the given certificate and key.
    fn mtls_client(&self, cert_pem: &[u8], key_pem: &[u8]) -> Result<Client, ProviderError> {
        let mut bundle = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
        bundle.extend_from_slice(key_pem);
        bundle.push(b'\n');
        bundle.extend_from_slice(cert_pem);

        let identity = Identity::from_pem(&bundle)?;
        Ok(Self::builder(&self.config, self.root.as_ref()).identity(identity).build()?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn post(&self, client: &Client, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("POST {}", url);
        client.post(url)
    }

    fn get(&self, client: &Client, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("GET {}", url);
        client.get(url)
    }

    fn delete(&self, client: &Client, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("DELETE {}", url);
        client.delete(url)
    }

    /// Register the instance with a freshly generated key.
    pub async fn register_instance(&self) -> Result<IssuedIdentity, ProviderError> {
        let key = KeyPair::generate().map_err(|e| ProviderError::Csr(e.to_string()))?;
        let csr = instance_csr(&self.config, &key)?;
        let attestation_data = self.attestation_data().await?;

        let request = InstanceRegisterRequest {
            provider: &self.config.provider_service,
            domain: &self.config.domain,
            service: &self.config.service,
            attestation_data,
            csr,
        };

        let response = self.post(&self.client, "/instance").json(&request).send().await?;
        let body: InstanceIdentityResponse = handle_response(response).await?;

        let instance_id = match body.instance_id.filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => InstanceIdentity::from_pem_bytes(body.x509_certificate.as_bytes())?.instance_id,
        };

        let identity = InstanceIdentity {
            x509_certificate_pem: body.x509_certificate,
            x509_ca_certificate_pem: body.x509_certificate_signer,
            instance_id,
        };
        Ok(IssuedIdentity::new(identity, SecretString::new(key.serialize_pem())))
    }

    /// One role certificate per target, in target order.
    pub async fn role_certificates(
        &self,
        identity: &InstanceIdentity,
        key: &SecretString,
        targets: &[DomainRole],
    ) -> Result<Vec<RoleCertificate>, ProviderError> {
        let client = self.mtls_client(identity.x509_certificate_pem.as_bytes(), key.as_bytes())?;
        let key_pair =
            KeyPair::from_pem(key.expose_secret()).map_err(|e| ProviderError::Csr(e.to_string()))?;

        let mut certificates = Vec::with_capacity(targets.len());
        for target in targets {
            let request = RoleCertificateRequest {
                csr: role_csr(&self.config, target, &key_pair)?,
                expiry_time: self.config.token_expiry.as_secs() / 60,
            };
            let path = format!("/domain/{}/role/{}/token", target.domain, target.role);
            let response = self.post(&client, &path).json(&request).send().await?;
            let body: RoleTokenResponse = handle_response(response).await?;
            certificates.push(RoleCertificate::new(&target.domain, &target.role, body.token));
        }
        Ok(certificates)
    }

    /// Role token and access token for every target.
    pub async fn tokens(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        targets: &[DomainRole],
    ) -> Result<IssuedTokens, ProviderError> {
        let client = self.mtls_client(cert_pem, key_pem)?;
        let expiry = self.config.token_expiry.as_secs().to_string();
        let mut tokens = IssuedTokens::default();

        for target in targets {
            let path = format!("/domain/{}/token", target.domain);
            let response = self
                .get(&client, &path)
                .query(&[("role", target.role.as_str()), ("maxExpiryTime", expiry.as_str())])
                .send()
                .await?;
            let body: RoleTokenResponse = handle_response(response).await?;
            let mut role_token = RoleToken::new(target, body.token);
            if let Some(at) = body.expiry_time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)) {
                role_token = role_token.with_expiry(at);
            }
            tokens.role_tokens.push(role_token);

            let scope = format!("{}:role.{}", target.domain, target.role);
            let form = [
                ("grant_type", "client_credentials"),
                ("scope", scope.as_str()),
                ("expires_in", expiry.as_str()),
            ];
            let response = self.post(&client, "/oauth2/token").form(&form).send().await?;
            let body: AccessTokenResponse = handle_response(response).await?;
            let mut access_token = AccessToken::new(target, body.access_token);
            if let Some(at) = body.expires_in.and_then(expiry_after) {
                access_token = access_token.with_expiry(at);
            }
            tokens.access_tokens.push(access_token);
        }
        Ok(tokens)
    }

    pub async fn delete_instance(
        &self,
        cert_pem: &[u8],
        key_pem: &[u8],
        instance_id: &str,
    ) -> Result<(), ProviderError> {
        let client = self.mtls_client(cert_pem, key_pem)?;
        let path = format!(
            "/instance/{}/{}/{}/{}",
            self.config.provider_service, self.config.domain, self.config.service, instance_id
        );
        let response = self.delete(&client, &path).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn attestation_data(&self) -> Result<String, ProviderError> {
        match &self.config.attestation_path {
            Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| ProviderError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
            None => Ok(String::new()),
        }
    }
}

fn instance_csr(config: &ZtsConfig, key: &KeyPair) -> Result<String, ProviderError> {
    let dns = config.instance_dns_name().into_iter().collect::<Vec<_>>();
    let mut params = CertificateParams::new(dns).map_err(|e| ProviderError::Csr(e.to_string()))?;
    params.distinguished_name.push(DnType::CommonName, config.principal());
    let csr = params.serialize_request(key).map_err(|e| ProviderError::Csr(e.to_string()))?;
    csr.pem().map_err(|e| ProviderError::Csr(e.to_string()))
}

fn role_csr(config: &ZtsConfig, target: &DomainRole, key: &KeyPair) -> Result<String, ProviderError> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| ProviderError::Csr(e.to_string()))?;
    params.distinguished_name.push(DnType::CommonName, target.file_stem());
    let uri = format!("spiffe://{}/ra/{}", target.domain, target.role);
    params.subject_alt_names.push(SanType::URI(
        uri.try_into().map_err(|e: rcgen::Error| ProviderError::Csr(e.to_string()))?,
    ));
    if let Some(dns) = config.instance_dns_name() {
        params.subject_alt_names.push(SanType::DnsName(
            dns.try_into().map_err(|e: rcgen::Error| ProviderError::Csr(e.to_string()))?,
        ));
    }
    let csr = params.serialize_request(key).map_err(|e| ProviderError::Csr(e.to_string()))?;
    csr.pem().map_err(|e| ProviderError::Csr(e.to_string()))
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::status(status.as_u16(), message))
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let response = check_status(response).await?;
    response.json::<T>().await.map_err(|e| ProviderError::invalid_response(e.to_string()))
}

/// Absolute expiry for a relative lifetime; `None` when out of range.
fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

//! Identity certificates.

use serde::{Deserialize, Serialize};

use crate::errors::PemError;
use crate::utils::certificates::{parse_certificate_pem, CertificateInfo};

/// SAN URI prefix the provider uses to embed the instance id.
const INSTANCE_ID_URI_PREFIX: &str = "athenz://instanceid/";

/// SAN DNS marker the provider uses to embed the instance id.
const INSTANCE_ID_DNS_MARKER: &str = ".instanceid.athenz.";

/// The workload's instance identity: leaf certificate, CA certificate and the
/// provider-side instance id.
///
/// A fresh value is produced by every refresh cycle; values are never
/// mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    pub x509_certificate_pem: String,
    #[serde(default)]
    pub x509_ca_certificate_pem: String,
    #[serde(default)]
    pub instance_id: String,
}

impl InstanceIdentity {
    /// Build an identity from a PEM leaf certificate read from disk.
    ///
    /// The CA certificate is not known in this case and the instance id is
    /// recovered from the certificate's subject alternative names.
    pub fn from_pem_bytes(cert_pem: &[u8]) -> Result<Self, PemError> {
        let info = parse_certificate_pem(cert_pem)?;
        let cert = String::from_utf8(cert_pem.to_vec())
            .map_err(|e| PemError::InvalidPem(e.to_string()))?;

        Ok(Self {
            x509_certificate_pem: cert,
            x509_ca_certificate_pem: String::new(),
            instance_id: instance_id_from(&info).unwrap_or_default(),
        })
    }

    pub fn has_certificate(&self) -> bool {
        !self.x509_certificate_pem.trim().is_empty()
    }

    pub fn certificate_info(&self) -> Result<CertificateInfo, PemError> {
        parse_certificate_pem(self.x509_certificate_pem.as_bytes())
    }
}

fn instance_id_from(info: &CertificateInfo) -> Option<String> {
    info.uris
        .iter()
        .filter_map(|uri| uri.strip_prefix(INSTANCE_ID_URI_PREFIX))
        .filter_map(|rest| rest.rsplit('/').next())
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| {
            info.dns_names
                .iter()
                .filter_map(|dns| dns.split_once(INSTANCE_ID_DNS_MARKER))
                .map(|(id, _)| id.to_string())
                .find(|id| !id.is_empty())
        })
}

/// A certificate scoped to one `(domain, role)` pair, derived from the
/// instance identity.
///
/// The descriptive fields are only used for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCertificate {
    pub domain: String,
    pub role: String,
    pub x509_certificate_pem: String,
    pub info: Option<CertificateInfo>,
}

impl RoleCertificate {
    pub fn new(domain: impl Into<String>, role: impl Into<String>, pem: impl Into<String>) -> Self {
        let x509_certificate_pem = pem.into();
        let info = parse_certificate_pem(x509_certificate_pem.as_bytes()).ok();
        Self { domain: domain.into(), role: role.into(), x509_certificate_pem, info }
    }
}

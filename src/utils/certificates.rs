use chrono::{DateTime, Utc};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

use crate::errors::PemError;

/// Metadata extracted from a leaf certificate for logging and local-file fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial_number: String,
    pub dns_names: Vec<String>,
    pub uris: Vec<String>,
}

/// Parse the first certificate of a PEM buffer.
pub fn parse_certificate_pem(pem_bytes: &[u8]) -> Result<CertificateInfo, PemError> {
    if pem_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PemError::Empty);
    }

    let (_, pem) = parse_x509_pem(pem_bytes).map_err(|e| PemError::InvalidPem(e.to_string()))?;
    let cert = pem.parse_x509().map_err(|e| PemError::InvalidCertificate(e.to_string()))?;

    let validity = cert.validity();
    let not_before = to_utc(validity.not_before)?;
    let not_after = to_utc(validity.not_after)?;

    let (dns_names, uris) = subject_alternative_names(&cert);

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
        serial_number: format!("{:x}", cert.serial),
        dns_names,
        uris,
    })
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>, PemError> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| PemError::InvalidCertificate(format!("validity out of range: {}", time)))
}

fn subject_alternative_names(cert: &X509Certificate<'_>) -> (Vec<String>, Vec<String>) {
    let mut dns_names = Vec::new();
    let mut uris = Vec::new();

    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::URI(uri) => uris.push(uri.to_string()),
                    _ => {}
                }
            }
        }
    }

    (dns_names, uris)
}


#[cfg(test)]
mod tests {
    use super::test_support::self_signed;
    use super::*;

    #[test]
    fn test_parse_certificate_metadata() {
        let (cert_pem, _) = self_signed(
            "sys.auth.frontend",
            &["frontend.sys-auth.example.cloud"],
            &["spiffe://sys.auth/sa/frontend"],
        );

        let info = parse_certificate_pem(cert_pem.as_bytes()).expect("valid certificate");
        assert!(info.subject.contains("sys.auth.frontend"));
        assert_eq!(info.dns_names, vec!["frontend.sys-auth.example.cloud".to_string()]);
        assert_eq!(info.uris, vec!["spiffe://sys.auth/sa/frontend".to_string()]);
        assert!(info.not_before < info.not_after);
        assert!(!info.serial_number.is_empty());
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(matches!(parse_certificate_pem(b""), Err(PemError::Empty)));
        assert!(matches!(parse_certificate_pem(b"  \n"), Err(PemError::Empty)));
    }

    #[test]
    fn test_parse_garbage_input() {
        let err = parse_certificate_pem(b"not a certificate").unwrap_err();
        assert!(matches!(err, PemError::InvalidPem(_)));
    }
}

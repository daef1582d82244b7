use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while loading and parsing PEM certificate material.
#[derive(Debug, Error)]
pub enum PemError {
    /// The certificate file could not be read.
    #[error("Failed to read certificate at {path}: {source}")]
    CertificateReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The private key file could not be read.
    #[error("Failed to read private key at {path}: {source}")]
    PrivateKeyReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The PEM input was empty.
    #[error("Certificate PEM is empty")]
    Empty,

    /// The PEM block could not be decoded.
    #[error("Certificate is not a valid PEM: {0}")]
    InvalidPem(String),

    /// The PEM block decoded but did not contain a valid X.509 certificate.
    #[error("Certificate is not a valid X.509 certificate: {0}")]
    InvalidCertificate(String),
}

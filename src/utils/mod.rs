//! Utility functions and helpers

pub mod atomic_writer;
pub mod certificates;

pub use atomic_writer::{AtomicWriter, WriteError};
pub use certificates::{parse_certificate_pem, CertificateInfo};

/// Permissions for certificates, CA bundles and token files.
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Permissions for private keys.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

//! The two refresh workflows run by the engine.
//!
//! - `certificate`: identity certificate, key, CA and role certificates
//! - `token`: role and access tokens, cached in memory and on disk, served
//!   over HTTP

pub mod certificate;
pub mod token;

pub use certificate::{CertificateWorkflow, CredentialSource};
pub use token::TokenWorkflow;

use std::path::PathBuf;

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::utils::{AtomicWriter, CertificateInfo};

/// One file of a cycle's output batch.
pub(crate) struct PendingFile {
    path: PathBuf,
    mode: u32,
    bytes: Zeroizing<Vec<u8>>,
}

impl PendingFile {
    pub(crate) fn new(path: impl Into<PathBuf>, mode: u32, bytes: &[u8]) -> Self {
        Self { path: path.into(), mode, bytes: Zeroizing::new(bytes.to_vec()) }
    }
}

/// Write the batch through [`AtomicWriter`] on the blocking pool.
pub(crate) async fn write_files(files: Vec<PendingFile>) -> Result<usize> {
    if files.is_empty() {
        return Ok(0);
    }

    tokio::task::spawn_blocking(move || {
        let mut writer = AtomicWriter::new();
        for file in &files {
            writer.add_bytes(&file.path, file.mode, &file.bytes)?;
        }
        writer.commit()
    })
    .await
    .map_err(|e| Error::internal(format!("file writer task failed: {}", e)))?
    .map_err(Error::from)
}

pub(crate) fn log_certificate(kind: &str, info: Option<&CertificateInfo>) {
    match info {
        Some(info) => info!(
            kind,
            subject = %info.subject,
            issuer = %info.issuer,
            not_before = %info.not_before,
            not_after = %info.not_after,
            serial = %info.serial_number,
            dns_names = ?info.dns_names,
            "Received certificate"
        ),
        None => warn!(kind, "Received certificate could not be parsed for logging"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{PRIVATE_FILE_MODE, PUBLIC_FILE_MODE};

    #[tokio::test]
    async fn test_write_files_commits_batch() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            PendingFile::new(dir.path().join("a.pem"), PUBLIC_FILE_MODE, b"A"),
            PendingFile::new(dir.path().join("nested/b.pem"), PRIVATE_FILE_MODE, b"BB"),
        ];

        assert_eq!(write_files(files).await.unwrap(), 2);
        assert_eq!(std::fs::read(dir.path().join("a.pem")).unwrap(), b"A");
        assert_eq!(std::fs::read(dir.path().join("nested/b.pem")).unwrap(), b"BB");
    }

    #[tokio::test]
    async fn test_write_files_empty_batch() {
        assert_eq!(write_files(Vec::new()).await.unwrap(), 0);
    }
}

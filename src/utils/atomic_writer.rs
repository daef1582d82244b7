//! All-or-nothing batch writer for credential files.
//!
//! Every [`AtomicWriter::add_bytes`] call stages the content in a temporary
//! file next to its destination (same directory, so the final rename never
//! crosses a filesystem), fsyncs it and applies the requested permissions.
//! [`AtomicWriter::commit`] then renames every staged file into place.
//!
//! No destination is touched until the whole batch has been staged; if any
//! entry fails to stage, dropping the writer removes every temporary file and
//! the previous file set stays intact. Each rename is atomic, so a reader
//! never observes a truncated file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::errors::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("unable to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to commit {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    pub fn path(&self) -> &Path {
        match self {
            WriteError::Stage { path, .. } | WriteError::Commit { path, .. } => path,
        }
    }
}

impl From<WriteError> for Error {
    fn from(error: WriteError) -> Self {
        let path = error.path().to_path_buf();
        Error::persist(path, error.to_string())
    }
}

struct StagedFile {
    path: PathBuf,
    temp: NamedTempFile,
}

/// Accumulates the files produced by one refresh cycle.
#[derive(Default)]
pub struct AtomicWriter {
    staged: Vec<StagedFile>,
}

impl AtomicWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `bytes` for `path` with unix permissions `mode`.
    ///
    /// Staging the same path twice replaces the earlier entry.
    pub fn add_bytes(
        &mut self,
        path: impl AsRef<Path>,
        mode: u32,
        bytes: &[u8],
    ) -> Result<(), WriteError> {
        let path = path.as_ref().to_path_buf();
        let stage_err = |source| WriteError::Stage { path: path.clone(), source };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(stage_err)?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(stage_err)?;
        temp.write_all(bytes).map_err(stage_err)?;
        temp.as_file().sync_all().map_err(stage_err)?;
        set_mode(temp.as_file(), mode).map_err(stage_err)?;

        debug!(path = %path.display(), bytes = bytes.len(), mode = %format!("{:o}", mode), "Staged file");

        self.staged.retain(|staged| staged.path != path);
        self.staged.push(StagedFile { path, temp });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Move every staged file into place. Returns the number of files written.
    pub fn commit(self) -> Result<usize, WriteError> {
        let count = self.staged.len();
        for StagedFile { path, temp } in self.staged {
            temp.persist(&path)
                .map_err(|e| WriteError::Commit { path: path.clone(), source: e.error })?;
        }
        Ok(count)
    }
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

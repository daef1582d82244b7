//! # Error Handling
//!
//! Error types for the identity sidecar, built on `thiserror`.
//!
//! Sub-step failures inside a refresh cycle are handled where they happen;
//! only the aggregate [`Error`] of a cycle reaches the backoff controller.

pub mod pem;

pub use pem::PemError;

use std::path::PathBuf;

use crate::provider::ProviderError;

/// Custom result type for identity sidecar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the identity sidecar
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity provider or backup secret errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Certificate material could not be read or parsed
    #[error("Certificate error: {0}")]
    Pem(#[from] PemError),

    /// Credential files could not be staged or committed
    #[error("Failed to persist {path}: {message}")]
    Persist { path: PathBuf, message: String },

    /// Network transport errors (HTTP listener)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new persistence error for the given path
    pub fn persist<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Persist { path: path.into(), message: message.into() }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

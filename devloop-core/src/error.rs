//! Error types for devloop-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a [`Provider`](crate::provider::Provider) implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The named resource does not exist on the platform.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The platform rejected or failed the request.
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// Transport or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn request(operation: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Request {
            operation,
            message: message.into(),
        }
    }
}

/// Errors from loading or validating the application manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with serde_yaml's line context.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The manifest parsed but is not usable.
    #[error("invalid manifest: {0}")]
    Invalid(String),

    /// A service lookup by name failed.
    #[error("no such service: {0}")]
    NoSuchService(String),
}

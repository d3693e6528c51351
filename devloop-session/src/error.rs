//! Error types for devloop-session.

use std::path::PathBuf;

use thiserror::Error;

use devloop_core::{ManifestError, ProviderError};
use devloop_resolver::ResolveError;

/// Failures that abort a development session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("app required")]
    AppRequired,

    #[error("invalid generation: {0}")]
    InvalidGeneration(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation}: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Build sources for a service could not be derived.
    #[error("sync error: {service}: {source}")]
    Resolve {
        service: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

/// Failures while building or promoting an image.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build failed")]
    Failed,

    #[error("unknown build status: {0}")]
    UnknownStatus(String),

    #[error("build {0} has no release")]
    NoRelease(String),

    #[error("{operation}: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("build ignores: {0}")]
    Ignores(#[from] ResolveError),

    #[error("invalid repository {url}: {source}")]
    Repository {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The external image builder reported a failure.
    #[error("builder error: {0}")]
    Builder(String),

    #[error("source archive task failed: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn build_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BuildError {
    BuildError::Io {
        path: path.into(),
        source,
    }
}

/// Attach an operation name to a provider failure.
pub(crate) fn provider_err(operation: &'static str) -> impl FnOnce(ProviderError) -> SessionError {
    move |source| SessionError::Provider { operation, source }
}

pub(crate) fn build_provider_err(operation: &'static str) -> impl FnOnce(ProviderError) -> BuildError {
    move |source| BuildError::Provider { operation, source }
}

//! Error types for devloop-resolver.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while resolving build sources.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service names a build-instruction file that does not exist.
    #[error("no such file: {path}")]
    MissingBuildManifest { path: PathBuf },

    /// The image inspection command could not run or exited non-zero.
    #[error("inspect {image} failed: {message}")]
    Inspect { image: String, message: String },

    /// The image inspection command ran but printed something unexpected.
    #[error("inspect {image} returned invalid output: {source}")]
    InspectOutput {
        image: String,
        #[source]
        source: serde_json::Error,
    },

    /// A `.dockerignore` pattern could not be compiled.
    #[error("ignore pattern error: {0}")]
    Ignore(#[from] ignore::Error),
}

/// Convenience constructor for [`ResolveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.into(),
        source,
    }
}

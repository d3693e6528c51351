//! Error types for devloop-sync.

use std::path::PathBuf;

use thiserror::Error;

use devloop_core::ProviderError;

/// All errors that can arise from watching and syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target process could not report its working directory.
    #[error("{pid} pwd: {source}")]
    Pwd {
        pid: String,
        #[source]
        source: ProviderError,
    },

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// A blocking or spawned task panicked or was cancelled.
    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

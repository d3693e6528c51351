//! The shared error channel: many tasks report, one aggregator renders.

use std::fmt;

use tokio::sync::mpsc;

/// An error annotated with the operation and target it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub context: String,
    pub message: String,
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

impl std::error::Error for ReportedError {}

/// Create a reporter and the receiving end for the aggregator.
pub fn error_channel() -> (ErrorReporter, mpsc::UnboundedReceiver<ReportedError>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ErrorReporter { tx }, rx)
}

/// Write end of the error channel. Cloned into every task.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<ReportedError>,
}

impl ErrorReporter {
    /// Report `err` under `context`. Dropped silently once the aggregator is gone.
    pub fn report(&self, context: impl Into<String>, err: impl fmt::Display) {
        let reported = ReportedError {
            context: context.into(),
            message: err.to_string(),
        };
        tracing::debug!(error = %reported, "error reported");
        let _ = self.tx.send(reported);
    }
}

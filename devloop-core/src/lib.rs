//! Devloop core library: domain types, manifest, provider surface, and the
//! small concurrency primitives shared by every session task.
//!
//! - [`types`]: newtypes and platform resources
//! - [`manifest`]: application manifest loading
//! - [`provider`]: the [`Provider`] trait the session drives
//! - [`console`]: routed terminal output
//! - [`pipe`]: bounded byte pipe for streaming archives
//! - [`shutdown`] / [`report`]: cancellation and the shared error channel

pub mod console;
pub mod env;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod pipe;
pub mod provider;
pub mod report;
pub mod shutdown;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use console::{Console, Output, PrefixOutput, BUILD_TAG, CONTROL_TAG};
pub use error::{ManifestError, ProviderError};
pub use manifest::{Manifest, Service, ServiceBuild};
pub use provider::{LogStream, Provider};
pub use report::{error_channel, ErrorReporter, ReportedError};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use types::{
    App, Build, BuildSource, BuildStatus, Change, ChangeKind, Process, Release, ServiceName,
};

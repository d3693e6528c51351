//! # devloop-session
//!
//! The development session: build and promote, follow logs, sync sources,
//! report errors, and demote on the way out.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devloop_core::{Console, PrefixOutput, Provider};
//! use devloop_resolver::DockerInspector;
//! use devloop_session::{start_blocking, Session, StartOptions};
//!
//! fn dev(provider: Arc<dyn Provider>) -> Result<(), devloop_session::SessionError> {
//!     let console = Console::new(Arc::new(PrefixOutput::new(["web"], true)));
//!     let session = Session::new(provider, console, Arc::new(DockerInspector::default()));
//!     start_blocking(session, StartOptions::new("myapp", "."))
//! }
//! ```

pub mod aggregator;
pub mod build;
pub mod error;
pub mod logs;
pub mod runtime;
pub mod session;
pub mod source;

pub use aggregator::aggregate_errors;
pub use build::{BuildOrchestrator, ExternalBuildOptions, ImageBuilder};
pub use error::{BuildError, SessionError};
pub use logs::{LogLine, LogStreamMultiplexer};
pub use runtime::{init_tracing, start_blocking};
pub use session::{Session, StartOptions, Timings};

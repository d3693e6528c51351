//! # devloop-resolver
//!
//! Static analysis of a service's build instructions.
//!
//! [`resolve_build_sources`] reads the service's Dockerfile and derives the
//! minimal set of local directories that must be mirrored into which remote
//! container paths. [`load_ignores`] loads the build-ignore rules applied
//! while watching those directories.

pub mod dockerfile;
pub mod error;
pub mod ignores;
pub mod inspect;

pub use dockerfile::{dedupe, resolve_build_sources};
pub use error::ResolveError;
pub use ignores::{load_ignore_file, load_ignores, BuildIgnores};
pub use inspect::{DockerInspector, ImageInspector};

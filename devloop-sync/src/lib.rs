//! # devloop-sync
//!
//! Turns filesystem changes under a build source into file transfers on the
//! live processes of a service.
//!
//! - [`batch`]: per-tick change accumulation and add/remove partitioning
//! - [`archive`]: tar encoding of added files
//! - [`engine`]: [`SyncEngine`], applying a partitioned batch to every process
//! - [`watcher`]: [`ChangeWatcher`], one watch/batch task per build source

pub mod archive;
pub mod batch;
pub mod engine;
pub mod error;
pub mod watcher;

pub use batch::{partition, Batch};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use watcher::{run_batches, BatchHandler, ChangeWatcher, BATCH_INTERVAL};

//! Domain types shared across the devloop crates.
//!
//! Local filesystem paths use `PathBuf`. Remote container paths are plain
//! POSIX strings because they never touch the local filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed service name from the application manifest.
///
/// Service names double as the routing key for console output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl ServiceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Sync model
// ---------------------------------------------------------------------------

/// A resolved (local directory, remote directory) pair kept in sync.
///
/// `local` is absolute; directories carry a trailing separator. `remote` may
/// be relative, in which case it is resolved against the working directory of
/// each target process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSource {
    pub local: PathBuf,
    pub remote: String,
}

impl BuildSource {
    pub fn new(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// Remote path for display; an empty remote means the process working dir.
    pub fn remote_label(&self) -> &str {
        if self.remote.is_empty() {
            "."
        } else {
            &self.remote
        }
    }
}

/// Whether a path appeared/changed or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
}

/// One filesystem change under a watched root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    /// Watched root the change was observed under.
    pub base: PathBuf,
    /// Path relative to `base`; empty when the watched root is a single file.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Change {
    pub fn add(base: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            kind: ChangeKind::Add,
        }
    }

    pub fn remove(base: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            kind: ChangeKind::Remove,
        }
    }

    /// Absolute local path of the changed file.
    pub fn local_path(&self) -> PathBuf {
        if self.path.as_os_str().is_empty() {
            self.base.clone()
        } else {
            self.base.join(&self.path)
        }
    }

    /// The relative path as a forward-slash string, the form used remotely.
    pub fn remote_relative(&self) -> String {
        relative_to_posix(&self.path)
    }
}

fn relative_to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Platform resources
// ---------------------------------------------------------------------------

/// An application on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub generation: String,
    /// Id of the currently active release; empty when never released.
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub status: String,
}

/// Rack-level system information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct System {
    pub name: String,
}

/// Object stored in the platform object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub url: String,
}

/// Lifecycle status of a build as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildStatus {
    Created,
    Running,
    Complete,
    Failed,
    Unknown(String),
}

impl From<&str> for BuildStatus {
    fn from(s: &str) -> Self {
        match s {
            "created" => BuildStatus::Created,
            "running" => BuildStatus::Running,
            "complete" => BuildStatus::Complete,
            "failed" => BuildStatus::Failed,
            other => BuildStatus::Unknown(other.to_string()),
        }
    }
}

impl From<String> for BuildStatus {
    fn from(s: String) -> Self {
        BuildStatus::from(s.as_str())
    }
}

impl From<BuildStatus> for String {
    fn from(status: BuildStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Created => write!(f, "created"),
            BuildStatus::Running => write!(f, "running"),
            BuildStatus::Complete => write!(f, "complete"),
            BuildStatus::Failed => write!(f, "failed"),
            BuildStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// A build job owned by the platform. Devloop polls it, never mutates status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    pub app: String,
    pub status: BuildStatus,
    #[serde(default)]
    pub release: String,
    /// Push repository URL for external builds, may embed credentials.
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub app: String,
    #[serde(default)]
    pub build: String,
}

/// A running process (container instance) of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id: String,
    pub service: String,
}

// ---------------------------------------------------------------------------
// Provider call options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppCreateOptions {
    pub generation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildCreateOptions {
    pub development: bool,
    pub external: bool,
    /// Manifest file name, when not the default.
    pub manifest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildUpdateOptions {
    pub manifest: Option<String>,
    pub release: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseCreateOptions {
    pub build: Option<String>,
    pub description: Option<String>,
}

/// Knobs for a release promotion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleasePromoteOptions {
    pub development: Option<bool>,
    pub force: Option<bool>,
    pub idle: Option<bool>,
    pub min: Option<u32>,
    pub timeout: Option<u32>,
}

impl ReleasePromoteOptions {
    /// Relaxed rollout used while developing: replace instances immediately.
    pub fn development() -> Self {
        Self {
            development: Some(true),
            force: Some(true),
            idle: Some(false),
            min: Some(0),
            timeout: Some(300),
        }
    }

    /// Standard rollout semantics restored on teardown.
    pub fn standard() -> Self {
        Self {
            development: Some(false),
            force: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogsOptions {
    pub prefix: bool,
    pub since: Option<Duration>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

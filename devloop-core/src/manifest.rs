//! Application manifest (`convox.yml`) loading.
//!
//! Only the parts a development session needs are modelled: each service's
//! build directory, build-instruction file, and optional prebuilt image.
//!
//! ```yaml
//! services:
//!   web:
//!     build: .
//!   worker:
//!     build:
//!       path: worker
//!       manifest: Dockerfile.dev
//!   redis:
//!     image: redis:7
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::env::substitute_env;
use crate::error::ManifestError;
use crate::types::ServiceName;

/// Manifest file name used when none is given.
pub const DEFAULT_MANIFEST: &str = "convox.yml";

/// Build-instruction file name used when a service does not name one.
pub const DEFAULT_BUILD_MANIFEST: &str = "Dockerfile";

static RE_SERVICE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("static service name pattern"));

/// Where and how a service is built from source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBuild {
    /// Build directory relative to the application root; empty when the
    /// service is not built from source.
    pub path: String,
    /// Build-instruction file relative to `path`.
    pub manifest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: ServiceName,
    pub build: ServiceBuild,
    /// An explicit image disables source building and syncing.
    pub image: Option<String>,
}

impl Service {
    /// Whether local sources can be synced into this service.
    pub fn is_source_built(&self) -> bool {
        self.image.is_none() && !self.build.path.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    /// Services sorted by name.
    pub services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    services: BTreeMap<String, Option<RawService>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    build: Option<RawBuild>,
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBuild {
    Path(String),
    Full {
        path: Option<String>,
        manifest: Option<String>,
    },
}

impl Manifest {
    /// Parse manifest text, substituting `${VAR}` references from `env` first.
    pub fn load(data: &str, env: &HashMap<String, String>) -> Result<Self, ManifestError> {
        let expanded = substitute_env(data, env);
        let raw: RawManifest = serde_yaml::from_str(&expanded)?;

        let services = raw
            .services
            .into_iter()
            .map(|(name, raw)| {
                let raw = raw.unwrap_or_default();
                let image = raw.image.filter(|i| !i.trim().is_empty());
                let (path, manifest) = match raw.build {
                    Some(RawBuild::Path(path)) => (path, None),
                    Some(RawBuild::Full { path, manifest }) => (path.unwrap_or_default(), manifest),
                    None => (String::new(), None),
                };
                let path = if path.is_empty() && image.is_none() {
                    ".".to_string()
                } else {
                    path
                };
                Service {
                    name: ServiceName(name),
                    build: ServiceBuild {
                        path,
                        manifest: manifest.unwrap_or_else(|| DEFAULT_BUILD_MANIFEST.to_string()),
                    },
                    image,
                }
            })
            .collect();

        Ok(Manifest { services })
    }

    /// Read and parse a manifest file.
    pub fn load_file(path: &Path, env: &HashMap<String, String>) -> Result<Self, ManifestError> {
        let data = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&data, env)
    }

    /// Check the manifest is usable for a development session.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.services.is_empty() {
            return Err(ManifestError::Invalid("no services defined".to_string()));
        }
        for service in &self.services {
            if !RE_SERVICE_NAME.is_match(service.name.as_str()) {
                return Err(ManifestError::Invalid(format!(
                    "service name '{}' must be lowercase alphanumerics and hyphens, starting with a letter",
                    service.name
                )));
            }
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Result<&Service, ManifestError> {
        self.services
            .iter()
            .find(|s| s.name.as_str() == name)
            .ok_or_else(|| ManifestError::NoSuchService(name.to_string()))
    }
}

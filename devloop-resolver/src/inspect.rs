//! Base-image inspection.
//!
//! A `FROM` line seeds the analysis with the base image's configured
//! environment and working directory. Looking those up needs a container
//! runtime, so it sits behind [`ImageInspector`].

use std::process::Command;

use crate::error::ResolveError;

pub trait ImageInspector: Send + Sync {
    /// The image's configured environment as raw `KEY=VALUE` entries.
    ///
    /// A [`ResolveError::Inspect`] here is tolerated by the resolver (the
    /// image may simply not be present locally); any other error is fatal.
    fn env(&self, image: &str) -> Result<Vec<String>, ResolveError>;

    /// The image's configured working directory, empty when unset.
    fn working_dir(&self, image: &str) -> Result<String, ResolveError>;
}

/// Inspects images through the `docker` command line.
#[derive(Debug, Clone)]
pub struct DockerInspector {
    binary: String,
}

impl Default for DockerInspector {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerInspector {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn inspect(&self, image: &str, format: &str) -> Result<Vec<u8>, ResolveError> {
        let output = Command::new(&self.binary)
            .args(["inspect", image, "--format", format])
            .output()
            .map_err(|err| ResolveError::Inspect {
                image: image.to_string(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            return Err(ResolveError::Inspect {
                image: image.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl ImageInspector for DockerInspector {
    fn env(&self, image: &str) -> Result<Vec<String>, ResolveError> {
        let data = self.inspect(image, "{{json .Config.Env}}")?;
        parse_env_json(image, &data)
    }

    fn working_dir(&self, image: &str) -> Result<String, ResolveError> {
        let data = self.inspect(image, "{{.Config.WorkingDir}}")?;
        Ok(String::from_utf8_lossy(&data).trim().to_string())
    }
}

/// `{{json .Config.Env}}` prints a JSON array, or `null` for no environment.
fn parse_env_json(image: &str, data: &[u8]) -> Result<Vec<String>, ResolveError> {
    let entries: Option<Vec<String>> =
        serde_json::from_slice(data).map_err(|source| ResolveError::InspectOutput {
            image: image.to_string(),
            source,
        })?;
    Ok(entries.unwrap_or_default())
}

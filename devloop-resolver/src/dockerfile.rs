//! Build-source resolution from Dockerfile instructions.
//!
//! ## Analysis
//!
//! 1. Walk the file line by line, dispatching on the first token:
//!    `FROM`, `ENV`, `WORKDIR`, `ADD`/`COPY`. Everything else is ignored.
//! 2. `FROM` seeds the environment and working directory from the base image.
//! 3. `ADD`/`COPY` record a `local -> remote` pair unless they copy from a
//!    build stage (`--from=`) or a URL.
//! 4. Locals are made absolute and stat'ed; directories get a trailing
//!    separator. A remote of `.` becomes the final working directory.
//! 5. [`dedupe`] drops every pair already covered by a consistently mapped
//!    parent pair.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

use once_cell::sync::Lazy;
use regex::Regex;

use devloop_core::env::substitute_env;
use devloop_core::paths::{clean_remote, is_remote_absolute, join_remote, remote_relative};
use devloop_core::{BuildSource, Service};

use crate::error::{io_err, ResolveError};
use crate::inspect::ImageInspector;

static RE_DOCKER_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--([A-Za-z-]+)").expect("static docker option pattern"));

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Resolve the deduplicated build sources of `service` under app `root`.
///
/// Services with an explicit image have nothing to sync and yield an empty
/// list.
pub fn resolve_build_sources(
    root: &Path,
    service: &Service,
    inspector: &dyn ImageInspector,
) -> Result<Vec<BuildSource>, ResolveError> {
    if !service.is_source_built() {
        return Ok(Vec::new());
    }

    let root = absolute(root)?;
    let build_dir = root.join(&service.build.path);
    let dockerfile = build_dir.join(&service.build.manifest);
    let data = match fs::read_to_string(&dockerfile) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ResolveError::MissingBuildManifest {
                path: Path::new(&service.build.path).join(&service.build.manifest),
            });
        }
        Err(err) => return Err(io_err(&dockerfile, err)),
    };

    let analysis = analyze(&data, &build_dir, inspector)?;
    let sources = analysis.finalize()?;
    let sources = dedupe(sources);

    tracing::debug!(
        service = %service.name,
        sources = sources.len(),
        "resolved build sources",
    );
    Ok(sources)
}

// ---------------------------------------------------------------------------
// Instruction analysis
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingSource {
    local: PathBuf,
    remote: String,
    /// The destination names a directory even when the source is a file.
    remote_is_dir: bool,
}

/// Running state carried across instruction lines.
#[derive(Debug, Default)]
pub(crate) struct Analysis {
    env: HashMap<String, String>,
    wd: String,
    sources: Vec<PendingSource>,
}

pub(crate) fn analyze(
    data: &str,
    build_dir: &Path,
    inspector: &dyn ImageInspector,
) -> Result<Analysis, ResolveError> {
    let mut state = Analysis::default();

    for line in data.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(instruction) = parts.first() else {
            continue;
        };

        match instruction.to_ascii_uppercase().as_str() {
            "ADD" | "COPY" => state.copy(&parts[1..], build_dir),
            "ENV" => state.env_instruction(&parts[1..]),
            "FROM" => state.from(&parts[1..], inspector)?,
            "WORKDIR" => state.workdir(&parts[1..]),
            _ => {}
        }
    }

    Ok(state)
}

impl Analysis {
    fn copy(&mut self, args: &[&str], build_dir: &Path) {
        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            if let Some(caps) = RE_DOCKER_OPTION.captures(arg) {
                if caps[1].eq_ignore_ascii_case("from") {
                    return;
                }
                continue;
            }
            operands.push(*arg);
        }

        let Some((dst, srcs)) = operands.split_last() else {
            return;
        };
        if srcs.is_empty() {
            return;
        }

        let mut remote = substitute_env(dst, &self.env);
        let remote_is_dir = names_directory(&remote) || srcs.len() > 1;
        if !self.wd.is_empty() && !is_remote_absolute(&remote) {
            remote = join_remote(&self.wd, &remote);
        } else if remote != "." {
            remote = clean_remote(&remote);
        }

        for src in srcs {
            if is_url(src) {
                continue;
            }
            self.sources.push(PendingSource {
                local: build_dir.join(src),
                remote: remote.clone(),
                remote_is_dir,
            });
        }
    }

    fn env_instruction(&mut self, args: &[&str]) {
        let Some(first) = args.first() else {
            return;
        };

        if first.contains('=') {
            for pair in args {
                if let Some((key, value)) = pair.split_once('=') {
                    let value = substitute_env(unquote(value), &self.env);
                    self.env.insert(key.to_string(), value);
                }
            }
        } else if args.len() > 1 {
            let value = substitute_env(unquote(&args[1..].join(" ")), &self.env);
            self.env.insert(first.to_string(), value);
        }
    }

    fn from(&mut self, args: &[&str], inspector: &dyn ImageInspector) -> Result<(), ResolveError> {
        let Some(image) = args.iter().find(|a| !a.starts_with("--")) else {
            return Ok(());
        };

        let entries = match inspector.env(image) {
            Ok(entries) => entries,
            Err(ResolveError::Inspect { message, .. }) => {
                tracing::debug!(image = %image, error = %message, "skipping uninspectable base image");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        for entry in entries {
            if let Some((key, value)) = entry.split_once('=') {
                self.env.insert(key.to_string(), value.to_string());
            }
        }

        self.wd = inspector.working_dir(image)?.trim().to_string();
        Ok(())
    }

    fn workdir(&mut self, args: &[&str]) {
        let Some(dir) = args.first() else {
            return;
        };
        let dir = substitute_env(dir, &self.env);
        self.wd = if is_remote_absolute(&dir) || self.wd.is_empty() {
            clean_remote(&dir)
        } else {
            join_remote(&self.wd, &dir)
        };
    }

    /// Absolutize and stat every local, and settle `.` destinations.
    pub(crate) fn finalize(self) -> Result<Vec<BuildSource>, ResolveError> {
        let mut out = Vec::with_capacity(self.sources.len());
        for pending in self.sources {
            let local = clean_local(&absolute(&pending.local)?);
            let meta = fs::metadata(&local).map_err(|e| io_err(&local, e))?;

            let mut remote = if pending.remote == "." {
                self.wd.clone()
            } else {
                pending.remote
            };

            let local = if meta.is_dir() {
                with_trailing_separator(local)
            } else {
                if pending.remote_is_dir {
                    if let Some(name) = local.file_name() {
                        remote = join_remote(&remote, &name.to_string_lossy());
                    }
                }
                local
            };

            out.push(BuildSource { local, remote });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// Drop every source already covered by another one.
///
/// `outer` covers `inner` when `inner.local` lies at or beneath
/// `outer.local` and the relative offset between the locals equals the
/// relative offset between the remotes: syncing `outer` already delivers
/// every file of `inner` to the same place. Of two identical entries the
/// first is kept. Input order is otherwise preserved.
pub fn dedupe(sources: Vec<BuildSource>) -> Vec<BuildSource> {
    let redundant: Vec<bool> = (0..sources.len())
        .map(|i| {
            (0..sources.len()).any(|j| {
                j != i
                    && covers(&sources[j], &sources[i])
                    && (j < i || !covers(&sources[i], &sources[j]))
            })
        })
        .collect();

    sources
        .into_iter()
        .zip(redundant)
        .filter_map(|(source, redundant)| (!redundant).then_some(source))
        .collect()
}

fn covers(outer: &BuildSource, inner: &BuildSource) -> bool {
    let Ok(rel) = inner.local.strip_prefix(&outer.local) else {
        return false;
    };
    let rel_local = posix_relative(rel);
    remote_relative(&outer.remote, &inner.remote).is_some_and(|rel_remote| rel_remote == rel_local)
}

fn posix_relative(rel: &Path) -> String {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// A destination that can only be a directory: `dir/`, `.`, `..`, `dir/.`.
fn names_directory(dst: &str) -> bool {
    dst.ends_with('/')
        || matches!(dst, "." | "..")
        || dst.ends_with("/.")
        || dst.ends_with("/..")
}

fn is_url(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn absolute(path: &Path) -> Result<PathBuf, ResolveError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| io_err(path, e))?;
    Ok(cwd.join(path))
}

/// Lexically resolve `.` and `..` components.
fn clean_local(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn with_trailing_separator(path: PathBuf) -> PathBuf {
    let mut raw: OsString = path.into_os_string();
    if !raw.to_string_lossy().ends_with(MAIN_SEPARATOR_STR) {
        raw.push(MAIN_SEPARATOR_STR);
    }
    PathBuf::from(raw)
}

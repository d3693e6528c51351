//! Build-ignore (`.dockerignore`) rules applied while watching sources.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use devloop_core::Service;

use crate::error::{io_err, ResolveError};

pub const IGNORE_FILE: &str = ".dockerignore";

/// Compiled ignore patterns anchored at the directory holding the file.
#[derive(Debug, Clone)]
pub struct BuildIgnores {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl BuildIgnores {
    /// No patterns: nothing is ignored.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            matcher: Gitignore::empty(),
            root,
            patterns: Vec::new(),
        }
    }

    pub fn from_patterns(
        root: impl Into<PathBuf>,
        patterns: Vec<String>,
    ) -> Result<Self, ResolveError> {
        let root = root.into();
        let mut builder = GitignoreBuilder::new(&root);
        for pattern in &patterns {
            builder.add_line(None, &anchored(pattern))?;
        }
        Ok(Self {
            matcher: builder.build()?,
            root,
            patterns,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` (absolute) or any of its parents is excluded.
    ///
    /// Paths outside the ignore root are never ignored.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return false;
        };
        if rel.as_os_str().is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(rel, is_dir)
            .is_ignore()
    }
}

/// Root-anchored form of a pattern; depth only comes from an explicit `**`.
fn anchored(pattern: &str) -> String {
    match pattern.strip_prefix('!') {
        Some(rest) => format!("!/{}", rest.trim_start_matches('/')),
        None => format!("/{}", pattern.trim_start_matches('/')),
    }
}

/// Patterns from an ignore file: one per line, `#` comments and blanks dropped.
pub fn read_patterns(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches("./").to_string())
        .collect()
}

/// Load the ignore rules for `service`.
///
/// The service's build directory is checked first, then the application
/// root. With neither present the result ignores nothing.
pub fn load_ignores(root: &Path, service: &Service) -> Result<BuildIgnores, ResolveError> {
    let build_dir = root.join(&service.build.path);
    for dir in [build_dir.as_path(), root] {
        if let Some(ignores) = load_ignore_file(dir)? {
            return Ok(ignores);
        }
    }
    Ok(BuildIgnores::empty(build_dir))
}

/// The rules of the ignore file directly inside `dir`, if there is one.
pub fn load_ignore_file(dir: &Path) -> Result<Option<BuildIgnores>, ResolveError> {
    let path = dir.join(IGNORE_FILE);
    match fs::read_to_string(&path) {
        Ok(data) => {
            tracing::debug!(path = %path.display(), "loaded build ignores");
            BuildIgnores::from_patterns(dir, read_patterns(&data)).map(Some)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(&path, err)),
    }
}

//! Gzipped source tarball uploaded for in-platform builds.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use ignore::WalkBuilder;

use devloop_resolver::load_ignore_file;

use crate::error::{build_io_err, BuildError};

/// Archive every file under `root`, honoring the root build-ignore file.
///
/// Entry names are relative to `root`. Version-control ignore files and
/// nested `.dockerignore` files play no part.
pub fn tarball(root: &Path) -> Result<Vec<u8>, BuildError> {
    let ignores = load_ignore_file(root)?;
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    if let Some(ignores) = ignores {
        walker.filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !ignores.is_ignored(entry.path(), is_dir)
        });
    }

    for entry in walker.build() {
        let entry = entry?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        let Ok(name) = path.strip_prefix(root) else {
            continue;
        };
        builder
            .append_path_with_name(path, name)
            .map_err(|e| build_io_err(path, e))?;
    }

    let encoder = builder.into_inner().map_err(|e| build_io_err(root, e))?;
    encoder.finish().map_err(|e| build_io_err(root, e))
}

//! Tar encoding of added files.

use std::fs::{self, File, Metadata};
use std::io::{ErrorKind, Read, Write};
use std::time::UNIX_EPOCH;

use devloop_core::paths::join_remote;
use devloop_core::Change;

use crate::error::{io_err, SyncError};

/// Stream one regular-file entry per add into `out`.
///
/// Entries are named `remote_dir/<relative path>` without the leading `/`.
/// Files that vanished since the change was observed are skipped, as are
/// directories. Any other read failure aborts the archive. Returns the
/// number of entries written.
pub fn write_archive<W: Write>(out: W, remote_dir: &str, adds: &[Change]) -> Result<usize, SyncError> {
    let mut builder = tar::Builder::new(out);
    let mut written = 0;

    for add in adds {
        let local = add.local_path();
        let meta = match fs::metadata(&local) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %local.display(), "skipping vanished file");
                continue;
            }
            Err(err) => return Err(io_err(&local, err)),
        };
        if meta.is_dir() {
            continue;
        }
        let file = match File::open(&local) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %local.display(), "skipping vanished file");
                continue;
            }
            Err(err) => return Err(io_err(&local, err)),
        };

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(meta.len());
        header.set_mode(file_mode(&meta));
        header.set_mtime(mtime_seconds(&meta));

        let name = entry_name(remote_dir, &add.remote_relative());
        builder
            .append_data(&mut header, &name, file.take(meta.len()))
            .map_err(|e| io_err(&local, e))?;
        written += 1;
    }

    builder
        .into_inner()
        .and_then(|mut out| out.flush())
        .map_err(|e| io_err(remote_dir, e))?;
    Ok(written)
}

/// Archive entry name for `rel` under `remote_dir`.
pub fn entry_name(remote_dir: &str, rel: &str) -> String {
    let joined = join_remote(remote_dir, rel);
    joined.trim_start_matches('/').to_string()
}

#[cfg(unix)]
fn file_mode(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn mtime_seconds(meta: &Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

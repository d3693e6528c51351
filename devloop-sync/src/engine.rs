//! Applies partitioned change batches to the live processes of a service.

use std::io::ErrorKind;
use std::sync::Arc;

use devloop_core::paths::{clean_remote, is_remote_absolute, join_remote};
use devloop_core::pipe::pipe;
use devloop_core::{BuildSource, Change, Console, ErrorReporter, Provider, ServiceName};

use crate::archive::write_archive;
use crate::error::{io_err, SyncError};

/// Above this many files a batch is announced with one summary line.
pub const SUMMARY_THRESHOLD: usize = 3;

/// Unread archive chunks buffered between the tar writer and the upload.
pub const PIPE_CAPACITY: usize = 16;

pub struct SyncEngine {
    provider: Arc<dyn Provider>,
    app: String,
    console: Console,
    errors: ErrorReporter,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        app: impl Into<String>,
        console: Console,
        errors: ErrorReporter,
    ) -> Self {
        Self {
            provider,
            app: app.into(),
            console,
            errors,
        }
    }

    /// Push one batch to every running process of `service`.
    ///
    /// Failures are reported on the error channel; nothing here stops the
    /// session.
    pub async fn apply(
        &self,
        service: &ServiceName,
        source: &BuildSource,
        adds: &[Change],
        removes: &[Change],
    ) {
        if adds.is_empty() && removes.is_empty() {
            return;
        }
        let processes = match self
            .provider
            .process_list(&self.app, Some(service.as_str()))
            .await
        {
            Ok(processes) => processes,
            Err(err) => {
                self.errors.report(format!("sync {service}"), err);
                return;
            }
        };

        for process in processes {
            let remote = match self.resolve_remote(&process.id, &source.remote).await {
                Ok(remote) => remote,
                Err(err) => {
                    self.errors
                        .report(format!("sync {service}:{}", source.remote_label()), err);
                    continue;
                }
            };

            for line in add_messages(service, source, adds) {
                self.console.control(line);
            }
            if let Err(err) = self.handle_adds(&process.id, &remote, adds).await {
                self.errors.report(
                    format!("sync add {service}:{}", source.remote_label()),
                    err,
                );
            }

            for line in remove_messages(service, source, removes) {
                self.console.control(line);
            }
            if let Err(err) = self.handle_removes(&process.id, &remote, removes).await {
                self.errors.report(
                    format!("sync remove {service}:{}", source.remote_label()),
                    err,
                );
            }
        }
    }

    /// Stream `adds` as a tar archive into process `pid`, rooted at the
    /// resolved directory `remote`.
    pub async fn handle_adds(&self, pid: &str, remote: &str, adds: &[Change]) -> Result<(), SyncError> {
        if adds.is_empty() {
            return Ok(());
        }

        let (mut writer, reader) = pipe(PIPE_CAPACITY);

        let upload = {
            let provider = Arc::clone(&self.provider);
            let app = self.app.clone();
            let pid = pid.to_string();
            tokio::spawn(async move { provider.files_upload(&app, &pid, reader).await })
        };

        let archive = {
            let adds = adds.to_vec();
            let remote = remote.to_string();
            tokio::task::spawn_blocking(move || match write_archive(&mut writer, &remote, &adds) {
                Ok(written) => writer
                    .finish()
                    .map(|()| written)
                    .map_err(|e| io_err(&remote, e)),
                Err(err) => {
                    writer.abort(err.to_string());
                    Err(err)
                }
            })
        };

        let archived = archive.await.map_err(|e| SyncError::Join {
            task: "archive",
            message: e.to_string(),
        })?;
        let uploaded = upload.await.map_err(|e| SyncError::Join {
            task: "upload",
            message: e.to_string(),
        })?;

        match (archived, uploaded) {
            (Ok(written), Ok(())) => {
                tracing::debug!(pid, remote = %remote, files = written, "uploaded archive");
                Ok(())
            }
            (Err(SyncError::Io { source, .. }), Err(err)) if source.kind() == ErrorKind::BrokenPipe => {
                Err(err.into())
            }
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err.into()),
        }
    }

    /// Delete `removes` from process `pid` in a single request.
    pub async fn handle_removes(
        &self,
        pid: &str,
        remote: &str,
        removes: &[Change],
    ) -> Result<(), SyncError> {
        if removes.is_empty() {
            return Ok(());
        }
        let files = removes
            .iter()
            .map(|change| join_remote(remote, &change.remote_relative()))
            .collect();
        self.provider.files_delete(&self.app, pid, files).await?;
        Ok(())
    }

    /// Absolute remote directory; relative ones resolve against the process cwd.
    pub async fn resolve_remote(&self, pid: &str, remote: &str) -> Result<String, SyncError> {
        if is_remote_absolute(remote) {
            return Ok(clean_remote(remote));
        }
        let pwd = self
            .provider
            .process_exec(&self.app, pid, "pwd")
            .await
            .map_err(|source| SyncError::Pwd {
                pid: pid.to_string(),
                source,
            })?;
        Ok(join_remote(pwd.trim(), remote))
    }
}

/// Progress lines for a batch of adds on one process.
pub fn add_messages(service: &ServiceName, source: &BuildSource, adds: &[Change]) -> Vec<String> {
    let remote = source.remote_label();
    if adds.len() > SUMMARY_THRESHOLD {
        return vec![format!(
            "sync: {} files to <dir>{remote}</dir> on <service>{service}</service>",
            adds.len()
        )];
    }
    adds.iter()
        .map(|add| {
            format!(
                "sync: <dir>{}</dir> to <dir>{remote}</dir> on <service>{service}</service>",
                display_path(add)
            )
        })
        .collect()
}

/// Progress lines for a batch of removes on one process.
pub fn remove_messages(
    service: &ServiceName,
    source: &BuildSource,
    removes: &[Change],
) -> Vec<String> {
    let remote = source.remote_label();
    if removes.len() > SUMMARY_THRESHOLD {
        return vec![format!(
            "remove: {} files from <dir>{remote}</dir> on <service>{service}</service>",
            removes.len()
        )];
    }
    removes
        .iter()
        .map(|remove| {
            format!(
                "remove: <dir>{}</dir> from <dir>{remote}</dir> on <service>{service}</service>",
                display_path(remove)
            )
        })
        .collect()
}

fn display_path(change: &Change) -> String {
    let rel = change.remote_relative();
    if rel.is_empty() {
        change
            .base
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        rel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> BuildSource {
        BuildSource::new("/src/app/", "/app")
    }

    fn adds(n: usize) -> Vec<Change> {
        (0..n).map(|i| Change::add("/src/app/", format!("f{i}.rs"))).collect()
    }

    #[test]
    fn small_batches_list_each_file() {
        let lines = add_messages(&"web".into(), &source(), &adds(3));
        assert_eq!(
            lines,
            [
                "sync: <dir>f0.rs</dir> to <dir>/app</dir> on <service>web</service>",
                "sync: <dir>f1.rs</dir> to <dir>/app</dir> on <service>web</service>",
                "sync: <dir>f2.rs</dir> to <dir>/app</dir> on <service>web</service>",
            ]
        );
    }

    #[test]
    fn large_batches_are_summarised() {
        let lines = add_messages(&"web".into(), &source(), &adds(4));
        assert_eq!(lines, ["sync: 4 files to <dir>/app</dir> on <service>web</service>"]);

        let removes: Vec<Change> = adds(5)
            .into_iter()
            .map(|c| Change::remove(c.base, c.path))
            .collect();
        let lines = remove_messages(&"web".into(), &source(), &removes);
        assert_eq!(lines, ["remove: 5 files from <dir>/app</dir> on <service>web</service>"]);
    }

    #[test]
    fn single_file_sources_show_file_name() {
        let source = BuildSource::new("/src/app/package.json", "/app/package.json");
        let lines = add_messages(&"web".into(), &source, &[Change::add("/src/app/package.json", "")]);
        assert_eq!(
            lines,
            ["sync: <dir>package.json</dir> to <dir>/app/package.json</dir> on <service>web</service>"]
        );
    }
}

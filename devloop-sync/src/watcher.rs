//! One watch-and-batch task per build source.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use devloop_core::{BuildSource, Change, Console, ServiceName, Shutdown};
use devloop_resolver::BuildIgnores;

use crate::batch::{partition, Batch};
use crate::engine::SyncEngine;
use crate::error::SyncError;

/// How often accumulated changes are flushed.
pub const BATCH_INTERVAL: Duration = Duration::from_millis(1000);

/// Receives each non-empty, partitioned batch.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn flush(&self, adds: Vec<Change>, removes: Vec<Change>);
}

/// Accumulate changes and hand them to `handler` once per `interval`.
///
/// Empty ticks do nothing. A flush in progress runs to completion; changes
/// still buffered when cancellation arrives are discarded.
pub async fn run_batches(
    mut changes: mpsc::UnboundedReceiver<Change>,
    interval: Duration,
    handler: &dyn BatchHandler,
    mut shutdown: Shutdown,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch = Batch::default();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            change = changes.recv() => {
                let Some(change) = change else {
                    tracing::debug!("change source closed");
                    break;
                };
                batch.push(change);
            }
            _ = ticker.tick() => {
                if batch.is_empty() {
                    continue;
                }
                let (adds, removes) = partition(batch.take());
                handler.flush(adds, removes).await;
            }
        }
    }

    if !batch.is_empty() {
        tracing::debug!(pending = batch.len(), "discarding unflushed changes");
    }
}

/// Changes implied by one filesystem event under `base`.
///
/// `watch_root` is the canonical form of `base` that event paths arrive in.
/// A path that exists is an add, one that does not is a remove. Directories
/// and ignored paths produce nothing.
pub fn changes_from_event(
    base: &Path,
    watch_root: &Path,
    event: &Event,
    ignores: &BuildIgnores,
) -> Vec<Change> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    let mut changes = Vec::new();
    for path in &event.paths {
        let Ok(rel) = path.strip_prefix(watch_root) else {
            continue;
        };
        let local = if rel.as_os_str().is_empty() {
            base.to_path_buf()
        } else {
            base.join(rel)
        };
        let meta = fs::metadata(path).ok();
        let is_dir = meta.as_ref().is_some_and(|m| m.is_dir());
        if ignores.is_ignored(&local, is_dir) {
            continue;
        }
        match meta {
            Some(meta) if meta.is_dir() => continue,
            Some(_) => changes.push(Change::add(base, rel)),
            None => changes.push(Change::remove(base, rel)),
        }
    }
    changes
}

/// Watches one build source and syncs its changes into a service.
pub struct ChangeWatcher {
    service: ServiceName,
    source: BuildSource,
    ignores: BuildIgnores,
    engine: Arc<SyncEngine>,
    console: Console,
    app_root: PathBuf,
    interval: Duration,
}

impl ChangeWatcher {
    pub fn new(
        service: ServiceName,
        source: BuildSource,
        ignores: BuildIgnores,
        engine: Arc<SyncEngine>,
        console: Console,
        app_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            source,
            ignores,
            engine,
            console,
            app_root: app_root.into(),
            interval: BATCH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Watch until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), SyncError> {
        let base = self.source.local.clone();
        self.console.control(format!(
            "starting sync from <dir>{}</dir> to <dir>{}</dir> on <service>{}</service>",
            self.display_local(),
            self.source.remote_label(),
            self.service
        ));

        // Event paths arrive canonicalized on some platforms.
        let watch_root = fs::canonicalize(&base).unwrap_or_else(|_| base.clone());

        let (change_tx, change_rx) = mpsc::unbounded_channel::<Change>();
        let mut watcher: RecommendedWatcher = {
            let base = base.clone();
            let watch_root = watch_root.clone();
            let ignores = self.ignores.clone();
            recommended_watcher(move |event: notify::Result<Event>| match event {
                Ok(event) => {
                    for change in changes_from_event(&base, &watch_root, &event, &ignores) {
                        let _ = change_tx.send(change);
                    }
                }
                Err(err) => tracing::warn!(error = %err, "watcher event error"),
            })?
        };
        watcher.watch(&watch_root, RecursiveMode::Recursive)?;
        tracing::debug!(
            service = %self.service,
            path = %watch_root.display(),
            "watching build source"
        );

        let handler = SourceSync {
            engine: self.engine,
            service: self.service,
            source: self.source,
        };
        run_batches(change_rx, self.interval, &handler, shutdown).await;
        drop(watcher);
        Ok(())
    }

    fn display_local(&self) -> String {
        let local = &self.source.local;
        match local.strip_prefix(&self.app_root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => local.display().to_string(),
        }
    }
}

struct SourceSync {
    engine: Arc<SyncEngine>,
    service: ServiceName,
    source: BuildSource,
}

#[async_trait]
impl BatchHandler for SourceSync {
    async fn flush(&self, adds: Vec<Change>, removes: Vec<Change>) {
        self.engine
            .apply(&self.service, &self.source, &adds, &removes)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use devloop_core::shutdown_channel;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    }

    impl Recorder {
        fn batches(&self) -> Vec<(Vec<String>, Vec<String>)> {
            self.batches.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl BatchHandler for Recorder {
        async fn flush(&self, adds: Vec<Change>, removes: Vec<Change>) {
            let names =
                |v: Vec<Change>| -> Vec<String> { v.iter().map(Change::remote_relative).collect() };
            self.batches.lock().expect("lock").push((names(adds), names(removes)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_partitioned_batches_per_tick() {
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder::default());

        let task = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                run_batches(rx, BATCH_INTERVAL, recorder.as_ref(), shutdown).await;
            })
        };

        tx.send(Change::add("/src/", "a.rs")).expect("send");
        tx.send(Change::add("/src/", "b.rs")).expect("send");
        tx.send(Change::remove("/src/", "a.rs")).expect("send");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            recorder.batches(),
            [(vec!["b.rs".to_string()], vec!["a.rs".to_string()])]
        );

        // Quiet ticks flush nothing.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(recorder.batches().len(), 1);

        tx.send(Change::add("/src/", "c.rs")).expect("send");
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();
        task.await.expect("join");
        assert_eq!(recorder.batches().len(), 1, "unflushed batch is discarded");
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_flushed_before_the_first_tick() {
        let (trigger, shutdown) = shutdown_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder::default());
        let task = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move {
                run_batches(rx, BATCH_INTERVAL, recorder.as_ref(), shutdown).await;
            })
        };

        tx.send(Change::add("/src/", "a.rs")).expect("send");
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(recorder.batches().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.batches().len(), 1);

        trigger.trigger();
        task.await.expect("join");
    }

    #[test]
    fn events_map_to_adds_and_removes() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/main.rs"), "").expect("write");
        fs::write(root.join("debug.log"), "").expect("write");
        let ignores =
            BuildIgnores::from_patterns(root, vec!["*.log".to_string()]).expect("ignores");

        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("src/main.rs"))
            .add_path(root.join("debug.log"))
            .add_path(root.join("src"));
        let changes = changes_from_event(root, root, &created, &ignores);
        assert_eq!(changes, [Change::add(root, "src/main.rs")]);

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(root.join("old.rs"));
        assert_eq!(
            changes_from_event(root, root, &removed, &ignores),
            [Change::remove(root, "old.rs")]
        );

        // A rename reports the new name as present and the old name as gone.
        let renamed = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(root.join("gone.rs"))
            .add_path(root.join("src/main.rs"));
        assert_eq!(
            changes_from_event(root, root, &renamed, &ignores),
            [Change::remove(root, "gone.rs"), Change::add(root, "src/main.rs")]
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("a.rs"), "").expect("write");
        let event = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(dir.path().join("a.rs"));
        let ignores = BuildIgnores::empty(dir.path());
        assert!(changes_from_event(dir.path(), dir.path(), &event, &ignores).is_empty());
    }
}

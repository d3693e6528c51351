//! Whole-session lifecycle against the fake provider and a real source tree.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use devloop_core::testing::{CapturedOutput, FakeProvider};
use devloop_core::types::{App, Process, ReleasePromoteOptions};
use devloop_core::{shutdown_channel, CONTROL_TAG};
use devloop_resolver::{ImageInspector, ResolveError};
use devloop_session::{BuildError, Session, SessionError, StartOptions, Timings};
use tempfile::TempDir;

/// Base images carry no env and no working directory.
struct BareInspector;

impl ImageInspector for BareInspector {
    fn env(&self, _image: &str) -> Result<Vec<String>, ResolveError> {
        Ok(Vec::new())
    }

    fn working_dir(&self, _image: &str) -> Result<String, ResolveError> {
        Ok(String::new())
    }
}

fn fast() -> Timings {
    let tick = Duration::from_millis(20);
    Timings {
        batch: tick,
        build_poll: tick,
        log_retry: tick,
        app_poll: tick,
    }
}

fn app_tree(dockerfile: Option<&str>) -> TempDir {
    let root = TempDir::new().expect("root");
    fs::write(root.path().join("convox.yml"), "services:\n  web:\n    build: .\n").expect("write manifest");
    if let Some(dockerfile) = dockerfile {
        fs::write(root.path().join("Dockerfile"), dockerfile).expect("write Dockerfile");
    }
    fs::write(root.path().join("index.js"), "console.log(1)\n").expect("write source");
    root
}

fn session(provider: &Arc<FakeProvider>) -> (Arc<CapturedOutput>, Session) {
    let (captured, console) = CapturedOutput::console();
    let session = Session::new(provider.clone(), console, Arc::new(BareInspector)).with_timings(fast());
    (captured, session)
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn build_sync_and_teardown() {
    let root = app_tree(Some("FROM node:20\nWORKDIR /app\nCOPY . .\n"));
    let provider = Arc::new(FakeProvider::new());
    provider.script_build_statuses(["running", "complete"]);
    provider.set_processes(vec![Process {
        id: "web-1".to_string(),
        service: "web".to_string(),
    }]);
    provider.push_app_logs(Ok("2024-01-01T00:00:00Z service/web/web-1 listening\n"));
    let (captured, session) = session(&provider);
    let (trigger, shutdown) = shutdown_channel();

    let opts = StartOptions::new("myapp", root.path());
    let run = tokio::spawn(async move { session.run(opts, shutdown).await });

    eventually("watcher start", || {
        captured
            .messages_for(CONTROL_TAG)
            .iter()
            .any(|m| m.starts_with("starting sync from <dir>.</dir> to <dir>/app</dir>"))
    })
    .await;
    assert_eq!(provider.app("myapp").expect("created").generation, "2");
    assert_eq!(provider.promotions().len(), 1);
    assert_eq!(provider.promotions()[0].1, ReleasePromoteOptions::development());

    // Let the watcher settle before editing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(root.path().join("index.js"), "console.log(2)\n").expect("edit");
    eventually("upload", || !provider.uploads().is_empty()).await;
    eventually("app logs", || captured.messages_for("web") == ["listening"]).await;

    trigger.trigger();
    run.await.expect("join").expect("session");

    let control = captured.messages_for(CONTROL_TAG);
    assert_eq!(control.last().map(String::as_str), Some("stopping"));
    let promotions = provider.promotions();
    assert_eq!(promotions.len(), 2);
    assert_eq!(promotions[1].1, ReleasePromoteOptions::standard());
    assert_eq!(promotions[1].0, promotions[0].0);
}

#[tokio::test]
async fn without_build_or_sync_only_follows_logs() {
    let root = app_tree(None);
    let provider = Arc::new(FakeProvider::new());
    let (captured, session) = session(&provider);
    let (trigger, shutdown) = shutdown_channel();

    let mut opts = StartOptions::new("myapp", root.path());
    opts.build = false;
    opts.sync = false;
    let run = tokio::spawn(async move { session.run(opts, shutdown).await });

    eventually("log fetch", || provider.app_logs_calls() > 0).await;
    trigger.trigger();
    run.await.expect("join").expect("session");

    assert_eq!(captured.messages_for(CONTROL_TAG), ["stopping"]);
    assert!(provider.promotions().is_empty());
    assert!(provider.objects().is_empty());
}

#[tokio::test]
async fn resolution_failure_aborts_before_watching() {
    let root = app_tree(None);
    let provider = Arc::new(FakeProvider::new());
    let (captured, session) = session(&provider);
    let (_trigger, shutdown) = shutdown_channel();

    let mut opts = StartOptions::new("myapp", root.path());
    opts.build = false;
    let err = session.run(opts, shutdown).await.unwrap_err();

    assert!(matches!(err, SessionError::Resolve { ref service, .. } if service == "web"), "got: {err}");
    assert!(err.to_string().contains("no such file"), "got: {err}");
    assert!(captured.lines().is_empty());
    assert_eq!(provider.app_logs_calls(), 0);
}

#[tokio::test]
async fn failed_build_aborts_startup() {
    let root = app_tree(Some("FROM scratch\n"));
    let provider = Arc::new(FakeProvider::new());
    provider.script_build_statuses(["failed"]);
    let (_captured, session) = session(&provider);
    let (_trigger, shutdown) = shutdown_channel();

    let err = session
        .run(StartOptions::new("myapp", root.path()), shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Build(BuildError::Failed)), "got: {err}");
    assert!(provider.promotions().is_empty());
}

#[tokio::test]
async fn unsupported_generation_is_rejected() {
    let root = app_tree(None);
    let provider = Arc::new(FakeProvider::new());
    provider.add_app(App {
        name: "legacy".to_string(),
        generation: "1".to_string(),
        ..App::default()
    });
    let (_captured, session) = session(&provider);
    let (_trigger, shutdown) = shutdown_channel();

    let err = session
        .run(StartOptions::new("legacy", root.path()), shutdown)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid generation: 1");
}

#[tokio::test]
async fn empty_app_name_is_rejected() {
    let provider = Arc::new(FakeProvider::new());
    let (_captured, session) = session(&provider);
    let (_trigger, shutdown) = shutdown_channel();
    let err = session
        .run(StartOptions::new("", "."), shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AppRequired));
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let provider = Arc::new(FakeProvider::new());
    let (captured, session) = session(&provider);
    let (trigger, shutdown) = shutdown_channel();
    trigger.trigger();

    session
        .run(StartOptions::new("myapp", "."), shutdown)
        .await
        .expect("no-op");
    assert!(provider.app("myapp").is_none());
    assert!(captured.lines().is_empty());
}

#[tokio::test]
async fn waits_for_app_to_be_running() {
    let root = app_tree(None);
    let provider = Arc::new(FakeProvider::new());
    provider.add_app(App {
        name: "myapp".to_string(),
        generation: "3".to_string(),
        status: "updating".to_string(),
        ..App::default()
    });
    // Setup performs one lookup; the next two polls still see an update.
    provider.script_app_statuses(["updating", "updating", "updating", "running"]);
    let (captured, session) = session(&provider);
    let (trigger, shutdown) = shutdown_channel();

    let mut opts = StartOptions::new("myapp", root.path());
    opts.build = false;
    opts.sync = false;
    let run = tokio::spawn(async move { session.run(opts, shutdown).await });

    eventually("app running", || provider.app("myapp").map(|a| a.status) == Some("running".to_string())).await;
    trigger.trigger();
    run.await.expect("join").expect("session");
    assert_eq!(captured.messages_for(CONTROL_TAG), ["stopping"]);
}

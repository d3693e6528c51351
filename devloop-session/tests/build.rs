//! Build polling, promotion and external builds against the fake provider.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use devloop_core::testing::{CapturedOutput, FakeProvider};
use devloop_core::types::ReleasePromoteOptions;
use devloop_core::{shutdown_channel, Build, BuildStatus, BUILD_TAG};
use devloop_session::{BuildError, BuildOrchestrator, ExternalBuildOptions, ImageBuilder};
use rstest::rstest;
use tempfile::TempDir;

fn pending_build(provider: &FakeProvider) {
    provider.insert_build(Build {
        id: "B1".to_string(),
        app: "myapp".to_string(),
        status: BuildStatus::Created,
        release: String::new(),
        repository: String::new(),
        description: String::new(),
    });
}

fn orchestrator(provider: Arc<FakeProvider>, root: &std::path::Path) -> (Arc<CapturedOutput>, BuildOrchestrator) {
    let (captured, console) = CapturedOutput::console();
    let orchestrator = BuildOrchestrator::new(provider, "myapp", root, console);
    (captured, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn complete_after_three_polls() {
    let provider = Arc::new(FakeProvider::new());
    pending_build(&provider);
    provider.script_build_statuses(["created", "running", "complete"]);
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    let (_trigger, shutdown) = shutdown_channel();

    orchestrator.wait_for_build("B1", shutdown).await.expect("complete");
    assert_eq!(provider.build_get_calls(), 3);
}

#[rstest]
#[case::failed(["running", "failed"], "build failed")]
#[case::unknown(["running", "bogus"], "unknown build status: bogus")]
#[tokio::test(start_paused = true)]
async fn terminal_failures_are_errors(#[case] statuses: [&'static str; 2], #[case] expected: &str) {
    let provider = Arc::new(FakeProvider::new());
    pending_build(&provider);
    provider.script_build_statuses(statuses);
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    let (_trigger, shutdown) = shutdown_channel();

    let err = orchestrator.wait_for_build("B1", shutdown).await.unwrap_err();
    assert_eq!(err.to_string(), expected);
    assert_eq!(provider.build_get_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_ends_wait_successfully() {
    let provider = Arc::new(FakeProvider::new());
    pending_build(&provider);
    provider.script_build_statuses(["running"]);
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    let (trigger, shutdown) = shutdown_channel();

    let wait = tokio::spawn(async move { orchestrator.wait_for_build("B1", shutdown).await });
    tokio::time::sleep(Duration::from_millis(2500)).await;
    trigger.trigger();

    wait.await.expect("join").expect("cancel is not an error");
    assert_eq!(provider.build_get_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn in_platform_build_uploads_source_and_copies_logs() {
    let root = TempDir::new().expect("root");
    fs::write(root.path().join("Dockerfile"), "FROM scratch\n").expect("write");
    let provider = Arc::new(FakeProvider::new());
    provider.script_build_statuses(["running", "complete"]);
    provider.set_build_log("Step 1/2 : FROM scratch\nStep 2/2 : done\n");
    let (captured, orchestrator) = orchestrator(provider.clone(), root.path());
    let (_trigger, shutdown) = shutdown_channel();

    let build = orchestrator.build(false, shutdown).await.expect("build");
    assert_eq!(build.status, BuildStatus::Complete);
    assert!(!build.release.is_empty());
    assert_eq!(provider.objects().len(), 1);

    let lines = captured.messages_for(BUILD_TAG);
    assert_eq!(lines[..2], ["uploading source", "starting build"]);
    assert!(lines.iter().any(|l| l == "Step 2/2 : done"), "got: {lines:?}");

    orchestrator.promote(&build).await.expect("promote");
    assert_eq!(
        provider.promotions(),
        [(build.release.clone(), ReleasePromoteOptions::development())]
    );
}

#[tokio::test]
async fn promote_requires_a_release() {
    let provider = Arc::new(FakeProvider::new());
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    let build = Build {
        id: "B9".to_string(),
        app: "myapp".to_string(),
        status: BuildStatus::Complete,
        release: String::new(),
        repository: String::new(),
        description: String::new(),
    };
    assert!(matches!(
        orchestrator.promote(&build).await,
        Err(BuildError::NoRelease(id)) if id == "B9"
    ));
    assert!(provider.promotions().is_empty());
}

#[tokio::test]
async fn demote_clears_development_and_keeps_force() {
    let provider = Arc::new(FakeProvider::new());
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    orchestrator.demote("R1").await.expect("demote");

    let promotions = provider.promotions();
    assert_eq!(promotions.len(), 1);
    assert_eq!(promotions[0].1.development, Some(false));
    assert_eq!(promotions[0].1.force, Some(true));
}

#[derive(Default)]
struct RecordingBuilder {
    seen: Mutex<Vec<ExternalBuildOptions>>,
}

#[async_trait]
impl ImageBuilder for RecordingBuilder {
    async fn execute(&self, opts: &ExternalBuildOptions) -> Result<(), BuildError> {
        self.seen.lock().expect("lock").push(opts.clone());
        Ok(())
    }
}

#[tokio::test]
async fn external_build_pushes_with_repository_credentials() {
    let root = TempDir::new().expect("root");
    let manifest = "services:\n  web:\n    build: .\n";
    fs::write(root.path().join("convox.yml"), manifest).expect("write");
    let provider = Arc::new(FakeProvider::new());
    let builder = Arc::new(RecordingBuilder::default());
    let (_captured, orchestrator) = orchestrator(provider.clone(), root.path());
    let orchestrator = orchestrator
        .with_cache(false)
        .with_builder(Some(builder.clone() as Arc<dyn ImageBuilder>));
    let (_trigger, shutdown) = shutdown_channel();

    let build = orchestrator.build(true, shutdown).await.expect("build");

    let seen = builder.seen.lock().expect("lock").clone();
    assert_eq!(seen.len(), 1);
    let opts = &seen[0];
    assert_eq!(opts.push, "registry.example.com/dev/app");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&opts.auth).expect("auth json"),
        serde_json::json!({"registry.example.com/dev/app": {"Username": "user", "Password": "secret"}})
    );
    assert_eq!(opts.rack, "dev-rack");
    assert_eq!(opts.manifest, "convox.yml");
    assert_eq!(opts.source, format!("dir://{}", root.path().display()));
    assert!(opts.development && opts.terminal && !opts.cache);

    let releases = provider.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].build, build.id);
    assert_eq!(build.release, releases[0].id);

    let updates = provider.build_updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].1.manifest.as_deref(), Some(manifest));
    assert_eq!(updates[1].1.release.as_deref(), Some(releases[0].id.as_str()));
}

#[tokio::test]
async fn external_build_without_builder_fails() {
    let provider = Arc::new(FakeProvider::new());
    let (_captured, orchestrator) = orchestrator(provider.clone(), std::path::Path::new("."));
    let (_trigger, shutdown) = shutdown_channel();
    assert!(matches!(
        orchestrator.build(true, shutdown).await,
        Err(BuildError::Builder(_))
    ));
}

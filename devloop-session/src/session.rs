//! Top-level development session lifecycle.
//!
//! Setup (app, manifest, optional build and promotion, build-source
//! resolution) runs sequentially and any failure aborts the session. The
//! long-running tasks then run until the shared shutdown signal fires, after
//! which the app is taken back out of development mode.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use devloop_core::manifest::DEFAULT_MANIFEST;
use devloop_core::types::AppCreateOptions;
use devloop_core::{
    error_channel, BuildSource, Console, ErrorReporter, Manifest, ProviderError, Provider,
    ServiceName, Shutdown,
};
use devloop_resolver::{load_ignores, resolve_build_sources, BuildIgnores, ImageInspector};
use devloop_sync::{ChangeWatcher, SyncEngine};

use crate::aggregator::aggregate_errors;
use crate::build::{BuildOrchestrator, ImageBuilder};
use crate::error::{provider_err, SessionError};
use crate::logs::LogStreamMultiplexer;

/// App generations that support development mode.
const SUPPORTED_GENERATIONS: [&str; 2] = ["2", "3"];

/// What to start and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    pub app: String,
    /// Application root: manifest, build contexts and sync sources live here.
    pub root: PathBuf,
    pub build: bool,
    pub cache: bool,
    pub external: bool,
    /// Manifest path relative to `root`; `convox.yml` when unset.
    pub manifest: Option<String>,
    /// Services to follow; every manifest service when unset.
    pub services: Option<Vec<String>>,
    pub sync: bool,
}

impl StartOptions {
    pub fn new(app: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            app: app.into(),
            root: root.into(),
            build: true,
            cache: true,
            external: false,
            manifest: None,
            services: None,
            sync: true,
        }
    }
}

/// Intervals driving the session's polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub batch: Duration,
    pub build_poll: Duration,
    pub log_retry: Duration,
    pub app_poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        let second = Duration::from_secs(1);
        Self {
            batch: second,
            build_poll: second,
            log_retry: second,
            app_poll: second,
        }
    }
}

/// Build sources and ignore rules for one followed service.
struct ServiceSources {
    name: ServiceName,
    sources: Vec<BuildSource>,
    ignores: BuildIgnores,
}

pub struct Session {
    provider: Arc<dyn Provider>,
    console: Console,
    inspector: Arc<dyn ImageInspector>,
    builder: Option<Arc<dyn ImageBuilder>>,
    timings: Timings,
}

impl Session {
    pub fn new(
        provider: Arc<dyn Provider>,
        console: Console,
        inspector: Arc<dyn ImageInspector>,
    ) -> Self {
        Self {
            provider,
            console,
            inspector,
            builder: None,
            timings: Timings::default(),
        }
    }

    /// Builder used when `StartOptions::external` is set.
    pub fn with_builder(mut self, builder: Arc<dyn ImageBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Run a development session until `shutdown` fires.
    pub async fn run(&self, opts: StartOptions, mut shutdown: Shutdown) -> Result<(), SessionError> {
        if shutdown.is_cancelled() {
            return Ok(());
        }
        if opts.app.is_empty() {
            return Err(SessionError::AppRequired);
        }

        self.prepare_app(&opts.app).await?;
        let manifest = self.load_manifest(&opts).await?;
        let interest = interest_set(&manifest, opts.services.as_deref());
        tracing::info!(app = %opts.app, services = interest.len(), "starting development session");

        let orchestrator = BuildOrchestrator::new(
            Arc::clone(&self.provider),
            &opts.app,
            &opts.root,
            self.console.clone(),
        )
        .with_manifest(opts.manifest.clone())
        .with_cache(opts.cache)
        .with_poll_interval(self.timings.build_poll)
        .with_builder(self.builder.clone());

        if opts.build {
            let build = orchestrator.build(opts.external, shutdown.clone()).await?;
            if shutdown.is_cancelled() {
                return Ok(());
            }
            orchestrator.promote(&build).await?;
        }

        let services = if opts.sync {
            self.resolve_services(&opts, &manifest, &interest).await?
        } else {
            Vec::new()
        };

        let (reporter, error_rx) = error_channel();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let logs = LogStreamMultiplexer::new(
            Arc::clone(&self.provider),
            &opts.app,
            self.console.clone(),
            interest.iter().cloned().collect(),
        )
        .with_retry(self.timings.log_retry);
        tasks.push(tokio::spawn(logs.run(shutdown.clone())));
        tasks.push(tokio::spawn(aggregate_errors(
            error_rx,
            self.console.clone(),
            shutdown.clone(),
        )));

        self.spawn_watchers(&opts, services, &reporter, &shutdown, &mut tasks);

        let waited = self.wait_for_app_running(&opts.app, shutdown.clone()).await;
        if waited.is_ok() {
            shutdown.cancelled().await;
        }
        for task in &tasks {
            task.abort();
        }
        waited?;

        self.teardown(&opts.app, &orchestrator).await
    }

    async fn prepare_app(&self, app: &str) -> Result<(), SessionError> {
        match self.provider.app_get(app).await {
            Ok(existing) => {
                if !SUPPORTED_GENERATIONS.contains(&existing.generation.as_str()) {
                    return Err(SessionError::InvalidGeneration(existing.generation));
                }
                Ok(())
            }
            Err(ProviderError::NotFound { .. }) => {
                tracing::info!(app, "creating app");
                self.provider
                    .app_create(
                        app,
                        AppCreateOptions {
                            generation: Some("2".to_string()),
                        },
                    )
                    .await
                    .map_err(provider_err("app create"))?;
                Ok(())
            }
            Err(err) => Err(provider_err("app get")(err)),
        }
    }

    async fn load_manifest(&self, opts: &StartOptions) -> Result<Manifest, SessionError> {
        let path = opts
            .root
            .join(opts.manifest.as_deref().unwrap_or(DEFAULT_MANIFEST));
        let env = self
            .provider
            .app_environment(&opts.app)
            .await
            .map_err(provider_err("app environment"))?;
        let manifest = Manifest::load_file(&path, &env)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Derive sources for every followed, source-built service.
    ///
    /// Runs to completion before any watcher starts; the first failure aborts.
    async fn resolve_services(
        &self,
        opts: &StartOptions,
        manifest: &Manifest,
        interest: &BTreeSet<String>,
    ) -> Result<Vec<ServiceSources>, SessionError> {
        let mut resolved = Vec::new();
        for service in &manifest.services {
            if !interest.contains(service.name.as_str()) || !service.is_source_built() {
                continue;
            }
            let root = opts.root.clone();
            let svc = service.clone();
            let inspector = Arc::clone(&self.inspector);
            let result = tokio::task::spawn_blocking(move || {
                let sources = resolve_build_sources(&root, &svc, inspector.as_ref())?;
                let ignores = load_ignores(&root, &svc)?;
                Ok::<_, devloop_resolver::ResolveError>((sources, ignores))
            })
            .await
            .map_err(|e| SessionError::Join {
                task: "resolve",
                message: e.to_string(),
            })?;

            let (sources, ignores) = result.map_err(|source| SessionError::Resolve {
                service: service.name.to_string(),
                source,
            })?;
            tracing::debug!(service = %service.name, sources = sources.len(), "resolved build sources");
            resolved.push(ServiceSources {
                name: ServiceName::from(service.name.as_str()),
                sources,
                ignores,
            });
        }
        Ok(resolved)
    }

    fn spawn_watchers(
        &self,
        opts: &StartOptions,
        services: Vec<ServiceSources>,
        reporter: &ErrorReporter,
        shutdown: &Shutdown,
        tasks: &mut Vec<JoinHandle<()>>,
    ) {
        if services.is_empty() {
            return;
        }
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&self.provider),
            &opts.app,
            self.console.clone(),
            reporter.clone(),
        ));

        for service in services {
            for source in service.sources {
                let watcher = ChangeWatcher::new(
                    service.name.clone(),
                    source,
                    service.ignores.clone(),
                    Arc::clone(&engine),
                    self.console.clone(),
                    &opts.root,
                )
                .with_interval(self.timings.batch);
                let reporter = reporter.clone();
                let shutdown = shutdown.clone();
                let name = service.name.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(err) = watcher.run(shutdown).await {
                        reporter.report(format!("watch {name}"), err);
                    }
                }));
            }
        }
    }

    /// Poll until the app reports `running`. Cancellation ends the wait.
    async fn wait_for_app_running(&self, app: &str, mut shutdown: Shutdown) -> Result<(), SessionError> {
        let mut ticker = interval_at(Instant::now(), self.timings.app_poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let current = self
                        .provider
                        .app_get(app)
                        .await
                        .map_err(provider_err("app get"))?;
                    if current.status == "running" {
                        return Ok(());
                    }
                    tracing::debug!(app, status = %current.status, "waiting for app");
                }
            }
        }
    }

    async fn teardown(&self, app: &str, orchestrator: &BuildOrchestrator) -> Result<(), SessionError> {
        let current = match self.provider.app_get(app).await {
            Ok(current) => current,
            Err(err) => {
                tracing::debug!(app, error = %err, "app unavailable at teardown");
                return Ok(());
            }
        };

        self.console.control("stopping");

        if !current.release.is_empty() {
            orchestrator.demote(&current.release).await?;
        }
        Ok(())
    }
}

/// Names of the services to follow.
pub fn interest_set(manifest: &Manifest, filter: Option<&[String]>) -> BTreeSet<String> {
    match filter {
        Some(names) => names.iter().cloned().collect(),
        None => manifest.services.iter().map(|s| s.name.to_string()).collect(),
    }
}

//! The narrow surface of the remote platform a development session drives.
//!
//! Devloop never implements the platform; it only decides what to build,
//! sync and poll. Implementations wrap a rack API client.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::ProviderError;
use crate::pipe::PipeReader;
use crate::types::{
    App, AppCreateOptions, Build, BuildCreateOptions, BuildUpdateOptions, LogsOptions, Object,
    Process, Release, ReleaseCreateOptions, ReleasePromoteOptions, System,
};

/// A byte stream of log output.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn app_get(&self, app: &str) -> Result<App, ProviderError>;

    async fn app_create(&self, app: &str, opts: AppCreateOptions) -> Result<App, ProviderError>;

    /// Environment variables configured on the app, used for manifest interpolation.
    async fn app_environment(&self, app: &str) -> Result<HashMap<String, String>, ProviderError>;

    /// Aggregated log stream for every process of the app.
    async fn app_logs(&self, app: &str, opts: LogsOptions) -> Result<LogStream, ProviderError>;

    async fn system_get(&self) -> Result<System, ProviderError>;

    async fn object_store(&self, app: &str, key: &str, data: Vec<u8>)
        -> Result<Object, ProviderError>;

    async fn build_create(
        &self,
        app: &str,
        url: &str,
        opts: BuildCreateOptions,
    ) -> Result<Build, ProviderError>;

    async fn build_get(&self, app: &str, id: &str) -> Result<Build, ProviderError>;

    async fn build_update(
        &self,
        app: &str,
        id: &str,
        opts: BuildUpdateOptions,
    ) -> Result<Build, ProviderError>;

    async fn build_logs(&self, app: &str, id: &str) -> Result<LogStream, ProviderError>;

    async fn release_create(
        &self,
        app: &str,
        opts: ReleaseCreateOptions,
    ) -> Result<Release, ProviderError>;

    async fn release_promote(
        &self,
        app: &str,
        id: &str,
        opts: ReleasePromoteOptions,
    ) -> Result<(), ProviderError>;

    /// Processes of the app, optionally restricted to one service.
    async fn process_list(
        &self,
        app: &str,
        service: Option<&str>,
    ) -> Result<Vec<Process>, ProviderError>;

    /// Run `command` inside a process and return its standard output.
    async fn process_exec(&self, app: &str, pid: &str, command: &str)
        -> Result<String, ProviderError>;

    async fn process_stop(&self, app: &str, pid: &str) -> Result<(), ProviderError>;

    /// Extract an uncompressed tar stream into a process filesystem.
    async fn files_upload(
        &self,
        app: &str,
        pid: &str,
        archive: PipeReader,
    ) -> Result<(), ProviderError>;

    async fn files_delete(
        &self,
        app: &str,
        pid: &str,
        files: Vec<String>,
    ) -> Result<(), ProviderError>;
}

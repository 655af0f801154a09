//! Snapshot environment resolution.
//!
//! The snapshot subsystem itself lives elsewhere; the worker only has to hand it a resolved
//! [`SnapshotEnvironment`] through the config slot.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::errors::{BoxError, InitStep, WorkerError, WorkerResult};
use crate::loader::ModuleLoader;

/// Where and how snapshot files are stored.
#[async_trait]
pub trait SnapshotEnvironment: Send + Sync {
    /// Human-readable identifier, written into snapshot headers.
    fn name(&self) -> &str;

    /// Snapshot file path for a test file.
    fn resolve_path(&self, test_path: &Path) -> PathBuf;

    /// Read a snapshot file; `Ok(None)` when it does not exist yet.
    async fn read_snapshot(&self, path: &Path) -> io::Result<Option<String>>;

    async fn save_snapshot(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Remove a snapshot file. Missing files are not an error.
    async fn remove_snapshot(&self, path: &Path) -> io::Result<()>;
}

/// Snapshots as `__snapshots__/<file>.snap` next to each test file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSnapshotEnvironment;

#[async_trait]
impl SnapshotEnvironment for FsSnapshotEnvironment {
    fn name(&self) -> &str {
        "fs"
    }

    fn resolve_path(&self, test_path: &Path) -> PathBuf {
        let dir = test_path.parent().unwrap_or_else(|| Path::new(""));
        let file = test_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.join("__snapshots__").join(format!("{file}.snap"))
    }

    async fn read_snapshot(&self, path: &Path) -> io::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn save_snapshot(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, content).await
    }

    async fn remove_snapshot(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Produces the snapshot environment for a worker config.
#[async_trait]
pub trait SnapshotEnvironmentResolver: Send + Sync {
    async fn resolve(
        &self,
        config: &WorkerConfig,
        loader: &dyn ModuleLoader,
    ) -> Result<Arc<dyn SnapshotEnvironment>, BoxError>;
}

/// Always resolves to [`FsSnapshotEnvironment`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSnapshotResolver;

#[async_trait]
impl SnapshotEnvironmentResolver for DefaultSnapshotResolver {
    async fn resolve(
        &self,
        _config: &WorkerConfig,
        _loader: &dyn ModuleLoader,
    ) -> Result<Arc<dyn SnapshotEnvironment>, BoxError> {
        Ok(Arc::new(FsSnapshotEnvironment))
    }
}

/// Resolve the snapshot environment for `config`.
///
/// Callers own the once-per-config guarantee: only call this while the config slot is empty.
pub async fn resolve_snapshot_environment(
    resolver: &dyn SnapshotEnvironmentResolver,
    config: &WorkerConfig,
    loader: &dyn ModuleLoader,
) -> WorkerResult<Arc<dyn SnapshotEnvironment>> {
    let env = resolver
        .resolve(config, loader)
        .await
        .map_err(|e| WorkerError::init(InitStep::SnapshotEnvironment, e))?;
    debug!(snapshot_environment = env.name(), "resolved snapshot environment");
    Ok(env)
}

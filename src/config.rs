//! Per-worker resolved configuration.
//!
//! The config arrives already resolved from the runner; this crate only reads it, except for the
//! snapshot-environment slot which the bootstrap fills once and then reuses.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{WorkerError, WorkerResult};
use crate::snapshot::SnapshotEnvironment;

/// Name of the environment used when the config does not pick one.
pub const DEFAULT_ENVIRONMENT: &str = "node";

/// Worker configuration
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    /// Project root; asset ids under it are made relative before applying `asset_base`
    pub root: PathBuf,
    /// Public base URL assets resolve against (`None` keeps the raw path)
    pub asset_base: Option<String>,
    /// Keep the realm's original diagnostic output instead of capturing it
    pub disable_console_intercept: bool,
    /// Environment to activate for test files that don't override it
    pub environment: String,
    /// Per-environment options, keyed by environment name
    pub environment_options: EnvironmentOptions,
    /// Environment variables applied to the realm on every bootstrap call
    pub env: BTreeMap<String, String>,
    /// Compile-time style defines exposed as enumerable realm globals
    pub defines: BTreeMap<String, Value>,
    pub snapshot_options: SnapshotOptions,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            asset_base: None,
            disable_console_intercept: false,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            environment_options: EnvironmentOptions::default(),
            env: BTreeMap::new(),
            defines: BTreeMap::new(),
            snapshot_options: SnapshotOptions::default(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON (camelCase keys, every field optional).
    pub fn from_json_str(json: &str) -> WorkerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> WorkerResult<Self> {
        let json = fs::read_to_string(path).map_err(|source| WorkerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Set the project root
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the public asset base URL
    pub fn with_asset_base(mut self, base: impl Into<String>) -> Self {
        self.asset_base = Some(base.into());
        self
    }

    /// Enable or disable console interception
    pub fn with_disable_console_intercept(mut self, disable: bool) -> Self {
        self.disable_console_intercept = disable;
        self
    }

    /// Set the default environment name
    pub fn with_environment(mut self, name: impl Into<String>) -> Self {
        self.environment = name.into();
        self
    }

    /// Pre-populate the snapshot environment slot
    pub fn with_snapshot_environment(mut self, env: Arc<dyn SnapshotEnvironment>) -> Self {
        self.snapshot_options.snapshot_environment = Some(env);
        self
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("root", &self.root)
            .field("asset_base", &self.asset_base)
            .field("disable_console_intercept", &self.disable_console_intercept)
            .field("environment", &self.environment)
            .field("environment_options", &self.environment_options)
            .field("env", &self.env)
            .field("defines", &self.defines)
            .field("snapshot_options", &self.snapshot_options)
            .finish()
    }
}

/// Snapshot settings plus the lazily resolved snapshot environment.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotOptions {
    /// Overwrite mismatching snapshots instead of failing
    pub update: bool,
    /// Show full diffs
    pub expand: bool,
    /// Filled by the bootstrap on first use, then reused for the worker's lifetime
    #[serde(skip)]
    pub snapshot_environment: Option<Arc<dyn SnapshotEnvironment>>,
}

impl fmt::Debug for SnapshotOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotOptions")
            .field("update", &self.update)
            .field("expand", &self.expand)
            .field("snapshot_environment", &self.snapshot_environment.is_some())
            .finish()
    }
}

/// Free-form options handed to environment setup, keyed by environment name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentOptions(pub Map<String, Value>);

impl EnvironmentOptions {
    /// Options for one environment, if any were configured.
    pub fn for_environment(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, options: Value) {
        self.0.insert(name.into(), options);
    }
}

//! Global environment initializer.
//!
//! [`WorkerBootstrap::initialize`] is called before every test file. Part of its work depends on the
//! per-file config and runs every time; the heavy part (stub interception, pristine primitives,
//! source maps, console capture) runs once per worker, gated by an owned [`BootstrapState`] latch.
//!
//! ## Failure
//!
//! Errors surface as [`WorkerError::Initialization`]. The latch only flips after every one-time step
//! succeeded, but callers must still treat an initialization error as fatal for the worker.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use testrealm_core::TransformMode;
use testrealm_core::globals::{REQUIRED_PRIMITIVES_GLOBAL, SSR_ENV_VAR, TEST_API_GLOBAL};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::console::{self, CapturingConsoleFactory, ConsoleFactory};
use crate::environment::ResolvedTestEnvironment;
use crate::errors::{BoxError, InitStep, WorkerError, WorkerResult};
use crate::interception;
use crate::loader::ModuleLoader;
use crate::realm::{Realm, RequiredPrimitives};
use crate::snapshot::{self, DefaultSnapshotResolver, SnapshotEnvironmentResolver};
use crate::sourcemap;

/// Baseline setup shared by every kind of worker, run on every bootstrap call.
#[async_trait]
pub trait CommonSetup: Send + Sync {
    async fn setup(&self, realm: &Realm, config: &WorkerConfig) -> Result<(), BoxError>;
}

/// Applies `config.env` to the realm's environment and `config.defines` as enumerable globals.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCommonSetup;

#[async_trait]
impl CommonSetup for DefaultCommonSetup {
    async fn setup(&self, realm: &Realm, config: &WorkerConfig) -> Result<(), BoxError> {
        for (key, value) in &config.env {
            realm.set_env_var(key, value);
        }
        for (key, value) in &config.defines {
            realm.define_global(key, Arc::new(value.clone()), true);
        }
        Ok(())
    }
}

/// The public test API exposed to test code through [`TEST_API_GLOBAL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestApi {
    pub version: &'static str,
}

impl Default for TestApi {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// External collaborators the bootstrap delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub common: Arc<dyn CommonSetup>,
    pub test_api: Arc<dyn Any + Send + Sync>,
    pub snapshot_resolver: Arc<dyn SnapshotEnvironmentResolver>,
    pub console_factory: Arc<dyn ConsoleFactory>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            common: Arc::new(DefaultCommonSetup),
            test_api: Arc::new(TestApi::default()),
            snapshot_resolver: Arc::new(DefaultSnapshotResolver),
            console_factory: Arc::new(CapturingConsoleFactory::new()),
        }
    }
}

/// One-time latch of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Owns the one-time latch and the collaborators of a worker's bootstrap.
pub struct WorkerBootstrap {
    state: BootstrapState,
    collaborators: Collaborators,
}

impl Default for WorkerBootstrap {
    fn default() -> Self {
        Self::new(Collaborators::default())
    }
}

impl WorkerBootstrap {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            state: BootstrapState::Uninitialized,
            collaborators,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Forget that the one-time section ran. For isolated runs that start from a fresh realm.
    pub fn reset(&mut self) {
        self.state = BootstrapState::Uninitialized;
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Prepare `realm` for the next test file.
    pub async fn initialize(
        &mut self,
        realm: &Realm,
        config: &mut WorkerConfig,
        resolved: &ResolvedTestEnvironment,
        loader: Arc<dyn ModuleLoader>,
    ) -> WorkerResult<()> {
        self.collaborators
            .common
            .setup(realm, config)
            .await
            .map_err(|e| WorkerError::init(InitStep::CommonSetup, e))?;

        realm.define_global(TEST_API_GLOBAL, Arc::clone(&self.collaborators.test_api), false);

        if config.snapshot_options.snapshot_environment.is_none() {
            let env = snapshot::resolve_snapshot_environment(
                self.collaborators.snapshot_resolver.as_ref(),
                config,
                loader.as_ref(),
            )
            .await?;
            config.snapshot_options.snapshot_environment = Some(env);
        }

        if self.state == BootstrapState::Initialized {
            return Ok(());
        }

        let mode = resolved.transform_mode();
        info!(environment = resolved.name(), transform_mode = mode.as_str(), "bootstrapping worker realm");

        if mode == TransformMode::Web {
            interception::install_web_stubs(realm, config);
        }
        realm.set_env_var(SSR_ENV_VAR, mode.ssr_value());

        realm.define_global(
            REQUIRED_PRIMITIVES_GLOBAL,
            Arc::new(RequiredPrimitives::capture(realm)),
            false,
        );

        sourcemap::install(realm, Arc::new(move |source: &str| loader.source_map(source)));

        if !config.disable_console_intercept {
            console::install(realm, self.collaborators.console_factory.as_ref())
                .map_err(|e| WorkerError::init(InitStep::ConsoleIntercept, e))?;
        }

        self.state = BootstrapState::Initialized;
        debug!("worker bootstrap complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{NodeEnvironment, WebEnvironment};
    use crate::loader::ModuleCache;

    #[tokio::test]
    async fn test_test_api_is_hidden_and_refreshed_each_call() {
        let realm = Realm::new();
        let mut config = WorkerConfig::default();
        let resolved = ResolvedTestEnvironment::new(Arc::new(NodeEnvironment));
        let mut bootstrap = WorkerBootstrap::default();

        bootstrap
            .initialize(&realm, &mut config, &resolved, Arc::new(ModuleCache::new()))
            .await
            .unwrap();
        realm.remove_global(TEST_API_GLOBAL);
        bootstrap
            .initialize(&realm, &mut config, &resolved, Arc::new(ModuleCache::new()))
            .await
            .unwrap();

        assert_eq!(realm.global::<TestApi>(TEST_API_GLOBAL).as_deref(), Some(&TestApi::default()));
        assert!(!realm.global_keys().contains(&TEST_API_GLOBAL.to_string()));
    }

    #[tokio::test]
    async fn test_common_setup_applies_env_and_defines() {
        let realm = Realm::new();
        let mut config = WorkerConfig::default();
        config.env.insert("NODE_ENV".into(), "test".into());
        config.defines.insert("__DEV__".into(), serde_json::json!(true));
        let resolved = ResolvedTestEnvironment::new(Arc::new(WebEnvironment));

        WorkerBootstrap::default()
            .initialize(&realm, &mut config, &resolved, Arc::new(ModuleCache::new()))
            .await
            .unwrap();

        assert_eq!(realm.env_var("NODE_ENV").as_deref(), Some("test"));
        assert_eq!(realm.global_keys(), vec!["__DEV__".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_reopens_the_latch() {
        let realm = Realm::new();
        let mut config = WorkerConfig::default();
        let resolved = ResolvedTestEnvironment::new(Arc::new(NodeEnvironment));
        let mut bootstrap = WorkerBootstrap::default();

        bootstrap
            .initialize(&realm, &mut config, &resolved, Arc::new(ModuleCache::new()))
            .await
            .unwrap();
        assert_eq!(bootstrap.state(), BootstrapState::Initialized);
        bootstrap.reset();
        assert_eq!(bootstrap.state(), BootstrapState::Uninitialized);
    }
}

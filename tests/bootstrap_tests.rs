//! Integration tests for worker bootstrap: what runs every call, what runs once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use testrealm::bootstrap::{BootstrapState, Collaborators, WorkerBootstrap};
use testrealm::config::WorkerConfig;
use testrealm::console::{CapturingConsole, ConsoleFactory, DiagnosticOutput};
use testrealm::environment::{NodeEnvironment, ResolvedTestEnvironment, WebEnvironment};
use testrealm::errors::{BoxError, InitStep, WorkerError};
use testrealm::interception::StubResolver;
use testrealm::loader::{ModuleCache, ModuleLoader};
use testrealm::realm::{Realm, RequiredPrimitives, Timers, TokioTimers};
use testrealm::snapshot::{FsSnapshotEnvironment, SnapshotEnvironment, SnapshotEnvironmentResolver};
use testrealm::sourcemap::SourceMap;
use testrealm_core::StubKind;
use testrealm_core::globals::{REQUIRED_PRIMITIVES_GLOBAL, SSR_ENV_VAR};

#[derive(Default)]
struct CountingConsoleFactory {
    created: AtomicUsize,
    fail: bool,
}

impl ConsoleFactory for CountingConsoleFactory {
    fn create(&self) -> Result<Arc<dyn DiagnosticOutput>, BoxError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("console module failed to load".into());
        }
        Ok(Arc::new(CapturingConsole::new()))
    }
}

#[derive(Default)]
struct CountingSnapshotResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl SnapshotEnvironmentResolver for CountingSnapshotResolver {
    async fn resolve(
        &self,
        _config: &WorkerConfig,
        _loader: &dyn ModuleLoader,
    ) -> Result<Arc<dyn SnapshotEnvironment>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FsSnapshotEnvironment))
    }
}

struct CustomSnapshotEnvironment;

#[async_trait]
impl SnapshotEnvironment for CustomSnapshotEnvironment {
    fn name(&self) -> &str {
        "custom"
    }

    fn resolve_path(&self, test_path: &Path) -> PathBuf {
        test_path.with_extension("snap")
    }

    async fn read_snapshot(&self, _path: &Path) -> std::io::Result<Option<String>> {
        Ok(None)
    }

    async fn save_snapshot(&self, _path: &Path, _content: &str) -> std::io::Result<()> {
        Ok(())
    }

    async fn remove_snapshot(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

struct Harness {
    console: Arc<CountingConsoleFactory>,
    snapshots: Arc<CountingSnapshotResolver>,
    bootstrap: WorkerBootstrap,
}

fn harness_with(console: CountingConsoleFactory) -> Harness {
    let console = Arc::new(console);
    let snapshots = Arc::new(CountingSnapshotResolver::default());
    let bootstrap = WorkerBootstrap::new(Collaborators {
        snapshot_resolver: snapshots.clone(),
        console_factory: console.clone(),
        ..Collaborators::default()
    });
    Harness {
        console,
        snapshots,
        bootstrap,
    }
}

fn harness() -> Harness {
    harness_with(CountingConsoleFactory::default())
}

fn web() -> ResolvedTestEnvironment {
    ResolvedTestEnvironment::new(Arc::new(WebEnvironment))
}

fn node() -> ResolvedTestEnvironment {
    ResolvedTestEnvironment::new(Arc::new(NodeEnvironment))
}

fn loader() -> Arc<dyn ModuleLoader> {
    Arc::new(ModuleCache::new())
}

#[tokio::test]
async fn one_time_setup_runs_once_across_many_calls() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default();
    let mut h = harness();

    h.bootstrap.initialize(&realm, &mut config, &web(), loader()).await.unwrap();
    let source_maps = realm.source_maps().unwrap();
    let primitives = realm.global::<RequiredPrimitives>(REQUIRED_PRIMITIVES_GLOBAL).unwrap();

    // Anything the one-time section would redo is patched between calls.
    realm.set_timers(Arc::new(TokioTimers));
    let replaced: StubResolver = Arc::new(|_: &str| "patched".to_string());
    realm.with_interceptors(|t| t.install([".css"], StubKind::Style, replaced));

    for _ in 0..4 {
        h.bootstrap.initialize(&realm, &mut config, &web(), loader()).await.unwrap();
    }

    assert_eq!(h.console.created.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&source_maps, &realm.source_maps().unwrap()));
    assert!(Arc::ptr_eq(
        &primitives,
        &realm.global::<RequiredPrimitives>(REQUIRED_PRIMITIVES_GLOBAL).unwrap()
    ));
    assert_eq!(realm.resolve_stub("/src/app.css").as_deref(), Some("patched"));
    assert_eq!(h.bootstrap.state(), BootstrapState::Initialized);
}

#[tokio::test]
async fn captured_primitives_keep_the_first_timers() {
    let pristine: Arc<dyn Timers> = Arc::new(TokioTimers);
    let realm = Realm::new().with_timers(pristine.clone());
    let mut config = WorkerConfig::default();
    let mut h = harness();

    h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();
    realm.set_timers(Arc::new(TokioTimers));
    h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();

    let captured = realm.global::<RequiredPrimitives>(REQUIRED_PRIMITIVES_GLOBAL).unwrap();
    assert!(Arc::ptr_eq(&captured.timers, &pristine));
    assert!(!Arc::ptr_eq(&realm.timers(), &pristine));
}

#[tokio::test]
async fn later_calls_do_not_switch_transform_mode() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default();
    let mut h = harness();

    h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();
    h.bootstrap.initialize(&realm, &mut config, &web(), loader()).await.unwrap();

    assert_eq!(realm.env_var(SSR_ENV_VAR).as_deref(), Some("1"));
    assert!(realm.resolve_stub("/src/app.css").is_none());
}

#[tokio::test]
async fn snapshot_environment_resolved_once_when_slot_empty() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default();
    let mut h = harness();

    for _ in 0..3 {
        h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();
    }

    assert_eq!(h.snapshots.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        config.snapshot_options.snapshot_environment.as_ref().map(|e| e.name()),
        Some("fs")
    );
}

#[tokio::test]
async fn prepopulated_snapshot_environment_is_never_resolved() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default().with_snapshot_environment(Arc::new(CustomSnapshotEnvironment));
    let mut h = harness();

    for _ in 0..3 {
        h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();
    }

    assert_eq!(h.snapshots.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        config.snapshot_options.snapshot_environment.as_ref().map(|e| e.name()),
        Some("custom")
    );
}

#[tokio::test]
async fn web_mode_stubs_styles_and_assets() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default();
    harness()
        .bootstrap
        .initialize(&realm, &mut config, &web(), loader())
        .await
        .unwrap();

    assert_eq!(realm.resolve_stub("/src/button.module.css").as_deref(), Some(""));
    assert_eq!(realm.resolve_stub("/src/theme.less").as_deref(), Some(""));
    assert_eq!(realm.resolve_stub("/src/logo.svg").as_deref(), Some("/src/logo.svg"));
    assert_eq!(realm.resolve_stub("/public/intro.mp4").as_deref(), Some("/public/intro.mp4"));
    assert_eq!(realm.resolve_stub("/src/main.ts"), None);
}

#[tokio::test]
async fn ssr_marker_is_empty_for_web_and_one_otherwise() {
    let web_realm = Realm::new();
    harness()
        .bootstrap
        .initialize(&web_realm, &mut WorkerConfig::default(), &web(), loader())
        .await
        .unwrap();
    assert_eq!(web_realm.env_var(SSR_ENV_VAR).as_deref(), Some(""));

    let node_realm = Realm::new();
    harness()
        .bootstrap
        .initialize(&node_realm, &mut WorkerConfig::default(), &node(), loader())
        .await
        .unwrap();
    assert_eq!(node_realm.env_var(SSR_ENV_VAR).as_deref(), Some("1"));
    assert!(node_realm.with_interceptors(|t| t.is_empty()));
}

#[tokio::test]
async fn disabled_console_intercept_keeps_original_output() {
    let realm = Realm::new();
    let before = realm.console();
    let mut config = WorkerConfig::default().with_disable_console_intercept(true);
    let mut h = harness();

    h.bootstrap.initialize(&realm, &mut config, &node(), loader()).await.unwrap();

    assert!(Arc::ptr_eq(&before, &realm.console()));
    assert_eq!(h.console.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn enabled_console_intercept_replaces_output() {
    let realm = Realm::new();
    let before = realm.console();
    let mut config = WorkerConfig::default();

    harness()
        .bootstrap
        .initialize(&realm, &mut config, &node(), loader())
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&before, &realm.console()));
}

#[tokio::test]
async fn failed_one_time_step_leaves_latch_unset() {
    let realm = Realm::new();
    let mut config = WorkerConfig::default();
    let mut h = harness_with(CountingConsoleFactory {
        fail: true,
        ..CountingConsoleFactory::default()
    });

    let err = h
        .bootstrap
        .initialize(&realm, &mut config, &node(), loader())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkerError::Initialization {
            step: InitStep::ConsoleIntercept,
            ..
        }
    ));
    assert_eq!(h.bootstrap.state(), BootstrapState::Uninitialized);
}

#[tokio::test]
async fn source_maps_read_from_loader_cache() {
    let realm = Realm::new();
    let cache = Arc::new(ModuleCache::new());
    cache.insert_source_map(
        "/app/dist/sum.js",
        SourceMap::from_json(r#"{"version":3,"sources":["src/sum.ts"],"mappings":";;AAEA"}"#).unwrap(),
    );

    harness()
        .bootstrap
        .initialize(&realm, &mut WorkerConfig::default(), &node(), cache.clone())
        .await
        .unwrap();

    let support = realm.source_maps().unwrap();
    let pos = support.original_position("/app/dist/sum.js", 3, 1).unwrap();
    assert_eq!((pos.source.as_str(), pos.line, pos.column), ("src/sum.ts", 3, 1));
    assert!(support.original_position("/app/dist/other.js", 3, 1).is_none());

    // Maps the loader adds later are visible too.
    cache.insert_source_map(
        "/app/dist/late.js",
        SourceMap::from_json(r#"{"version":3,"sources":["src/late.ts"],"mappings":"AAAA"}"#).unwrap(),
    );
    assert!(support.original_position("/app/dist/late.js", 1, 1).is_some());
}

struct CountingTimers {
    sleeps: AtomicUsize,
}

impl Timers for CountingTimers {
    fn sleep(&self, duration: std::time::Duration) -> BoxFuture<'static, ()> {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        TokioTimers.sleep(duration)
    }
}

#[tokio::test]
async fn pristine_timers_are_captured_before_patching() {
    let pristine = Arc::new(CountingTimers {
        sleeps: AtomicUsize::new(0),
    });
    let realm = Realm::new().with_timers(pristine.clone());

    harness()
        .bootstrap
        .initialize(&realm, &mut WorkerConfig::default(), &node(), loader())
        .await
        .unwrap();
    assert!(realm.has_global(REQUIRED_PRIMITIVES_GLOBAL));
    assert!(!realm.global_keys().contains(&REQUIRED_PRIMITIVES_GLOBAL.to_string()));

    realm.set_timers(Arc::new(TokioTimers));
    realm.safe_timers().sleep(std::time::Duration::ZERO).await;
    assert_eq!(pristine.sleeps.load(Ordering::SeqCst), 1);
}

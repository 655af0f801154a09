//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use testrealm_core::globals::SSR_ENV_VAR;
use tracing::info;

use crate::bootstrap::{Collaborators, WorkerBootstrap};
use crate::config::WorkerConfig;
use crate::console::CapturingConsoleFactory;
use crate::environment::{self, ResolvedTestEnvironment};
use crate::loader::ModuleCache;
use crate::realm::Realm;
use crate::scope;

use super::{CliError, CliResult, ExitCode};

// ============================================================================
// Shared setup
// ============================================================================

/// A worker realm after its first bootstrap call.
struct BootedWorker {
    realm: Arc<Realm>,
    config: WorkerConfig,
    resolved: ResolvedTestEnvironment,
    bootstrap: WorkerBootstrap,
    loader: Arc<ModuleCache>,
    console: Arc<CapturingConsoleFactory>,
}

fn load_config(path: Option<&Path>, environment: Option<&str>) -> CliResult<WorkerConfig> {
    let config = match path {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    Ok(match environment {
        Some(name) => config.with_environment(name),
        None => config,
    })
}

fn resolve_builtin(name: &str) -> CliResult<ResolvedTestEnvironment> {
    environment::builtin(name)
        .map(ResolvedTestEnvironment::new)
        .ok_or_else(|| CliError::failure(format!("Error: unknown environment '{name}' (expected 'node' or 'web')")))
}

async fn boot(path: Option<&Path>, environment: Option<&str>) -> CliResult<BootedWorker> {
    let mut config = load_config(path, environment)?;
    let resolved = resolve_builtin(&config.environment)?;
    let console = Arc::new(CapturingConsoleFactory::new());
    let mut bootstrap = WorkerBootstrap::new(Collaborators {
        console_factory: console.clone(),
        ..Collaborators::default()
    });
    let realm = Arc::new(Realm::new());
    let loader = Arc::new(ModuleCache::new());

    bootstrap
        .initialize(&realm, &mut config, &resolved, loader.clone())
        .await?;

    Ok(BootedWorker {
        realm,
        config,
        resolved,
        bootstrap,
        loader,
        console,
    })
}

// ============================================================================
// inspect
// ============================================================================

/// Render the state a bootstrap left in `realm`.
pub fn render_report(realm: &Realm, config: &WorkerConfig, resolved: &ResolvedTestEnvironment) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "environment: {} ({})",
        resolved.name(),
        resolved.transform_mode().as_str()
    );
    let _ = writeln!(
        out,
        "{SSR_ENV_VAR}: {:?}",
        realm.env_var(SSR_ENV_VAR).unwrap_or_default()
    );
    let _ = writeln!(
        out,
        "console intercept: {}",
        if config.disable_console_intercept { "disabled" } else { "enabled" }
    );
    let snapshot = config
        .snapshot_options
        .snapshot_environment
        .as_ref()
        .map(|e| e.name().to_string())
        .unwrap_or_else(|| "unresolved".to_string());
    let _ = writeln!(out, "snapshot environment: {snapshot}");

    let extensions = realm.with_interceptors(|t| t.extensions());
    if extensions.is_empty() {
        let _ = writeln!(out, "intercepted extensions: none");
    } else {
        let _ = writeln!(out, "intercepted extensions:");
        for (ext, kind) in extensions {
            let _ = writeln!(out, "  {ext} -> {}", kind.as_str());
        }
    }

    let _ = writeln!(out, "globals:");
    for (name, enumerable) in realm.global_descriptors() {
        let _ = writeln!(out, "  {name} ({})", if enumerable { "enumerable" } else { "hidden" });
    }
    out
}

/// Bootstrap a realm and print its state.
pub async fn inspect(path: Option<&Path>, environment: Option<&str>) -> CliResult<ExitCode> {
    let worker = boot(path, environment).await?;
    print!("{}", render_report(&worker.realm, &worker.config, &worker.resolved));
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// run-env
// ============================================================================

/// Simulate `files` test files on one worker: bootstrap before each, then activate the environment
/// around a body that writes one diagnostic line.
pub async fn run_env(path: Option<&Path>, environment: Option<&str>, files: usize) -> CliResult<ExitCode> {
    let mut worker = boot(path, environment).await?;

    for index in 0..files {
        if index > 0 {
            worker
                .bootstrap
                .initialize(&worker.realm, &mut worker.config, &worker.resolved, worker.loader.clone())
                .await?;
        }

        let realm = Arc::clone(&worker.realm);
        let globals = scope::with_environment(
            &worker.realm,
            &worker.resolved,
            &worker.config.environment_options,
            async move {
                realm.console().log(&format!("file {} running", index + 1));
                Ok(realm.global_keys())
            },
        )
        .await?;

        info!(file = index + 1, environment = worker.resolved.name(), "activation finished");
        println!("file {}: enumerable globals during body: {globals:?}", index + 1);
    }

    for entry in worker.console.console().take_entries() {
        println!("captured [{:?}] {}", entry.stream, entry.message);
    }
    println!(
        "active environment after scope: {}",
        worker.realm.active_environment().unwrap_or_default()
    );
    Ok(ExitCode::SUCCESS)
}

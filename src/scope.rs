//! Environment activation scope.
//!
//! [`with_environment`] wraps one test file's body: activate the environment, run the body, then
//! always drain pending deferred work and tear the environment down once setup produced a handle.
//!
//! ```text
//! Idle -> SettingUp -> Active -> Draining -> TearingDown -> Done | Failed
//!             \-> Failed (setup error, nothing to tear down)
//! ```
//!
//! The handle is owned by a drop guard from the moment setup returns until teardown starts, so a
//! cancelled or panicking body still gets its environment torn down on the current runtime.
//!
//! Known limitation: when both the body and teardown fail, the teardown error is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EnvironmentOptions;
use crate::environment::{ActivationHandle, ResolvedTestEnvironment};
use crate::errors::{BoxError, WorkerError, WorkerResult};
use crate::realm::Realm;

/// Lifecycle of a single activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPhase {
    Idle,
    SettingUp,
    Active,
    Draining,
    TearingDown,
    Done,
    Failed,
}

struct Activation<'a> {
    environment: &'a str,
    phase: ActivationPhase,
}

impl Activation<'_> {
    fn enter(&mut self, phase: ActivationPhase) {
        debug!(environment = self.environment, from = ?self.phase, to = ?phase, "activation phase");
        self.phase = phase;
    }
}

/// Wait for one cycle of deferred work using timers nothing in the realm could have patched.
pub async fn drain_deferred(realm: &Realm) {
    let timers = realm.safe_timers();
    timers.sleep(Duration::ZERO).await;
    tokio::task::yield_now().await;
}

/// Owns the activation handle until teardown starts. Dropped while still armed, it hands drain and
/// teardown to the current runtime.
struct TeardownGuard {
    realm: Arc<Realm>,
    environment: String,
    handle: Option<Box<dyn ActivationHandle>>,
}

impl TeardownGuard {
    fn disarm(&mut self) -> Option<Box<dyn ActivationHandle>> {
        self.handle.take()
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let realm = Arc::clone(&self.realm);
        let environment = std::mem::take(&mut self.environment);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(environment = %environment, "activation abandoned; tearing down in the background");
                runtime.spawn(async move {
                    drain_deferred(&realm).await;
                    if let Err(e) = handle.teardown(&realm).await {
                        warn!(environment = %environment, error = %e, "background teardown failed");
                    }
                });
            }
            Err(_) => {
                warn!(environment = %environment, "activation abandoned outside a runtime; teardown skipped");
            }
        }
    }
}

/// Run `body` inside the environment described by `resolved`.
///
/// Sets the realm's active environment marker (it is not cleared afterwards), notifies the
/// expectation state, sets the environment up, awaits `body`, then drains and tears down.
pub async fn with_environment<F, T>(
    realm: &Arc<Realm>,
    resolved: &ResolvedTestEnvironment,
    options: &EnvironmentOptions,
    body: F,
) -> WorkerResult<T>
where
    F: Future<Output = Result<T, BoxError>>,
{
    let name = resolved.name().to_string();
    let mut activation = Activation {
        environment: &name,
        phase: ActivationPhase::Idle,
    };

    realm.set_active_environment(&name);
    realm.expect().set_environment(&name);

    activation.enter(ActivationPhase::SettingUp);
    let handle = match resolved.environment.setup(realm, options).await {
        Ok(handle) => handle,
        Err(source) => {
            activation.enter(ActivationPhase::Failed);
            return Err(WorkerError::EnvironmentSetup {
                environment: name.clone(),
                source,
            });
        }
    };

    let mut guard = TeardownGuard {
        realm: Arc::clone(realm),
        environment: name.clone(),
        handle: Some(handle),
    };

    activation.enter(ActivationPhase::Active);
    let outcome = body.await;

    activation.enter(ActivationPhase::Draining);
    drain_deferred(realm).await;

    activation.enter(ActivationPhase::TearingDown);
    let teardown = match guard.disarm() {
        Some(handle) => handle.teardown(realm).await,
        None => Ok(()),
    };

    match (outcome, teardown) {
        (outcome, Err(source)) => {
            activation.enter(ActivationPhase::Failed);
            if let Err(body_error) = outcome {
                warn!(environment = %name, error = %body_error, "teardown failure supersedes body error");
            }
            Err(WorkerError::Teardown {
                environment: name.clone(),
                source,
            })
        }
        (Err(source), Ok(())) => {
            activation.enter(ActivationPhase::Failed);
            Err(WorkerError::Body {
                environment: name.clone(),
                source,
            })
        }
        (Ok(value), Ok(())) => {
            activation.enter(ActivationPhase::Done);
            Ok(value)
        }
    }
}

//! The shared execution context a worker runs every test file in.
//!
//! A [`Realm`] is an explicit context object rather than a set of process globals: it carries the
//! global property table test code sees, a sandboxed environment-variable map, overridable I/O and
//! timer handles, the stub interception table, and source-map support. Environments mutate it during
//! setup/teardown; the bootstrap fills it once per worker.
//!
//! ## Locking
//!
//! Every field sits behind a `parking_lot` lock that is only held inside these accessors. Nothing
//! here hands out a guard, so no lock can be held across an `.await`.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use testrealm_core::globals::REQUIRED_PRIMITIVES_GLOBAL;

use crate::console::{DiagnosticOutput, StdioOutput};
use crate::interception::InterceptionTable;
use crate::sourcemap::SourceMapSupport;

/// Timer primitives available to code running in the realm. Fake-timer implementations replace
/// these on the realm; the captured [`RequiredPrimitives`] keep the originals reachable.
pub trait Timers: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Timers backed by the tokio clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimers;

impl Timers for TokioTimers {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Pristine timer primitives, captured before anything in the realm can patch them.
#[derive(Clone)]
pub struct RequiredPrimitives {
    pub timers: Arc<dyn Timers>,
}

impl RequiredPrimitives {
    /// Snapshot the realm's current primitives.
    pub fn capture(realm: &Realm) -> Self {
        Self {
            timers: realm.timers(),
        }
    }
}

impl fmt::Debug for RequiredPrimitives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequiredPrimitives").finish_non_exhaustive()
    }
}

/// Receives the name of the environment the assertion library should report against.
pub trait ExpectationState: Send + Sync {
    fn set_environment(&self, name: &str);
}

/// Default expectation state: remembers the last environment name it was told about.
#[derive(Debug, Default)]
pub struct ExpectState {
    environment: RwLock<Option<String>>,
}

impl ExpectState {
    pub fn environment(&self) -> Option<String> {
        self.environment.read().clone()
    }
}

impl ExpectationState for ExpectState {
    fn set_environment(&self, name: &str) {
        *self.environment.write() = Some(name.to_string());
    }
}

struct GlobalProperty {
    value: Arc<dyn Any + Send + Sync>,
    enumerable: bool,
}

/// Shared execution context for all test files of one worker.
pub struct Realm {
    globals: RwLock<BTreeMap<String, GlobalProperty>>,
    env: RwLock<BTreeMap<String, String>>,
    console: RwLock<Arc<dyn DiagnosticOutput>>,
    timers: RwLock<Arc<dyn Timers>>,
    interceptors: RwLock<InterceptionTable>,
    source_maps: RwLock<Option<Arc<SourceMapSupport>>>,
    active_environment: RwLock<Option<String>>,
    expect: Arc<dyn ExpectationState>,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl Realm {
    /// Create a realm writing diagnostics to stdio and using tokio timers.
    pub fn new() -> Self {
        Self {
            globals: RwLock::new(BTreeMap::new()),
            env: RwLock::new(BTreeMap::new()),
            console: RwLock::new(Arc::new(StdioOutput)),
            timers: RwLock::new(Arc::new(TokioTimers)),
            interceptors: RwLock::new(InterceptionTable::default()),
            source_maps: RwLock::new(None),
            active_environment: RwLock::new(None),
            expect: Arc::new(ExpectState::default()),
        }
    }

    pub fn with_console(self, console: Arc<dyn DiagnosticOutput>) -> Self {
        *self.console.write() = console;
        self
    }

    pub fn with_timers(self, timers: Arc<dyn Timers>) -> Self {
        *self.timers.write() = timers;
        self
    }

    pub fn with_expect(mut self, expect: Arc<dyn ExpectationState>) -> Self {
        self.expect = expect;
        self
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Define (or overwrite) a global property.
    pub fn define_global(&self, name: &str, value: Arc<dyn Any + Send + Sync>, enumerable: bool) {
        self.globals
            .write()
            .insert(name.to_string(), GlobalProperty { value, enumerable });
    }

    /// Fetch a global as a concrete type. Returns `None` if it is missing or of another type.
    pub fn global<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.globals.read().get(name).map(|p| Arc::clone(&p.value))?;
        value.downcast::<T>().ok()
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.read().contains_key(name)
    }

    pub fn remove_global(&self, name: &str) -> bool {
        self.globals.write().remove(name).is_some()
    }

    /// Names visible to enumeration, in sorted order.
    pub fn global_keys(&self) -> Vec<String> {
        self.globals
            .read()
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Every global with its enumerability, hidden ones included.
    pub fn global_descriptors(&self) -> Vec<(String, bool)> {
        self.globals
            .read()
            .iter()
            .map(|(k, p)| (k.clone(), p.enumerable))
            .collect()
    }

    // ------------------------------------------------------------------
    // Environment variables
    // ------------------------------------------------------------------

    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env.read().get(name).cloned()
    }

    pub fn set_env_var(&self, name: &str, value: &str) {
        self.env.write().insert(name.to_string(), value.to_string());
    }

    // ------------------------------------------------------------------
    // I/O and timers
    // ------------------------------------------------------------------

    pub fn console(&self) -> Arc<dyn DiagnosticOutput> {
        Arc::clone(&self.console.read())
    }

    pub fn set_console(&self, console: Arc<dyn DiagnosticOutput>) {
        *self.console.write() = console;
    }

    pub fn timers(&self) -> Arc<dyn Timers> {
        Arc::clone(&self.timers.read())
    }

    pub fn set_timers(&self, timers: Arc<dyn Timers>) {
        *self.timers.write() = timers;
    }

    /// Timers that bypass any patching: the captured pristine timers once bootstrap has run, the
    /// current realm timers before that.
    pub fn safe_timers(&self) -> Arc<dyn Timers> {
        match self.global::<RequiredPrimitives>(REQUIRED_PRIMITIVES_GLOBAL) {
            Some(required) => Arc::clone(&required.timers),
            None => self.timers(),
        }
    }

    // ------------------------------------------------------------------
    // Module interception and source maps
    // ------------------------------------------------------------------

    /// Run `f` with exclusive access to the interception table.
    pub fn with_interceptors<R>(&self, f: impl FnOnce(&mut InterceptionTable) -> R) -> R {
        f(&mut self.interceptors.write())
    }

    /// Stub value for an import id, if its extension is intercepted. The module loader consults this
    /// before trying to parse a file as code.
    pub fn resolve_stub(&self, id: &str) -> Option<String> {
        self.interceptors.read().resolve(id)
    }

    pub fn source_maps(&self) -> Option<Arc<SourceMapSupport>> {
        self.source_maps.read().clone()
    }

    pub fn set_source_maps(&self, support: Arc<SourceMapSupport>) {
        *self.source_maps.write() = Some(support);
    }

    // ------------------------------------------------------------------
    // Environment activation
    // ------------------------------------------------------------------

    /// Name of the most recently activated environment. Never cleared once set.
    pub fn active_environment(&self) -> Option<String> {
        self.active_environment.read().clone()
    }

    pub fn set_active_environment(&self, name: &str) {
        *self.active_environment.write() = Some(name.to_string());
    }

    pub fn expect(&self) -> &Arc<dyn ExpectationState> {
        &self.expect
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("globals", &self.global_descriptors())
            .field("env", &*self.env.read())
            .field("active_environment", &self.active_environment())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_globals_are_not_enumerated() {
        let realm = Realm::new();
        realm.define_global("visible", Arc::new(1_u32), true);
        realm.define_global("hidden", Arc::new(2_u32), false);

        assert_eq!(realm.global_keys(), vec!["visible".to_string()]);
        assert!(realm.has_global("hidden"));
        assert_eq!(realm.global::<u32>("hidden").as_deref(), Some(&2));
    }

    #[test]
    fn test_global_type_mismatch_is_none() {
        let realm = Realm::new();
        realm.define_global("n", Arc::new(7_u32), true);
        assert!(realm.global::<String>("n").is_none());
        assert!(realm.global::<u32>("missing").is_none());
    }

    #[test]
    fn test_redefining_global_overwrites_and_can_hide() {
        let realm = Realm::new();
        realm.define_global("api", Arc::new("v1".to_string()), true);
        realm.define_global("api", Arc::new("v2".to_string()), false);

        assert!(realm.global_keys().is_empty());
        assert_eq!(realm.global::<String>("api").as_deref().map(String::as_str), Some("v2"));
    }

    #[test]
    fn test_safe_timers_prefer_captured_primitives() {
        let realm = Realm::new();
        let pristine = realm.timers();
        realm.define_global(
            REQUIRED_PRIMITIVES_GLOBAL,
            Arc::new(RequiredPrimitives::capture(&realm)),
            false,
        );

        realm.set_timers(Arc::new(TokioTimers));
        assert!(!Arc::ptr_eq(&realm.timers(), &pristine));
        assert!(Arc::ptr_eq(&realm.safe_timers(), &pristine));
    }

    #[test]
    fn test_expect_state_records_environment() {
        let expect = Arc::new(ExpectState::default());
        let realm = Realm::new().with_expect(expect.clone());
        realm.expect().set_environment("web");
        assert_eq!(expect.environment().as_deref(), Some("web"));
    }
}

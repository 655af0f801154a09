//! Environment descriptors and activation handles.
//!
//! An [`Environment`] is supplied by whatever resolves the test file's environment; this crate only
//! activates it. Two small built-ins cover the server-like and client-like cases for tooling and tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use testrealm_core::TransformMode;
use testrealm_core::globals::WINDOW_GLOBAL;

use crate::config::EnvironmentOptions;
use crate::errors::BoxError;
use crate::realm::Realm;

/// A runtime environment variant test files can run in.
#[async_trait]
pub trait Environment: Send + Sync {
    fn name(&self) -> &str;

    fn transform_mode(&self) -> TransformMode;

    /// Install the environment into the realm. The returned handle undoes it.
    async fn setup(
        &self,
        realm: &Realm,
        options: &EnvironmentOptions,
    ) -> Result<Box<dyn ActivationHandle>, BoxError>;
}

/// Returned by [`Environment::setup`]; consumed by teardown so it can't outlive the activation.
#[async_trait]
pub trait ActivationHandle: Send {
    async fn teardown(self: Box<Self>, realm: &Realm) -> Result<(), BoxError>;
}

/// The environment resolved for a test file.
#[derive(Clone)]
pub struct ResolvedTestEnvironment {
    pub environment: Arc<dyn Environment>,
}

impl ResolvedTestEnvironment {
    pub fn new(environment: Arc<dyn Environment>) -> Self {
        Self { environment }
    }

    pub fn name(&self) -> &str {
        self.environment.name()
    }

    pub fn transform_mode(&self) -> TransformMode {
        self.environment.transform_mode()
    }
}

impl fmt::Debug for ResolvedTestEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTestEnvironment")
            .field("name", &self.name())
            .field("transform_mode", &self.transform_mode())
            .finish()
    }
}

struct NoopHandle;

#[async_trait]
impl ActivationHandle for NoopHandle {
    async fn teardown(self: Box<Self>, _realm: &Realm) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Server-like environment: the realm is used as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeEnvironment;

#[async_trait]
impl Environment for NodeEnvironment {
    fn name(&self) -> &str {
        "node"
    }

    fn transform_mode(&self) -> TransformMode {
        TransformMode::Ssr
    }

    async fn setup(
        &self,
        _realm: &Realm,
        _options: &EnvironmentOptions,
    ) -> Result<Box<dyn ActivationHandle>, BoxError> {
        Ok(Box::new(NoopHandle))
    }
}

/// Default page URL of the client-like environment.
pub const DEFAULT_WINDOW_URL: &str = "http://localhost:3000/";

/// The `window` global the client-like environment defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub location: String,
}

/// Client-like environment: defines an enumerable `window` global for the activation's lifetime.
///
/// Options (`environmentOptions.web`): `{ "url": "<page url>" }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebEnvironment;

struct WindowHandle;

#[async_trait]
impl ActivationHandle for WindowHandle {
    async fn teardown(self: Box<Self>, realm: &Realm) -> Result<(), BoxError> {
        realm.remove_global(WINDOW_GLOBAL);
        Ok(())
    }
}

#[async_trait]
impl Environment for WebEnvironment {
    fn name(&self) -> &str {
        "web"
    }

    fn transform_mode(&self) -> TransformMode {
        TransformMode::Web
    }

    async fn setup(
        &self,
        realm: &Realm,
        options: &EnvironmentOptions,
    ) -> Result<Box<dyn ActivationHandle>, BoxError> {
        let location = match options.for_environment(self.name()).and_then(|o| o.get("url")) {
            None => DEFAULT_WINDOW_URL.to_string(),
            Some(Value::String(url)) => url.clone(),
            Some(other) => return Err(format!("web environment url must be a string, got {other}").into()),
        };
        realm.define_global(WINDOW_GLOBAL, Arc::new(Window { location }), true);
        Ok(Box::new(WindowHandle))
    }
}

/// Look up a built-in environment by name.
pub fn builtin(name: &str) -> Option<Arc<dyn Environment>> {
    match name {
        "node" => Some(Arc::new(NodeEnvironment)),
        "web" => Some(Arc::new(WebEnvironment)),
        _ => None,
    }
}

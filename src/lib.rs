#![forbid(unsafe_code)]
//! Per-worker test environment bootstrap
//!
//! A test worker runs many test files in one shared execution context, the [`Realm`]. This crate
//! prepares that realm before each file ([`WorkerBootstrap::initialize`]) and wraps each file's body
//! in a scoped environment activation ([`with_environment`]) with guaranteed teardown.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Collaborator failures**: Errors from environments, snapshot resolvers and test bodies travel as
//!   [`errors::BoxError`] and are wrapped in [`WorkerError`] with the step or environment they came from.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod console;
pub mod environment;
pub mod errors;
pub mod interception;
pub mod loader;
pub mod realm;
pub mod scope;
pub mod snapshot;
pub mod sourcemap;

pub use bootstrap::{BootstrapState, Collaborators, WorkerBootstrap};
pub use config::{EnvironmentOptions, WorkerConfig};
pub use environment::{ActivationHandle, Environment, ResolvedTestEnvironment};
pub use errors::{WorkerError, WorkerResult};
pub use realm::Realm;
pub use scope::with_environment;

pub use testrealm_core::{StubKind, TransformMode};

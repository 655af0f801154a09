//! Error taxonomy for worker bootstrap and environment activation.
//!
//! Every operation surfaces its errors to the immediate caller. The only failures that are absorbed
//! are source-map lookup misses (positions stay untranslated) and stub resolution (cannot fail).

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Type-erased error produced by an external collaborator (environment, snapshot resolver, test body).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One-time initialization step, used to pinpoint which part of worker bootstrap failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    CommonSetup,
    SnapshotEnvironment,
    ConsoleIntercept,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStep::CommonSetup => write!(f, "common setup"),
            InitStep::SnapshotEnvironment => write!(f, "snapshot environment resolution"),
            InitStep::ConsoleIntercept => write!(f, "console interception"),
        }
    }
}

/// Errors raised by this crate.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkerError {
    #[error("worker initialization failed during {step}")]
    #[diagnostic(
        code(testrealm::init),
        help("initialization failures are fatal for the worker; restart it instead of retrying")
    )]
    Initialization {
        step: InitStep,
        #[source]
        source: BoxError,
    },

    #[error("failed to set up environment '{environment}'")]
    #[diagnostic(code(testrealm::env::setup))]
    EnvironmentSetup {
        environment: String,
        #[source]
        source: BoxError,
    },

    #[error("test body failed in environment '{environment}'")]
    #[diagnostic(code(testrealm::env::body))]
    Body {
        environment: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to tear down environment '{environment}'")]
    #[diagnostic(
        code(testrealm::env::teardown),
        help("a teardown failure replaces any error the test body raised")
    )]
    Teardown {
        environment: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to read worker config {path}")]
    #[diagnostic(code(testrealm::config::io))]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid worker config")]
    #[diagnostic(code(testrealm::config::parse))]
    ConfigParse(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn init(step: InitStep, source: impl Into<BoxError>) -> Self {
        WorkerError::Initialization {
            step,
            source: source.into(),
        }
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

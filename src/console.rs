//! Diagnostic output handles and the capturing console.
//!
//! Test code logs through the realm's [`DiagnosticOutput`]. The bootstrap swaps the default stdio
//! output for a capturing one so the runner can attribute output to tests instead of letting it
//! interleave on the worker's stdout.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::BoxError;
use crate::realm::Realm;

/// Stream a diagnostic entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Info,
    Debug,
    Warn,
    Error,
}

impl LogLevel {
    pub fn stream(self) -> Stream {
        match self {
            LogLevel::Warn | LogLevel::Error => Stream::Stderr,
            LogLevel::Log | LogLevel::Info | LogLevel::Debug => Stream::Stdout,
        }
    }
}

/// The realm's diagnostic output interface.
pub trait DiagnosticOutput: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);

    fn log(&self, message: &str) {
        self.write(LogLevel::Log, message);
    }

    fn error(&self, message: &str) {
        self.write(LogLevel::Error, message);
    }
}

/// Writes straight to the worker's stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioOutput;

impl DiagnosticOutput for StdioOutput {
    fn write(&self, level: LogLevel, message: &str) {
        match level.stream() {
            Stream::Stdout => println!("{}", message),
            Stream::Stderr => eprintln!("{}", message),
        }
    }
}

/// A captured diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleEntry {
    pub level: LogLevel,
    pub stream: Stream,
    pub message: String,
}

/// Buffers everything written to it until the runner drains it.
#[derive(Debug, Default)]
pub struct CapturingConsole {
    entries: Mutex<Vec<ConsoleEntry>>,
}

impl CapturingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every buffered entry.
    pub fn take_entries(&self) -> Vec<ConsoleEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticOutput for CapturingConsole {
    fn write(&self, level: LogLevel, message: &str) {
        let stream = level.stream();
        debug!(target: "testrealm::console", ?stream, ?level, "{}", message);
        self.entries.lock().push(ConsoleEntry {
            level,
            stream,
            message: message.to_string(),
        });
    }
}

/// Builds the diagnostic output that replaces the realm's default one.
pub trait ConsoleFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn DiagnosticOutput>, BoxError>;
}

/// Hands out one shared [`CapturingConsole`], which stays reachable through [`Self::console`].
#[derive(Debug, Default, Clone)]
pub struct CapturingConsoleFactory {
    console: Arc<CapturingConsole>,
}

impl CapturingConsoleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn console(&self) -> Arc<CapturingConsole> {
        Arc::clone(&self.console)
    }
}

impl ConsoleFactory for CapturingConsoleFactory {
    fn create(&self) -> Result<Arc<dyn DiagnosticOutput>, BoxError> {
        Ok(self.console.clone())
    }
}

/// Replace the realm's diagnostic output with one built by `factory`.
pub fn install(realm: &Realm, factory: &dyn ConsoleFactory) -> Result<(), BoxError> {
    realm.set_console(factory.create()?);
    debug!("installed capturing console");
    Ok(())
}

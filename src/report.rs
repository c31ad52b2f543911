//! Error reporting hooks for background tasks.
//!
//! The mixer pump, the registry sampler and the recognition worker all run
//! on their own threads; failures there must never cross the component
//! boundary as panics or returned errors. They are funneled through an
//! injectable [`ErrorReporter`] instead, which is also where transient
//! recognition errors become observable for diagnosis.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Errors that can occur inside a background task.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// Recoverable error; the task continues.
    Recoverable(String),
    /// Fatal error; the task shuts down.
    Fatal(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            TaskError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {}

/// Trait for reporting background-task errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from the named component.
    fn report(&self, component: &str, error: &TaskError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, error: &TaskError) {
        eprintln!("[{}] {}", component, error);
    }
}

/// Reporter that collects reports in memory, for assertions in tests and
/// for callers who want to inspect absorbed transient failures.
#[derive(Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<(String, String)>>>,
}

impl CollectingReporter {
    /// Creates an empty collecting reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all `(component, message)` pairs reported so far.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, component: &str, error: &TaskError) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((component.to_string(), error.to_string()));
        }
    }
}

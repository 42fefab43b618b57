//! Deployment log sink.
//!
//! Every action, hook and the pipeline itself report through a `DeployLog`
//! handed to them by the caller. `StderrLog` is what the CLI uses;
//! `MemoryLog` keeps entries so they can be inspected afterwards (tests, and
//! the warning list in a pipeline report).

use serde::Serialize;
use std::cell::RefCell;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Notice,
    Warning,
    Error,
}

impl LogLevel {
    fn label(self) -> Option<&'static str> {
        match self {
            LogLevel::Info => None,
            LogLevel::Success => Some("ok"),
            LogLevel::Notice => Some("notice"),
            LogLevel::Warning => Some("warning"),
            LogLevel::Error => Some("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

pub trait DeployLog {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn success(&self, message: &str) {
        self.log(LogLevel::Success, message);
    }

    fn notice(&self, message: &str) {
        self.log(LogLevel::Notice, message);
    }

    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Writes `[drydock] message` lines to stderr, keeping stdout free for the
/// JSON response.
pub struct StderrLog {
    prefix: String,
}

impl StderrLog {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for StderrLog {
    fn default() -> Self {
        Self::new("drydock")
    }
}

impl DeployLog for StderrLog {
    fn log(&self, level: LogLevel, message: &str) {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = match level.label() {
            Some(label) => writeln!(handle, "[{}] {}: {}", self.prefix, label, message),
            None => writeln!(handle, "[{}] {}", self.prefix, message),
        };
    }
}

#[derive(Default)]
pub struct MemoryLog {
    entries: RefCell<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| e.message.contains(needle))
    }

    pub fn contains_at(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl DeployLog for MemoryLog {
    fn log(&self, level: LogLevel, message: &str) {
        self.entries.borrow_mut().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

/// Forwards to an inner log while keeping a copy of every warning and error.
pub struct Recording<'a> {
    inner: &'a dyn DeployLog,
    kept: RefCell<Vec<LogEntry>>,
}

impl<'a> Recording<'a> {
    pub fn new(inner: &'a dyn DeployLog) -> Self {
        Self {
            inner,
            kept: RefCell::new(Vec::new()),
        }
    }

    pub fn into_kept(self) -> Vec<LogEntry> {
        self.kept.into_inner()
    }
}

impl DeployLog for Recording<'_> {
    fn log(&self, level: LogLevel, message: &str) {
        if matches!(level, LogLevel::Warning | LogLevel::Error) {
            self.kept.borrow_mut().push(LogEntry {
                level,
                message: message.to_string(),
            });
        }
        self.inner.log(level, message);
    }
}

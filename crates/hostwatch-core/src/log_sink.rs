//! Central log sink with a bounded in-memory history
//!
//! Actions and the rule engine write through [`LogSink::log`]. Every entry is
//! forwarded to `tracing` and kept in a fixed-size ring buffer so a dashboard
//! or CLI can show the recent history.

use std::collections::VecDeque;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::{LogEntry, LogLevel};

/// Default number of entries kept
pub const DEFAULT_CAPACITY: usize = 50;

/// Shared log service
#[derive(Debug)]
pub struct LogSink {
    capacity: usize,
    history: Mutex<VecDeque<LogEntry>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogSink {
    /// Create a sink keeping at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record a line; the oldest entry is dropped once the buffer is full
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();

        match level {
            LogLevel::Debug => debug!(target: "hostwatch::sink", "{message}"),
            LogLevel::Info => info!(target: "hostwatch::sink", "{message}"),
            LogLevel::Warn => warn!(target: "hostwatch::sink", "{message}"),
            LogLevel::Error => error!(target: "hostwatch::sink", "{message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
        };

        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Shorthand for [`LogLevel::Info`]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Shorthand for [`LogLevel::Warn`]
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Shorthand for [`LogLevel::Error`]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Copy of the buffered entries, oldest first
    pub fn history(&self) -> Vec<LogEntry> {
        self.history.lock().iter().cloned().collect()
    }

    /// Maximum number of entries kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

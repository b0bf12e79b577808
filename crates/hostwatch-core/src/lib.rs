//! # Hostwatch
//!
//! Host metrics agent with edge-triggered threshold rules.
//!
//! Hostwatch samples processor load, memory usage and the process table at a
//! fixed cadence, publishes each sample as an immutable snapshot and evaluates
//! user-defined rules against it. A rule's action (log, desktop notification,
//! process kill, shell command) runs once when its condition becomes true and
//! not again until the condition has cleared.
//!
//! ## Architecture
//!
//! - **Collector**: metric sources for CPU, RAM and processes
//! - **Alerting**: conditions, actions, rules and the persisted rule file
//! - **Agent**: the poll loop and the thread-safe handle around it
//! - **Platform**: narrow traits over the OS calls the sources and actions need
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the agent in the foreground
//! hostwatch run
//!
//! # One-off sample
//! hostwatch snapshot --format json
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod agent;
pub mod alerting;
pub mod collector;
pub mod config;
pub mod error;
pub mod log_sink;
pub mod models;
pub mod platform;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentHandle, RunningAgent};
pub use config::AgentConfig;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::agent::{Agent, AgentHandle, AgentState, RunningAgent};
    pub use crate::alerting::{ConfigStore, RuleFactory, RuleSet};
    pub use crate::config::AgentConfig;
    pub use crate::error::{Error, Result};
    pub use crate::log_sink::LogSink;
    pub use crate::models::*;
}

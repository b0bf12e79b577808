//! Error types for Hostwatch

use thiserror::Error;

/// Result type alias using Hostwatch's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Hostwatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Metric source could not be set up
    #[error("Source initialization failed: {source_name}: {message}")]
    Init {
        source_name: String,
        message: String,
    },

    /// Transient failure while sampling a metric source
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// Persisted rule file could not be parsed
    #[error("Rule file parse error: {0}")]
    ConfigParse(String),

    /// Action failed while executing
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The scheduling loop could not be started
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an initialization error for a named source
    pub fn init(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Init {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Failure while refreshing a metric source from the OS
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{source_name}: OS query failed: {message}")]
    Os {
        source_name: String,
        message: String,
    },

    #[error("{source_name}: OS returned no data")]
    Empty { source_name: String },
}

impl CollectError {
    /// Wrap an OS-level failure for the given source
    pub fn os(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Os {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }
}

/// Failure raised inside an action; always logged, never propagated past the action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to launch `{command}`: {message}")]
    Launch { command: String, message: String },

    #[error("no running process matches {0}")]
    TargetNotFound(String),

    #[error("failed to terminate {name} (pid {pid})")]
    Terminate { pid: u32, name: String },

    #[error("process enumeration failed: {0}")]
    Enumeration(String),
}

//! Error handling module for opsdeck
//!
//! Provides the library error type used by the dispatcher, supervisor and
//! log aggregator. Configuration loading and the binary wrap these in
//! `anyhow` where extra context is useful.

use thiserror::Error;

/// Main error type for opsdeck
#[derive(Error, Debug)]
pub enum DeckError {
    /// IO errors (file operations, terminal, pipes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No action with this id is configured
    #[error("Unknown action: {id}")]
    UnknownAction { id: String },

    /// The same action is already executing
    #[error("Action '{id}' is already running")]
    ActionInFlight { id: String },

    /// Destructive action invoked without operator confirmation
    #[error("Action '{id}' is destructive and requires confirmation")]
    ConfirmationRequired { id: String },

    /// Action execution errors (non-zero exit, timeout)
    #[error("Action failed: {0}")]
    Action(String),

    /// No service with this id is configured
    #[error("Unknown service: {id}")]
    UnknownService { id: String },

    /// Start requested for a service that is online
    #[error("Service '{id}' is already running")]
    AlreadyRunning { id: String },

    /// Stop requested for a service that is not online
    #[error("Service '{id}' is not running")]
    NotRunning { id: String },

    /// A child process could not be spawned
    #[error("Failed to spawn {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// State errors (mutex poisoning, invalid state)
    #[error("State error: {0}")]
    State(String),

    /// Terminal/UI errors
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for opsdeck operations
pub type Result<T> = std::result::Result<T, DeckError>;

impl DeckError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an action failure error
    pub fn action(msg: impl Into<String>) -> Self {
        Self::Action(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a terminal error
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn unknown_action(id: impl Into<String>) -> Self {
        Self::UnknownAction { id: id.into() }
    }

    pub fn unknown_service(id: impl Into<String>) -> Self {
        Self::UnknownService { id: id.into() }
    }

    pub fn spawn(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            what: what.into(),
            source,
        }
    }

    /// Build a state error from a poisoned lock
    pub fn poisoned<T>(err: std::sync::PoisonError<T>) -> Self {
        Self::State(format!("Mutex poisoned: {}", err))
    }
}

use std::io::ErrorKind;

use thiserror::Error;

/// Common error types for the coordinator
#[derive(Error, Debug, Clone)]
pub enum CoordinatorError {
    /// Malformed or missing registration record
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A worker with the same name is already registered
    #[error("name already in use: {0}")]
    NameConflict(String),

    /// The peer closed or reset the stream
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Any other network/IO error
    #[error("network error: {0}")]
    Network(String),

    /// The worker has not yet answered an earlier request
    #[error("worker busy: {0}")]
    WorkerBusy(String),

    /// A bounded wait elapsed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Declared lengths out of bounds or unparsable header
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Serialization/deserialization errors
    #[error("{0}")]
    Serialization(String),

    /// File system related errors
    #[error("{0}")]
    FileSystem(String),

    /// Configuration related errors
    #[error("{0}")]
    Configuration(String),

    /// Dataset could not be loaded or is unusable
    #[error("dataset error: {0}")]
    Dataset(String),

    /// A workflow is already in flight
    #[error("a workflow is already running ({0})")]
    WorkflowBusy(String),

    /// Nothing to schedule
    #[error("no connected workers")]
    NoWorkers,

    /// Registry actor unreachable or replied with an error
    #[error("registry error: {0}")]
    Registry(String),

    /// Spawn errors
    #[error("{0}")]
    Spawn(String),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String)
}

impl CoordinatorError {
    /// True when the peer is unambiguously gone and its registration should be dropped.
    pub fn is_hard_close(&self) -> bool {
        matches!(self, CoordinatorError::ConnectionClosed(_))
    }

    /// True for bounded waits that elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoordinatorError::Timeout(_))
    }
}

/// Convert from std::io::Error, keeping the distinction the scheduler relies on
impl From<std::io::Error> for CoordinatorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => CoordinatorError::ConnectionClosed(err.to_string()),
            ErrorKind::TimedOut => CoordinatorError::Timeout(err.to_string()),
            ErrorKind::InvalidData => CoordinatorError::MalformedFrame(err.to_string()),
            _ => CoordinatorError::Network(err.to_string())
        }
    }
}

/// Convert from tokio's elapsed marker
impl From<tokio::time::error::Elapsed> for CoordinatorError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        CoordinatorError::Timeout(err.to_string())
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for CoordinatorError {
    fn from(err: anyhow::Error) -> Self {
        CoordinatorError::Generic(err.to_string())
    }
}

/// Convert from serde_json::Error
impl From<serde_json::Error> for CoordinatorError {
    fn from(err: serde_json::Error) -> Self {
        CoordinatorError::Serialization(err.to_string())
    }
}

/// Convert from serde_yaml::Error
impl From<serde_yaml::Error> for CoordinatorError {
    fn from(err: serde_yaml::Error) -> Self {
        CoordinatorError::Configuration(err.to_string())
    }
}

/// Convert from ractor::SpawnErr
impl From<ractor::SpawnErr> for CoordinatorError {
    fn from(err: ractor::SpawnErr) -> Self {
        CoordinatorError::Spawn(err.to_string())
    }
}

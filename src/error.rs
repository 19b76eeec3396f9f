//! Error types for hiperfetch
//!
//! Errors are split by how far they are allowed to travel:
//! - [`SubmitError`] and [`SinkError`] are recoverable and stay local to one job
//! - [`EngineFault`] is fatal and unwinds the daemon loop
//! - [`Error`] is the crate-level error returned from startup, persistence and
//!   the daemon itself

use crate::types::Socket;
use thiserror::Error;

/// Result type alias for hiperfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hiperfetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "intake.batch_limit")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transfer engine hit an unrecoverable fault
    #[error("engine fault: {0}")]
    Engine(#[from] EngineFault),

    /// curl multi handle could not be configured
    #[error("curl error: {0}")]
    Curl(#[from] curl::MultiError),

    /// Named pipe setup failed
    #[error("intake error: {0}")]
    Intake(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// A job was refused at submission time
///
/// The offending token is skipped and intake continues.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The token does not parse as an absolute URL
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected token
        url: String,
        /// Parser message
        reason: String,
    },

    /// The transport refused to configure or accept the handle
    #[error("transport rejected {url:?}: {reason}")]
    Rejected {
        /// The rejected URL
        url: String,
        /// Transport message
        reason: String,
    },
}

/// Unrecoverable engine failure
///
/// Raised when the transport's callback protocol is violated or the reactor
/// can no longer be kept consistent with the transport's view of its sockets.
#[derive(Debug, Error)]
pub enum EngineFault {
    /// The transport asked to stop watching a socket that was never watched
    #[error("transport removed socket {socket} which has no watch")]
    UnknownSocket {
        /// The offending descriptor
        socket: Socket,
    },

    /// The reactor refused a registration
    #[error("failed to register socket {socket} with the reactor: {source}")]
    Registration {
        /// Descriptor being registered
        socket: Socket,
        /// Underlying reactor error
        #[source]
        source: std::io::Error,
    },

    /// A multi-handle call failed
    #[error("{context} failed: {reason}")]
    Transport {
        /// The call that failed (e.g., "socket_action")
        context: &'static str,
        /// Transport message
        reason: String,
    },
}

/// Completion persistence failed
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink's writer is gone and can no longer accept records
    #[error("completion sink is closed")]
    Closed,
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

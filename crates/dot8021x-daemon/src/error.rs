//! Daemon error types (§10.4): aggregates the crate-wide `dot8021x_types::Error` plus the
//! daemon's own config/IO/platform concerns, following the teacher's `DaemonError` shape.

use thiserror::Error;

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in daemon operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The daemon is already running.
    #[error("Daemon is already running (PID: {pid})")]
    AlreadyRunning {
        /// Process ID of the running daemon.
        pid: u32,
    },

    /// The daemon is not running.
    #[error("Daemon is not running")]
    NotRunning,

    /// Platform-specific error (daemonize, service install, signal handling).
    #[error("Platform error: {message}")]
    Platform {
        /// Error message.
        message: String,
    },

    /// TOML parsing error.
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// An error from the core authenticator layers (codec, net, fsm).
    #[error(transparent)]
    Core(#[from] dot8021x_types::Error),
}

impl DaemonError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

//! Error handling for the logview crate.

use std::path::PathBuf;

/// A specialized `Result` type for logview operations.
pub type Result<T> = std::result::Result<T, ViewerError>;

/// The main error type for logview operations.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// The listening socket could not be created, bound or put into listen mode
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a single client failed; the accept loop keeps running
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The log file could not be read
    #[error("Unable to read log file {}: {source}", path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the response back to a client failed
    #[error("Failed to write response: {0}")]
    ClientWrite(#[source] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another live process holds the instance marker
    #[error("logview is already running as pid {pid} (marker {}); use --replace or `logview stop`", path.display())]
    AlreadyRunning { pid: u32, path: PathBuf },

    /// Instance marker (PID file) operation failed
    #[error("Instance error: {0}")]
    Instance(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ViewerError {
    /// Create a new bind error
    pub fn bind_error(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            address: address.into(),
            source,
        }
    }

    /// Create a new log read error
    pub fn log_read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LogRead {
            path: path.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new instance marker error
    pub fn instance_error(msg: impl Into<String>) -> Self {
        Self::Instance(msg.into())
    }
}

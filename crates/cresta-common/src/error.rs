//! Common error types for the Cresta launcher.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`CrestaError`].
pub type CrestaResult<T> = Result<T, CrestaError>;

/// Common errors across the Cresta launcher.
#[derive(Error, Diagnostic, Debug)]
pub enum CrestaError {
    /// Malformed input to a call (non-absolute path, empty value, ...).
    #[error("Invalid argument: {message}")]
    #[diagnostic(code(cresta::invalid_argument))]
    InvalidArgument {
        /// The error message.
        message: String,
    },

    /// Path resolution inside the container rootfs failed.
    #[error("Path resolution failed: {message}")]
    #[diagnostic(
        code(cresta::path_resolution),
        help("The path could not be resolved safely inside the container root filesystem")
    )]
    PathResolution {
        /// The error message.
        message: String,
    },

    /// Mount preparation or execution failed.
    #[error("Mount failed: {message}")]
    #[diagnostic(code(cresta::mount))]
    Mount {
        /// The error message, including the offending path.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(cresta::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(cresta::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(cresta::serialization))]
    Serialization(String),
}

impl CrestaError {
    /// Build a [`CrestaError::Mount`] from a message and an OS error.
    #[must_use]
    pub fn mount_with_source(message: impl Into<String>, source: &std::io::Error) -> Self {
        CrestaError::Mount {
            message: format!("{}: {source}", message.into()),
        }
    }
}

impl From<serde_json::Error> for CrestaError {
    fn from(err: serde_json::Error) -> Self {
        CrestaError::Serialization(err.to_string())
    }
}

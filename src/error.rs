//! Error handling types for utsushi.
//!
//! Mapping and delegation never fail loudly: an unmappable position or an
//! unavailable backend is an ordinary `None`. The types here cover the plumbing
//! that can genuinely fail, such as configuration parsing or a dispatch task
//! that has already shut down.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UtsushiError {
    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// The dispatch task is gone (shutdown or panic)
    #[error("Dispatch task is not running")]
    DispatchClosed,

    /// A URI could not be turned into a file path
    #[error("Invalid document URI: {uri}")]
    InvalidUri { uri: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type UtsushiResult<T> = Result<T, UtsushiError>;

impl UtsushiError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        UtsushiError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid URI error
    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        UtsushiError::InvalidUri { uri: uri.into() }
    }
}

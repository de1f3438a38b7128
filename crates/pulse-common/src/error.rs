//! Error types shared across Pulse crates

use thiserror::Error;

/// Result type alias for Pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

/// Errors that are not specific to a single crate
#[derive(Error, Debug)]
pub enum PulseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PulseError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

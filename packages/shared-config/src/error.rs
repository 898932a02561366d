//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating a device session configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required environment variable
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Value could not be parsed or is unusable
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Invalid URL format
    #[error("invalid URL format for {0}: {1}")]
    InvalidUrl(String, String),

    /// Numeric value outside the accepted range
    #[error("{name} = {value} is out of range (expected {expected})")]
    OutOfRange {
        name: String,
        value: String,
        expected: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

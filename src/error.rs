//! This module defines all error types used throughout the application.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Ledger provider errors (network, HTTP status, undecodable payloads)
    #[error("Ledger provider error: {0}")]
    Provider(String),

    /// A transaction record that cannot be interpreted at all
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// Fixture or report parsing errors
    #[error("Parser error: {0}")]
    Parser(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error in {file:?}: {message}")]
    ConfigParse { file: PathBuf, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid ledger address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// API rate limit exceeded
    #[error("API rate limit exceeded. Try again later, supply an API key or use caching.")]
    RateLimitExceeded,

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),

    /// Wrapped anyhow errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a custom error with a message
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create a ledger provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a malformed transaction error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedTransaction(msg.into())
    }

    /// Create a parser error
    pub fn parser(msg: impl Into<String>) -> Self {
        Self::Parser(msg.into())
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Provider(_) | Error::Io(_))
    }
}

// Implement From traits for common external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParse {
            file: PathBuf::from("unknown"),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parser(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Provider(format!("HTTP error: {}", err))
    }
}

// Helper macros for creating errors

/// Create a custom error with formatting
#[macro_export]
macro_rules! custom_error {
    ($($arg:tt)*) => {
        $crate::error::Error::Custom(format!($($arg)*))
    };
}

/// Bail with a custom error message
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::custom_error!($($arg)*))
    };
}

/// Ensure a condition is true or return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::custom("test error");
        assert_eq!(err.to_string(), "test error");

        let err = Error::provider("connection reset");
        assert_eq!(err.to_string(), "Ledger provider error: connection reset");

        let err = Error::malformed("tx1 has no outputs");
        assert_eq!(err.to_string(), "Malformed transaction: tx1 has no outputs");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::provider("timeout").is_transient());
        assert!(!Error::RateLimitExceeded.is_transient());
        assert!(!Error::malformed("missing inputs").is_transient());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Table>("key = ").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    fn check_positive(n: i32) -> Result<i32> {
        crate::ensure!(n > 0, "expected a positive number, got {}", n);
        Ok(n)
    }

    #[test]
    fn test_ensure_macro() {
        assert_eq!(check_positive(3).unwrap(), 3);
        let err = check_positive(-1).unwrap_err();
        assert_eq!(err.to_string(), "expected a positive number, got -1");
    }
}

//! Error types for the Sift screener workspace.

use thiserror::Error;

/// Result type alias using the Sift error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Sift crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested data is empty or missing
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Malformed numeric or magnitude string
    #[error("Parse failure: {0}")]
    Parse(String),

    /// External service error
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a data-unavailable error.
    pub const fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable(_))
    }

    /// Check if this is a parse failure.
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

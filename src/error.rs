//! Error types for the Policy Validation Agent
//!
//! Provides structured error types for rule validation, lookup, status
//! transitions, and I/O. All errors are returned synchronously to the
//! caller of the offending operation; nothing is retried internally.

use thiserror::Error;

use crate::models::ViolationStatus;

/// Main error type for policy operations
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Malformed rule or fact; rejected synchronously, never partially applied
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown rule or violation identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal status change against the one-way progression
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ViolationStatus,
        to: ViolationStatus,
    },

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Policy bundle or fact payload parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Client-side HTTP failure (fact replay)
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PolicyError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        PolicyError::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        PolicyError::NotFound(msg.into())
    }

    /// Create a file error
    pub fn file_error(msg: impl Into<String>) -> Self {
        PolicyError::FileError(msg.into())
    }

    /// Create a parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        PolicyError::ParseError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        PolicyError::InternalError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PolicyError::Validation(_)
                | PolicyError::NotFound(_)
                | PolicyError::InvalidTransition { .. }
                | PolicyError::FileError(_)
                | PolicyError::ParseError(_)
        )
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::Validation(_) => "VALIDATION_ERROR",
            PolicyError::NotFound(_) => "NOT_FOUND",
            PolicyError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PolicyError::FileError(_) => "FILE_ERROR",
            PolicyError::ParseError(_) => "PARSE_ERROR",
            PolicyError::HttpError(_) => "HTTP_ERROR",
            PolicyError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for PolicyError {
    fn from(err: std::io::Error) -> Self {
        PolicyError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(err: serde_yaml::Error) -> Self {
        PolicyError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<reqwest::Error> for PolicyError {
    fn from(err: reqwest::Error) -> Self {
        PolicyError::HttpError(err.to_string())
    }
}

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;

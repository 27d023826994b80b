//! Error types for flare

use thiserror::Error;

/// Result type alias for flare operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for query composition, hooks and engine calls
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// A builder or registry call received an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No delegate exists for the requested model
    #[error("Missing model delegate: {0}")]
    MissingDelegate(String),

    /// Operation aborted by a before hook
    #[error("Aborted: {0}")]
    Aborted(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The engine does not support the requested action
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error reported by the underlying engine
    #[error("Engine error: {0}")]
    Engine(String),
}

impl OrmError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a missing delegate error for a model
    pub fn missing_delegate(model: impl Into<String>) -> Self {
        Self::MissingDelegate(model.into())
    }

    /// Create an abort error, typically returned from a before hook
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error was raised by a before hook
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

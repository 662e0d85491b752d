//! Core error types for the Prism engine.

/// A specialized Result type for Prism operations.
pub type PrismResult<T> = Result<T, PrismError>;

/// Top-level error type encompassing all Prism subsystems.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PrismError {
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("producer error: {0}")]
    Producer(String),

    #[error("consumer error: {0}")]
    Consumer(String),

    #[error("batch error: {0}")]
    Batch(String),

    #[error("executor shut down")]
    ExecutorShutdown,
}

impl PrismError {
    /// Create an invalid-operation error (illegal layer transition etc.).
    pub fn invalid_op(message: impl Into<String>) -> Self {
        PrismError::InvalidOperation(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_arg(message: impl Into<String>) -> Self {
        PrismError::InvalidArgument(message.into())
    }

    /// Create a producer failure.
    pub fn producer(message: impl Into<String>) -> Self {
        PrismError::Producer(message.into())
    }

    /// Create a consumer failure.
    pub fn consumer(message: impl Into<String>) -> Self {
        PrismError::Consumer(message.into())
    }
}

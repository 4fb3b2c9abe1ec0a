use thiserror::Error;

/// Errors that can occur during delayed-worker operations.
///
/// This enum represents the various errors that can occur when interacting
/// with the job table or with serialized job payloads.
#[derive(Error, Debug)]
pub enum DelayedWorkerError {
    /// An error occurred while executing an SQL statement
    #[error("Error occured while query: {0}")]
    SqlError(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing a job payload
    #[error("Error while deserializing job payload: {0}")]
    DeserializationError(#[from] serde_json::Error),

    /// A retried operation gave up; the message is the original driver error
    #[error(transparent)]
    RetryError(#[from] RetryError),
}

/// Terminal error of [`crate::retry_on_deadlock`].
///
/// Carries the message of the underlying error, either because the retry
/// budget ran out on transient lock contention or because the error was not
/// retryable at all. Callers distinguish the two by message, not by type.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct RetryError {
    message: String,
}

impl RetryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message of the error that ended the retry
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A Result type alias for DelayedWorkerError.
///
/// This type alias simplifies the return types for functions that can
/// return a DelayedWorkerError.
pub type Result<T> = core::result::Result<T, DelayedWorkerError>;

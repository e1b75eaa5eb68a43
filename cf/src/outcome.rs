//! Outcome type produced by every command execution

use std::error::Error;
use std::sync::Arc;

/// Error cause attached to a failed [`Outcome`].
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Failure detail carried by an [`Outcome`].
///
/// The message is what callers render; the cause (if any) lets wrapping
/// layers distinguish failure kinds without parsing the message.
#[derive(Debug, Clone)]
pub struct Failure {
    message: String,
    cause: Option<Cause>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: Cause) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Replace the cause, keeping or rewriting the message.
    pub fn recast(self, message: impl Into<String>, cause: Cause) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
        }
    }
}

/// Result of one command execution.
///
/// Referentially tied to the command that produced it via the command's
/// description. Combinators pass outcomes through unchanged; the original
/// message and cause always survive to the final consumer.
#[derive(Debug, Clone)]
pub struct Outcome {
    command: String,
    failure: Option<Failure>,
}

impl Outcome {
    /// Successful outcome for the command with the given description.
    pub fn success(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            failure: None,
        }
    }

    /// Failed outcome with a message and no typed cause.
    pub fn failure(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            failure: Some(Failure::new(message)),
        }
    }

    /// Failed outcome carrying a typed cause.
    pub fn failure_with_cause(
        command: impl Into<String>,
        message: impl Into<String>,
        cause: Cause,
    ) -> Self {
        Self {
            command: command.into(),
            failure: Some(Failure::with_cause(message, cause)),
        }
    }

    pub fn from_failure(command: impl Into<String>, failure: Failure) -> Self {
        Self {
            command: command.into(),
            failure: Some(failure),
        }
    }

    /// Description of the command that produced this outcome.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(Failure::message)
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.failure.as_ref().and_then(Failure::cause)
    }

    /// Downcast the cause to a concrete error type.
    pub fn cause_as<E: Error + 'static>(&self) -> Option<&E> {
        self.cause().and_then(|c| c.downcast_ref::<E>())
    }
}

/// Generic "process exited with an unexpected status" cause attached by
/// [`crate::ProcessCommand`] before any domain-specific recast runs.
#[derive(Debug, thiserror::Error)]
#[error("process exited with status {status}")]
pub struct ExitError {
    pub status: i32,
    pub stderr: String,
}

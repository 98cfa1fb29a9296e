//! Error types used by the bus, listeners and processors.
//!
//! This module defines three enums:
//!
//! - [`ListenerError`]: raised by a listener callback (returned or captured from a panic).
//! - [`HandlerError`]: raised by an event handler while processing one event.
//! - [`SubmitError`]: raised when an event cannot be handed to a processor.
//!
//! All of them provide `as_label` (stable snake_case label for logs) and
//! `as_message` (human-readable details).

use std::time::Duration;
use thiserror::Error;

/// # Errors raised by listener callbacks.
///
/// A listener error never reaches the emitter: the registry routes it to the
/// failing listener's own [`Subscribe::on_error`](crate::Subscribe::on_error)
/// and carries on with the remaining listeners.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The callback returned an error.
    #[error("listener failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The callback panicked; the panic was caught at the listener boundary.
    #[error("listener panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl ListenerError {
    /// Shorthand for [`ListenerError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        ListenerError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use eventvisor::ListenerError;
    ///
    /// let err = ListenerError::failed("boom");
    /// assert_eq!(err.as_label(), "listener_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Failed { .. } => "listener_failed",
            ListenerError::Panicked { .. } => "listener_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ListenerError::Failed { error } => format!("error: {error}"),
            ListenerError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced while handling an event.
///
/// The value is `Clone` because the lifecycle interceptor publishes it inside an
/// [`Status::Error`](crate::Status::Error) envelope *and* hands it back to the
/// processor unchanged.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler failed while processing the event.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler exceeded the processor's per-event timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Handler panicked; the panic was caught at the stream boundary.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Processing was abandoned before it reached a terminal state
    /// (restart strategy, busy droppable processor, teardown, or the stream was dropped).
    #[error("processing cancelled")]
    Canceled,
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use eventvisor::HandlerError;
    /// use std::time::Duration;
    ///
    /// let err = HandlerError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "handler_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Timeout { .. } => "handler_timeout",
            HandlerError::Panicked { .. } => "handler_panicked",
            HandlerError::Canceled => "handler_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HandlerError::Fail { error } => format!("error: {error}"),
            HandlerError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            HandlerError::Panicked { info } => format!("panic: {info}"),
            HandlerError::Canceled => "processing cancelled".to_string(),
        }
    }

    /// Indicates whether the handler was cut short rather than failing on its own.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HandlerError::Canceled)
    }
}

/// Error returned when an event cannot be submitted to a processor.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Submission queue is full (try again later or use the async `submit`).
    #[error("submission queue full")]
    Full,

    /// Processor (or coordinator) was closed.
    #[error("processor closed")]
    Closed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Full => "submit_full",
            SubmitError::Closed => "submit_closed",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

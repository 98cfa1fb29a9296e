//! # Lifecycle envelopes.
//!
//! An [`Envelope`] wraps an event payload with the [`Status`] of its processing
//! and, for [`Status::Error`], the failure value.
//!
//! ## Lifecycle
//! ```text
//! Idle ──► Started ──┬──► Success ──┬──► Completed (terminal)
//!                    └──► Error   ──┘
//! ```
//!
//! ## Equality
//! Two envelopes are equal when payload and status are equal. The error and the
//! metadata (`seq`, `at`) are carried but never compared: dedup keys on the
//! lifecycle transition, not on error identity.
//!
//! ## Example
//! ```rust
//! use eventvisor::{Envelope, Status};
//!
//! let a = Envelope::new("save", Status::Success);
//! let b = Envelope::success("save");
//! assert_eq!(a, b);
//! assert_ne!(a, Envelope::completed("save"));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for envelope ordering.
static ENVELOPE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shared, type-erased failure carried by [`Status::Error`] envelopes.
pub type ErrorRef = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Phase of processing of a single event instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Processing began. Transient: never replayed to late listeners.
    Started,
    /// Processing finished normally.
    Success,
    /// Processing failed; the envelope carries the error.
    Error,
    /// Processing is over, whatever the outcome. Always the last envelope.
    Completed,
}

impl Status {
    /// `true` for `Success` and `Error`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Error)
    }

    /// `true` for everything except `Started`.
    #[inline]
    pub fn is_replayable(self) -> bool {
        !matches!(self, Status::Started)
    }

    /// Returns a short stable label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Status::Started => "started",
            Status::Success => "success",
            Status::Error => "error",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Immutable payload + lifecycle status pair.
#[derive(Clone)]
pub struct Envelope<T> {
    payload: T,
    status: Status,
    error: Option<ErrorRef>,
    seq: u64,
    at: SystemTime,
}

impl<T> Envelope<T> {
    /// Creates an envelope with the next sequence number and current timestamp.
    pub fn new(payload: T, status: Status) -> Self {
        Self {
            payload,
            status,
            error: None,
            seq: ENVELOPE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
        }
    }

    /// Creates a `Started` envelope.
    #[inline]
    pub fn started(payload: T) -> Self {
        Self::new(payload, Status::Started)
    }

    /// Creates a `Success` envelope.
    #[inline]
    pub fn success(payload: T) -> Self {
        Self::new(payload, Status::Success)
    }

    /// Creates an `Error` envelope carrying `error`.
    #[inline]
    pub fn error(payload: T, error: ErrorRef) -> Self {
        Self::new(payload, Status::Error).with_error(error)
    }

    /// Creates a `Completed` envelope.
    #[inline]
    pub fn completed(payload: T) -> Self {
        Self::new(payload, Status::Completed)
    }

    /// Attaches an error.
    #[inline]
    pub fn with_error(mut self, error: ErrorRef) -> Self {
        self.error = Some(error);
        self
    }

    /// The wrapped event payload.
    #[inline]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Lifecycle status.
    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    /// Failure carried by the envelope, if any.
    #[inline]
    pub fn error_ref(&self) -> Option<&ErrorRef> {
        self.error.as_ref()
    }

    /// Monotonic global sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wall-clock creation time.
    #[inline]
    pub fn at(&self) -> SystemTime {
        self.at
    }

    /// Unwraps the payload.
    #[inline]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: PartialEq> PartialEq for Envelope<T> {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status && self.payload == other.payload
    }
}

impl<T: Eq> Eq for Envelope<T> {}

impl<T: Hash> Hash for Envelope<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
        self.status.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Envelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("payload", &self.payload)
            .field("status", &self.status)
            .field("error", &self.error.as_ref().map(|e| e.to_string()))
            .field("seq", &self.seq)
            .finish()
    }
}

//! # Core listener trait
//!
//! `Subscribe` is the extension point for reacting to lifecycle envelopes.
//! A listener is registered for one key on a [`LifecycleBus`](crate::LifecycleBus)
//! and is called synchronously, in subscription order, for every envelope
//! emitted under that key.
//!
//! ## Contract
//! - Callbacks run on the emitting thread (or on the replay task). Keep them
//!   short; hand heavy work to a channel or a spawned task.
//! - A callback may call back into the bus (`emit`, `listen`, `remove_listeners`).
//! - Returning `Err` or panicking never reaches the emitter: the error is routed
//!   to [`Subscribe::on_error`] of the same listener and delivery continues with
//!   the next listener.
//!
//! ## Example
//! ```rust
//! use eventvisor::{Envelope, ListenerError, Status, Subscribe};
//!
//! struct Audit;
//!
//! impl Subscribe<String> for Audit {
//!     fn on_envelope(&self, env: &Envelope<String>) -> Result<(), ListenerError> {
//!         if env.status() == Status::Error {
//!             return Err(ListenerError::failed("audit sink rejected error record"));
//!         }
//!         Ok(())
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//! }
//! ```

use crate::error::ListenerError;
use crate::events::Envelope;

/// Contract for envelope listeners.
pub trait Subscribe<T>: Send + Sync + 'static {
    /// Handle a single envelope.
    fn on_envelope(&self, envelope: &Envelope<T>) -> Result<(), ListenerError>;

    /// Called with the error when [`on_envelope`](Subscribe::on_envelope) fails or panics.
    ///
    /// The default swallows the error.
    fn on_error(&self, error: &ListenerError) {
        let _ = error;
    }

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

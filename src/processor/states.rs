//! # Processor state channel.
//!
//! [`StateChannel`] holds the current processor state and broadcasts every new
//! state through [`tokio::sync::broadcast`].
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Receivers (many):
//!   handler stream 1 ──┐
//!   handler stream 2 ──┼──► StateChannel ──┬──► states() receiver 1
//!   handler stream N ──┘   (current +      └──► states() receiver N
//!                           broadcast)
//! ```
//!
//! ## Rules
//! - **Current value**: `get()` always returns the latest state, even with no receivers.
//! - **Non-blocking publish**: `set()` never waits on receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest states.

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Current state plus a broadcast of state changes.
pub(crate) struct StateChannel<S> {
    current: RwLock<S>,
    tx: broadcast::Sender<S>,
}

impl<S: Clone + Send + Sync + 'static> StateChannel<S> {
    /// Creates a channel holding `initial`. Capacity is clamped to at least 1.
    pub(crate) fn new(initial: S, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            current: RwLock::new(initial),
            tx,
        }
    }

    /// Replaces the current state and broadcasts it.
    pub(crate) fn set(&self, state: S) {
        *self.current.write() = state.clone();
        let _ = self.tx.send(state);
    }

    /// Returns a snapshot of the current state.
    pub(crate) fn get(&self) -> S {
        self.current.read().clone()
    }

    /// Creates a receiver observing states set after this call.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<S> {
        self.tx.subscribe()
    }
}

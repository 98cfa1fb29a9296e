//! # Processing strategy
//!
//! A processor runs one handler stream per submitted event. The strategy decides
//! how a new submission is scheduled relative to the streams already running.
//!
//! ## Variants
//! - `Sequential`: events are handled **one at a time**, in submission order.
//! - `Concurrent`: every event runs in its own task as soon as it arrives.
//! - `Restartable`: a new event **cancels** whatever is running and starts.
//! - `Droppable`: a new event is **ignored** while another one is running.
//!
//! ## Invariants
//! - A cancelled event still reports `Error(Canceled)` followed by `Completed`.
//! - A dropped event never runs its handler, but is still bracketed as
//!   `Started`, `Error(Canceled)`, `Completed` so that anyone waiting on it is released.

/// Policy controlling how incoming events are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Handle events one after another (FIFO).
    ///
    /// Use when:
    /// - Each event depends on the state left by the previous one
    /// - Example: applying edits to a document
    Sequential,

    /// Handle every event in its own task.
    ///
    /// Use when:
    /// - Events are independent
    /// - Example: loading several unrelated items
    #[default]
    Concurrent,

    /// Cancel the running event and start the new one.
    ///
    /// Use when:
    /// - Only the latest request matters
    /// - Example: search-as-you-type
    Restartable,

    /// Ignore new events while one is running.
    ///
    /// An ignored event reports `Error(Canceled)` without running its handler.
    ///
    /// Use when:
    /// - Redundant triggers should be swallowed
    /// - Example: a "refresh" button hammered by the user
    Droppable,
}

impl Strategy {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Concurrent => "concurrent",
            Strategy::Restartable => "restartable",
            Strategy::Droppable => "droppable",
        }
    }
}

//! # LogWriter: envelope logger
//!
//! A minimal listener that writes incoming envelopes through `tracing`.
//! Use it for debugging or demos.
//!
//! ## Example output
//! ```text
//! INFO eventvisor: [started] payload=Save { id: 3 } seq=12
//! INFO eventvisor: [success] payload=Save { id: 3 } seq=13
//! WARN eventvisor: [error] payload=Load err="handler failed: missing" seq=20
//! INFO eventvisor: [completed] payload=Save { id: 3 } seq=14
//! ```

use std::fmt::Debug;

use crate::error::ListenerError;
use crate::events::{Envelope, Status};
use crate::listeners::Subscribe;

/// Envelope writer listener.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<T: Debug + 'static> Subscribe<T> for LogWriter {
    fn on_envelope(&self, e: &Envelope<T>) -> Result<(), ListenerError> {
        match e.status() {
            Status::Error => {
                let err = e.error_ref().map(|err| err.to_string());
                tracing::warn!(
                    target: "eventvisor",
                    "[error] payload={:?} err={:?} seq={}",
                    e.payload(),
                    err.as_deref().unwrap_or("<none>"),
                    e.seq()
                );
            }
            status => {
                tracing::info!(
                    target: "eventvisor",
                    "[{}] payload={:?} seq={}",
                    status,
                    e.payload(),
                    e.seq()
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

//! # Closure-backed listener (`ListenerFn`)
//!
//! [`ListenerFn`] adapts a closure `Fn(&Envelope<T>) -> Result<(), ListenerError>`
//! (plus an optional error closure) to the [`Subscribe`] trait. It is what
//! [`LifecycleBus::listen`](crate::LifecycleBus::listen) builds internally.
//!
//! ## Example
//! ```rust
//! use eventvisor::{Envelope, ListenerFn, Subscribe};
//!
//! let l = ListenerFn::new("printer", |env: &Envelope<u32>| {
//!     println!("{} -> {}", env.payload(), env.status());
//!     Ok(())
//! })
//! .with_error_handler(|err| eprintln!("printer: {err}"));
//!
//! assert_eq!(Subscribe::<u32>::name(&l), "printer");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ListenerError;
use crate::events::Envelope;
use crate::listeners::Subscribe;

type ErrorFn = Box<dyn Fn(&ListenerError) + Send + Sync>;

/// Function-backed listener.
pub struct ListenerFn<F> {
    name: &'static str,
    f: F,
    on_error: Option<ErrorFn>,
}

impl<F> ListenerFn<F> {
    /// Creates a new closure-backed listener.
    pub fn new<T>(name: &'static str, f: F) -> Self
    where
        F: Fn(&Envelope<T>) -> Result<(), ListenerError>,
    {
        Self {
            name,
            f,
            on_error: None,
        }
    }

    /// Creates the listener and returns it in an `Arc`.
    pub fn arc<T>(name: &'static str, f: F) -> Arc<Self>
    where
        F: Fn(&Envelope<T>) -> Result<(), ListenerError>,
    {
        Arc::new(Self::new(name, f))
    }

    /// Attaches an error callback (see [`Subscribe::on_error`]).
    pub fn with_error_handler(
        mut self,
        on_error: impl Fn(&ListenerError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl<F> fmt::Debug for ListenerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerFn")
            .field("name", &self.name)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<T, F> Subscribe<T> for ListenerFn<F>
where
    T: 'static,
    F: Fn(&Envelope<T>) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn on_envelope(&self, envelope: &Envelope<T>) -> Result<(), ListenerError> {
        (self.f)(envelope)
    }

    fn on_error(&self, error: &ListenerError) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

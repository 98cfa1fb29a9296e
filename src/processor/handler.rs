//! # Event handlers.
//!
//! A [`Handler`] turns one event (plus the processor state at the moment the
//! event is admitted) into a stream of new states. The stream ends normally on
//! success or yields an `Err` on failure. [`HandlerFn`] adapts a closure.
//!
//! A handler never sees the lifecycle bus: the processor wraps every returned
//! stream with the [`LifecycleInterceptor`](crate::LifecycleInterceptor).
//!
//! ## Example
//! ```rust
//! use eventvisor::{HandlerFn, HandlerRef, HandlerError};
//! use futures::stream;
//!
//! let counter: HandlerRef<u32, u32> = HandlerFn::arc("counter", |by: u32, total: u32| {
//!     stream::iter([Ok::<_, HandlerError>(total + by)])
//! });
//! assert_eq!(counter.name(), "counter");
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use futures::Stream;
use futures::stream::BoxStream;

use crate::error::HandlerError;

/// Stream of states produced while handling one event.
pub type StateStream<S> = BoxStream<'static, Result<S, HandlerError>>;

/// Shared handle to a handler.
pub type HandlerRef<E, S> = Arc<dyn Handler<E, S>>;

/// Processes one event into zero or more states.
pub trait Handler<E, S>: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Starts handling `event` against the current `state`.
    ///
    /// The returned stream may be dropped at any point (restart, timeout,
    /// teardown); it must not rely on running to completion.
    fn handle(&self, event: E, state: S) -> StateStream<S>;
}

/// Function-backed handler.
///
/// Wraps a closure that *creates* a new stream per event.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it in an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<E, S, F, St> Handler<E, S> for HandlerFn<F>
where
    F: Fn(E, S) -> St + Send + Sync + 'static,
    St: Stream<Item = Result<S, HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: E, state: S) -> StateStream<S> {
        Box::pin((self.f)(event, state))
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};

    use super::*;

    #[tokio::test]
    async fn handler_fn_yields_closure_stream() {
        let h: HandlerRef<u8, Vec<u8>> = HandlerFn::arc("push", |item: u8, mut list: Vec<u8>| {
            list.push(item);
            stream::iter(vec![Ok::<_, HandlerError>(list)])
        });

        let states: Vec<_> = h.handle(3, vec![1, 2]).collect().await;
        assert_eq!(states, vec![Ok(vec![1, 2, 3])]);
        assert_eq!(h.name(), "push");
    }
}

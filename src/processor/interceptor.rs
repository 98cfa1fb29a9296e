//! # Lifecycle interceptor.
//!
//! Brackets a handler stream with lifecycle envelopes on a [`LifecycleBus`].
//!
//! ## Envelope flow
//! ```text
//! wrap(key, payload, invoke)  ──► Started
//!   first poll ──► invoke() ──► inner stream
//!       Ok(state)  ──► yielded unchanged
//!       Err(e)     ──► Error(e) ──► yield Err(e) ──► end
//!       panic      ──► Error(Panicked) ──► yield Err(Panicked) ──► end
//!       end        ──► Success
//!   stream dropped (end, failure or mid-flight)
//!       no terminal yet ──► Error(Canceled)
//!       always          ──► Completed
//! ```
//!
//! ## Rules
//! - Exactly one terminal (`Success` or `Error`) and exactly one `Completed` per wrap.
//! - Failures are published **and** handed back to the caller; nothing is swallowed.
//! - A panic in `invoke` or in the handler stream is caught and reported as
//!   `HandlerError::Panicked`.
//! - The interceptor never decides scheduling: whoever polls or drops the stream does.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::{FutureExt, StreamExt};

use crate::bus::LifecycleBus;
use crate::error::{HandlerError, panic_message};
use crate::events::{Envelope, EventKey, EventPayload};
use crate::processor::handler::StateStream;

/// Wraps handler streams so that they report their lifecycle on a bus.
pub struct LifecycleInterceptor<K, T> {
    bus: LifecycleBus<K, T>,
}

impl<K, T> Clone for LifecycleInterceptor<K, T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
        }
    }
}

impl<K: EventKey, T: EventPayload> LifecycleInterceptor<K, T> {
    /// Creates an interceptor publishing on `bus`.
    pub fn new(bus: LifecycleBus<K, T>) -> Self {
        Self { bus }
    }

    /// Bus the envelopes are published on.
    pub fn bus(&self) -> &LifecycleBus<K, T> {
        &self.bus
    }

    /// Emits `Started` for `key` and returns the bracketed stream.
    ///
    /// `invoke` runs on the first poll and produces the handler stream.
    pub fn wrap<S, F>(&self, key: K, payload: T, invoke: F) -> StateStream<S>
    where
        S: Send + 'static,
        F: FnOnce() -> StateStream<S> + Send + 'static,
    {
        let guard = LifecycleGuard::start(self.bus.clone(), key, payload);

        Box::pin(async_stream::stream! {
            let mut guard = guard;
            let inner = match catch_unwind(AssertUnwindSafe(invoke)) {
                Ok(inner) => Some(inner),
                Err(panic) => {
                    let err = panicked(panic.as_ref());
                    guard.fail(&err);
                    yield Err(err);
                    None
                }
            };
            if let Some(mut inner) = inner {
                loop {
                    let step = AssertUnwindSafe(inner.next()).catch_unwind().await;
                    match step {
                        Ok(Some(Ok(state))) => yield Ok(state),
                        Ok(Some(Err(err))) => {
                            guard.fail(&err);
                            yield Err(err);
                            break;
                        }
                        Ok(None) => {
                            guard.succeed();
                            break;
                        }
                        Err(panic) => {
                            let err = panicked(panic.as_ref());
                            guard.fail(&err);
                            yield Err(err);
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> HandlerError {
    HandlerError::Panicked {
        info: panic_message(payload),
    }
}

/// Publishes the terminal and `Completed` envelopes of one wrapped stream.
struct LifecycleGuard<K: EventKey, T: EventPayload> {
    bus: LifecycleBus<K, T>,
    key: K,
    payload: T,
    terminal: bool,
}

impl<K: EventKey, T: EventPayload> LifecycleGuard<K, T> {
    fn start(bus: LifecycleBus<K, T>, key: K, payload: T) -> Self {
        bus.emit_envelope(key.clone(), Envelope::started(payload.clone()));
        Self {
            bus,
            key,
            payload,
            terminal: false,
        }
    }

    fn succeed(&mut self) {
        self.terminal = true;
        self.publish(Envelope::success(self.payload.clone()));
    }

    fn fail(&mut self, err: &HandlerError) {
        self.terminal = true;
        self.publish(Envelope::error(self.payload.clone(), Arc::new(err.clone())));
    }

    fn publish(&self, env: Envelope<T>) {
        self.bus.emit_envelope(self.key.clone(), env);
    }
}

impl<K: EventKey, T: EventPayload> Drop for LifecycleGuard<K, T> {
    fn drop(&mut self) {
        if !self.terminal {
            tracing::debug!("event cancelled before reaching a terminal state");
            self.fail(&HandlerError::Canceled);
        }
        self.publish(Envelope::completed(self.payload.clone()));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::BusConfig;
    use crate::events::Status;

    type Seen = Arc<Mutex<Vec<(Status, Option<String>)>>>;

    fn recording_bus() -> (LifecycleBus<u32, &'static str>, Seen) {
        let bus = LifecycleBus::new(BusConfig {
            dedup_window: Duration::ZERO,
            ..BusConfig::default()
        });
        let seen: Seen = Arc::default();
        let seen_in = seen.clone();
        bus.listen(1, move |env| {
            let err = env.error_ref().map(|e| e.to_string());
            seen_in.lock().push((env.status(), err));
            Ok(())
        });
        (bus, seen)
    }

    fn statuses(seen: &Seen) -> Vec<Status> {
        seen.lock().iter().map(|(s, _)| *s).collect()
    }

    #[tokio::test]
    async fn success_is_bracketed() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);

        let out: Vec<_> = interceptor
            .wrap(1, "load", || {
                stream::iter(vec![Ok::<u8, HandlerError>(1), Ok(2)]).boxed()
            })
            .collect()
            .await;

        assert_eq!(out, vec![Ok(1), Ok(2)]);
        assert_eq!(
            statuses(&seen),
            vec![Status::Started, Status::Success, Status::Completed]
        );
    }

    #[tokio::test]
    async fn failure_is_published_and_returned() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);

        let out: Vec<_> = interceptor
            .wrap(1, "load", || {
                stream::iter(vec![Ok::<u8, HandlerError>(1), Err(HandlerError::fail("disk")), Ok(3)])
                    .boxed()
            })
            .collect()
            .await;

        assert_eq!(out, vec![Ok(1), Err(HandlerError::fail("disk"))]);
        assert_eq!(
            *seen.lock(),
            vec![
                (Status::Started, None),
                (Status::Error, Some("handler failed: disk".to_string())),
                (Status::Completed, None),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_mid_flight_reports_cancellation() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);

        let mut wrapped = interceptor.wrap(1, "load", || {
            stream::iter(vec![Ok::<u8, HandlerError>(1)])
                .chain(stream::pending())
                .boxed()
        });
        assert_eq!(wrapped.next().await, Some(Ok(1)));
        drop(wrapped);

        assert_eq!(
            *seen.lock(),
            vec![
                (Status::Started, None),
                (Status::Error, Some("processing cancelled".to_string())),
                (Status::Completed, None),
            ]
        );
    }

    #[test]
    fn never_polled_stream_is_still_bracketed() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);
        let invoked = Arc::new(Mutex::new(false));
        let invoked_in = invoked.clone();

        let wrapped = interceptor.wrap(1, "load", move || {
            *invoked_in.lock() = true;
            stream::empty::<Result<u8, HandlerError>>().boxed()
        });
        drop(wrapped);

        assert!(!*invoked.lock());
        assert_eq!(
            statuses(&seen),
            vec![Status::Started, Status::Error, Status::Completed]
        );
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_as_failure() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);

        let out: Vec<_> = interceptor
            .wrap(1, "load", || {
                stream::poll_fn(|_cx| -> std::task::Poll<Option<Result<u8, HandlerError>>> {
                    panic!("corrupt index")
                })
                .boxed()
            })
            .collect()
            .await;

        let failure = HandlerError::Panicked {
            info: "corrupt index".to_string(),
        };
        assert_eq!(out, vec![Err(failure)]);
        assert_eq!(
            *seen.lock(),
            vec![
                (Status::Started, None),
                (Status::Error, Some("handler panicked: corrupt index".to_string())),
                (Status::Completed, None),
            ]
        );
    }

    #[tokio::test]
    async fn panicking_invoke_is_reported_as_failure() {
        let (bus, seen) = recording_bus();
        let interceptor = LifecycleInterceptor::new(bus);

        let out: Vec<Result<u8, HandlerError>> = interceptor
            .wrap(1, "load", || -> StateStream<u8> { panic!("no handler") })
            .collect()
            .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().map_err(|e| e.as_label()), Err("handler_panicked"));
        assert_eq!(
            statuses(&seen),
            vec![Status::Started, Status::Error, Status::Completed]
        );
    }
}

//! # Routing identities.
//!
//! The bus routes envelopes by key. Any `Eq + Hash + Clone` type works, but
//! processors never key on the event value itself: two distinct submissions
//! that compare equal would collide in the registry. Instead each submission
//! gets a [`CorrelationId`] minted from a global counter, and travels as a
//! [`Tracked`] event.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Global correlation counter (0 is never handed out).
static CORRELATION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Bound for types usable as bus routing keys.
pub trait EventKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<K> EventKey for K where K: Eq + Hash + Clone + Send + Sync + 'static {}

/// Bound for envelope payloads (cached, compared by the dedup window, shared across tasks).
pub trait EventPayload: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> EventPayload for T where T: Eq + Hash + Clone + Send + Sync + 'static {}

/// Unique identity of one submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Mints the next id. Ids are unique within the process.
    pub fn next() -> Self {
        Self(CORRELATION_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// An event paired with the id it is routed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<E> {
    id: CorrelationId,
    event: E,
}

impl<E> Tracked<E> {
    /// Wraps `event` under a freshly minted id.
    pub fn new(event: E) -> Self {
        Self {
            id: CorrelationId::next(),
            event,
        }
    }

    /// Wraps `event` under an existing id.
    ///
    /// Reusing an id makes submissions share registry and cache slots; the
    /// [`Coordinator`](crate::Coordinator) cleans up stale slots in that case.
    pub fn with_id(id: CorrelationId, event: E) -> Self {
        Self { id, event }
    }

    /// Routing id.
    #[inline]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    /// The wrapped event.
    #[inline]
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Splits into id and event.
    #[inline]
    pub fn into_parts(self) -> (CorrelationId, E) {
        (self.id, self.event)
    }
}

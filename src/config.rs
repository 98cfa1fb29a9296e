//! # Bus and processor configuration.
//!
//! Provides [`BusConfig`] (dedup window, equality and cache policies) and
//! [`ProcessorConfig`] (queue sizes, strategy, per-event timeout).
//!
//! ## Sentinel values
//! - `dedup_window = 0s` → suppression disabled
//! - `cache_capacity = 0` → unbounded last-value cache
//! - `timeout = 0s` → no per-event timeout
//! - capacities are clamped to a minimum of 1

use std::time::Duration;

use crate::processor::Strategy;

/// Which parts of an envelope identify a duplicate emission.
///
/// Envelope equality itself is always `(payload, status)`; this only tunes
/// the dedup window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EqualityPolicy {
    /// Duplicates share key, payload and status. The error is ignored.
    #[default]
    PayloadStatus,
    /// Duplicates must also carry the same error text.
    PayloadStatusError,
}

/// What `remove_listeners` does with the key's cached envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Keep the last known envelope so later listeners still get a replay.
    #[default]
    Retain,
    /// Drop the cached envelope together with the listeners.
    Clear,
}

/// Configuration of a [`LifecycleBus`](crate::LifecycleBus).
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// How long an emitted envelope suppresses identical re-emissions.
    ///
    /// `Duration::ZERO` disables suppression.
    pub dedup_window: Duration,

    /// Identity used by the dedup window.
    pub equality: EqualityPolicy,

    /// Cache behaviour on `remove_listeners`.
    pub cache_on_remove: CachePolicy,

    /// Maximum number of keys kept in the last-value cache.
    ///
    /// When full, the key with the oldest envelope is evicted. `0` = unbounded.
    /// Processors mint a fresh key per event, so an unbounded cache grows with
    /// every submission.
    pub cache_capacity: usize,
}

impl BusConfig {
    /// Returns the dedup window as an `Option` (`None` = disabled).
    #[inline]
    pub fn dedup_window(&self) -> Option<Duration> {
        if self.dedup_window == Duration::ZERO {
            None
        } else {
            Some(self.dedup_window)
        }
    }

    /// Returns the cache capacity as an `Option` (`None` = unbounded).
    #[inline]
    pub fn cache_limit(&self) -> Option<usize> {
        if self.cache_capacity == 0 {
            None
        } else {
            Some(self.cache_capacity)
        }
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `dedup_window = 100ms`
    /// - `equality = PayloadStatus`
    /// - `cache_on_remove = Retain`
    /// - `cache_capacity = 1024`
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(100),
            equality: EqualityPolicy::default(),
            cache_on_remove: CachePolicy::default(),
            cache_capacity: 1024,
        }
    }
}

/// Configuration of a [`Processor`](crate::Processor).
///
/// ## Field semantics
/// - `queue_capacity`: pending submissions before `try_submit` reports `Full`
/// - `state_capacity`: state broadcast ring buffer (slow receivers lag)
/// - `strategy`: how concurrent submissions are scheduled
/// - `timeout`: per-event handler timeout (`0s` = none)
/// - `bus`: configuration of the owned lifecycle bus
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Capacity of the submission queue.
    pub queue_capacity: usize,

    /// Capacity of the state broadcast channel.
    pub state_capacity: usize,

    /// Processing strategy for incoming events.
    pub strategy: Strategy,

    /// Per-event handler timeout.
    pub timeout: Duration,

    /// Owned bus configuration.
    pub bus: BusConfig,
}

impl ProcessorConfig {
    /// Returns the per-event timeout as an `Option`.
    #[inline]
    pub fn event_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// State channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn state_capacity_clamped(&self) -> usize {
        self.state_capacity.max(1)
    }
}

impl Default for ProcessorConfig {
    /// Default configuration:
    ///
    /// - `queue_capacity = 1024`
    /// - `state_capacity = 64`
    /// - `strategy = Concurrent`
    /// - `timeout = 0s` (no timeout)
    /// - `bus = BusConfig::default()`
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            state_capacity: 64,
            strategy: Strategy::default(),
            timeout: Duration::ZERO,
            bus: BusConfig::default(),
        }
    }
}

//! # Processing units.
//!
//! - [`Processor`] owns a submission queue, a state channel, a [`LifecycleBus`](crate::LifecycleBus)
//!   and a [`Coordinator`](crate::Coordinator)
//! - [`Handler`] / [`HandlerFn`] turn one event into a stream of states
//! - [`LifecycleInterceptor`] brackets each handler stream with lifecycle envelopes
//! - [`Strategy`] decides how concurrent submissions are scheduled

mod handler;
mod interceptor;
mod states;
mod strategy;
mod unit;

pub use handler::{Handler, HandlerFn, HandlerRef, StateStream};
pub use interceptor::LifecycleInterceptor;
pub use strategy::Strategy;
pub use unit::{Processor, ProcessorBuilder, ProcessorHandle};

#![doc = include_str!("../README.md")]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links
)]
#![forbid(non_ascii_idents, unsafe_code)]
#![warn(
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

mod availability;
mod builder;
mod config;
mod errors;
mod metrics;
mod object;
mod pool;
mod waiters;

use std::fmt;

pub use self::{
    builder::PoolBuilder,
    config::PoolConfig,
    errors::PoolError,
    metrics::Metrics,
    object::Object,
    pool::{DeferredGet, Pool},
};

/// Manager responsible for creating pooled values and hooking into their
/// lifecycle.
///
/// Only [`create`] is required. Every other method has a no-op default, so
/// a minimal manager is just a factory; richer managers validate values on
/// lend, track timeouts or probe the backend for recovery.
///
/// [`create`]: Manager::create
pub trait Manager: Send + Sync + 'static {
    /// Type of objects that this [`Manager`] creates.
    type Type: Send + 'static;

    /// Error that this [`Manager`] can return when creating, checking or
    /// returning objects.
    type Error: fmt::Display + Send;

    /// Creates a new instance of [`Manager::Type`].
    ///
    /// Called when the pool grows and when a slot is released with
    /// `recreate`.
    fn create(&self) -> Result<Self::Type, Self::Error>;

    /// Disposes a value that is about to be replaced by a release with
    /// `recreate`.
    fn destroy(&self, _obj: Self::Type) {}

    /// Pre-use hook, runs on every successful blocking acquire before the
    /// object reaches the caller.
    ///
    /// # Errors
    ///
    /// A failure sends the slot back into the pool and surfaces to the
    /// caller as [`PoolError::Backend`].
    fn on_get(&self, _obj: &mut Self::Type, _metrics: &Metrics) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Pre-use hook for deferred acquires. Defaults to [`Manager::on_get`].
    ///
    /// # Errors
    ///
    /// See [`Manager::on_get`].
    fn on_get_deferred(
        &self,
        obj: &mut Self::Type,
        metrics: &Metrics,
    ) -> Result<(), Self::Error> {
        self.on_get(obj, metrics)
    }

    /// Post-use hook. Runs only when a returned slot goes back onto the
    /// free list rather than straight to a waiter.
    ///
    /// # Errors
    ///
    /// The slot is back in the pool before a failure propagates; on the
    /// plain drop path failures are only logged.
    fn on_return(&self, _obj: &mut Self::Type) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Notification that a blocking acquire gave up waiting.
    fn on_timeout(&self) {}

    /// Notification that the pool entered the unavailable state.
    fn on_unavailable(&self) {}

    /// Notification that the pool left the unavailable state.
    fn on_available(&self) {}

    /// Probe predicate: decides whether the resource provider is reachable
    /// again. `Ok(false)` and `Err` both mean still down.
    ///
    /// # Errors
    ///
    /// Errors are logged by the recovery probe and otherwise swallowed;
    /// they only delay recovery.
    fn check_available(&self, _obj: &mut Self::Type) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// The current pool status.
#[derive(Clone, Copy, Debug)]
pub struct Status {
    /// The maximum size of the pool.
    pub max_size: usize,

    /// Slots created so far.
    pub size: usize,

    /// Slots currently idle on the free list.
    pub available: usize,

    /// Callers parked in the blocking wait queue.
    pub blocking_waiters: usize,

    /// Callers enrolled in the deferred wait queue.
    pub deferred_waiters: usize,
}

//! # Backend Module
//!
//! The transport and synchronization capabilities the bus depends on but
//! does not implement. A backend owns the queue between producers and the
//! dispatcher context, and decides how (or whether) anything blocks.
//!
//! ## Overview
//!
//! - [`Backend::enqueue`] is the only required capability
//! - [`Backend::enqueue_from_isr`] is needed only for interrupt-context publish
//! - [`Backend::try_dequeue`] powers [`EventBus::dispatch_one`](crate::EventBus::dispatch_one)
//! - [`Backend::lock_hooks`] wraps every registry mutation and dispatch snapshot
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use evtbus_core::{EventBus, MemoryBackend};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let bus = EventBus::new(backend.clone());
//! bus.init()?;
//!
//! bus.subscribe(1, |envelope| println!("got {:?}", envelope.payload()))?;
//! bus.publish(1, &[1, 2, 3])?;
//! bus.dispatch_all();
//! ```

mod memory;

pub use memory::*;

use crate::bus::Dispatcher;
use crate::envelope::Envelope;
use crate::error::{BackendError, EnqueueError};

/// Lock hooks provided by a backend.
///
/// Both halves live on one trait object, so a backend either has a lock or it
/// does not. Single-threaded backends return `None` from
/// [`Backend::lock_hooks`].
pub trait BusLock: Send + Sync {
    /// Enter the critical section
    fn lock(&self);

    /// Leave the critical section
    fn unlock(&self);
}

/// Capability set consumed by the bus.
pub trait Backend: Send + Sync {
    /// One-time setup, called from [`EventBus::init`](crate::EventBus::init).
    ///
    /// `dispatcher` is how the backend's dispatcher context hands dequeued
    /// envelopes back to the bus. An error here aborts initialization.
    fn init(&self, dispatcher: Dispatcher) -> Result<(), BackendError> {
        let _ = dispatcher;
        Ok(())
    }

    /// Queue an envelope from thread context. Must not block.
    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError>;

    /// Queue an envelope from interrupt context.
    ///
    /// Must never block or take a lock.
    fn enqueue_from_isr(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        let _ = envelope;
        Err(EnqueueError::Unsupported)
    }

    /// Take the next queued envelope without waiting, if the backend allows it.
    fn try_dequeue(&self) -> Option<Envelope> {
        None
    }

    /// Lock protecting registry mutation against dispatch, if any.
    fn lock_hooks(&self) -> Option<&dyn BusLock> {
        None
    }
}

/// Holds a backend's lock for the guard's lifetime.
///
/// A no-op when the backend has no lock hooks.
pub struct BackendLockGuard<'a> {
    hooks: Option<&'a dyn BusLock>,
}

impl<'a> BackendLockGuard<'a> {
    /// Enter the backend's lock, if it has one
    pub fn acquire(backend: &'a dyn Backend) -> Self {
        let hooks = backend.lock_hooks();
        if let Some(hooks) = hooks {
            hooks.lock();
        }
        Self { hooks }
    }
}

impl Drop for BackendLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks {
            hooks.unlock();
        }
    }
}

//! In-memory backend.
//!
//! A bounded FIFO with instrumented lock hooks. The host-side test double
//! for the bus, also usable as a single-context backend where the
//! application drives dispatch itself.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Backend, BusLock};
use crate::bus::Dispatcher;
use crate::envelope::Envelope;
use crate::error::{BackendError, EnqueueError};

/// Configuration for [`MemoryBackend`]
#[derive(Debug, Clone)]
pub struct MemoryBackendConfig {
    /// Maximum number of queued envelopes.
    pub capacity: usize,
    /// Whether `enqueue_from_isr` is supported.
    pub isr_enabled: bool,
    /// Whether the backend exposes lock hooks.
    pub locking: bool,
    /// Make `init` fail, for exercising startup errors.
    pub fail_init: bool,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            isr_enabled: false,
            locking: true,
            fail_init: false,
        }
    }
}

/// Lock hooks that count calls and track nesting depth.
#[derive(Debug, Default)]
pub struct LockProbe {
    depth: AtomicUsize,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
}

impl BusLock for LockProbe {
    fn lock(&self) {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.depth.fetch_add(1, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded in-memory FIFO backend
#[derive(Debug)]
pub struct MemoryBackend {
    config: MemoryBackendConfig,
    queue: Mutex<VecDeque<Envelope>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    lock: LockProbe,
    accept: AtomicBool,
    enqueue_calls: AtomicUsize,
    init_calls: AtomicUsize,
}

impl MemoryBackend {
    /// Create a backend with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoryBackendConfig::default())
    }

    /// Create a backend with custom configuration
    pub fn with_config(config: MemoryBackendConfig) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(config.capacity)),
            dispatcher: Mutex::new(None),
            lock: LockProbe::default(),
            accept: AtomicBool::new(true),
            enqueue_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            config,
        }
    }

    /// Make every subsequent enqueue fail with [`EnqueueError::Full`] (or succeed again).
    pub fn set_accepting(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Take the oldest queued envelope
    pub fn dequeue(&self) -> Option<Envelope> {
        self.queue.lock().pop_front()
    }

    /// Most recently queued envelope, without removing it
    pub fn last(&self) -> Option<Envelope> {
        self.queue.lock().back().copied()
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drain the queue through the dispatcher handed over at init.
    ///
    /// Plays the part of a dispatcher context. Returns the number of
    /// envelopes dispatched; zero if the backend was never initialized.
    pub fn pump(&self) -> usize {
        let Some(dispatcher) = self.dispatcher.lock().clone() else {
            return 0;
        };
        let mut count = 0;
        while let Some(envelope) = self.dequeue() {
            dispatcher.dispatch(&envelope);
            count += 1;
        }
        count
    }

    /// Current lock nesting depth
    pub fn lock_depth(&self) -> usize {
        self.lock.depth.load(Ordering::SeqCst)
    }

    /// Total lock hook calls
    pub fn lock_calls(&self) -> usize {
        self.lock.lock_calls.load(Ordering::SeqCst)
    }

    /// Total unlock hook calls
    pub fn unlock_calls(&self) -> usize {
        self.lock.unlock_calls.load(Ordering::SeqCst)
    }

    /// Total enqueue attempts, ISR ones included
    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    /// Number of times `init` was called
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    fn push(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        if !self.accept.load(Ordering::SeqCst) {
            return Err(EnqueueError::Full);
        }

        let mut queue = self.queue.lock();
        if queue.len() >= self.config.capacity {
            return Err(EnqueueError::Full);
        }
        queue.push_back(envelope);
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn init(&self, dispatcher: Dispatcher) -> Result<(), BackendError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.config.fail_init {
            return Err(BackendError::other("memory backend configured to fail init"));
        }
        self.queue.lock().clear();
        *self.dispatcher.lock() = Some(dispatcher);
        Ok(())
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        self.push(envelope)
    }

    /// Shares the queue mutex with `enqueue`. Fine on a host test, not a
    /// model for a real interrupt-safe backend.
    fn enqueue_from_isr(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        if !self.config.isr_enabled {
            return Err(EnqueueError::Unsupported);
        }
        self.push(envelope)
    }

    fn try_dequeue(&self) -> Option<Envelope> {
        self.dequeue()
    }

    fn lock_hooks(&self) -> Option<&dyn BusLock> {
        if self.config.locking {
            Some(&self.lock)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let backend = MemoryBackend::new();
        for id in 0..3 {
            backend.enqueue(Envelope::empty(id).unwrap()).unwrap();
        }
        assert_eq!(backend.len(), 3);
        assert_eq!(backend.last().map(|e| e.id()), Some(2));
        assert_eq!(backend.dequeue().map(|e| e.id()), Some(0));
        assert_eq!(backend.dequeue().map(|e| e.id()), Some(1));
        assert_eq!(backend.dequeue().map(|e| e.id()), Some(2));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_capacity_backpressure() {
        let backend = MemoryBackend::with_config(MemoryBackendConfig {
            capacity: 1,
            ..Default::default()
        });
        let envelope = Envelope::empty(0).unwrap();
        assert_eq!(backend.enqueue(envelope), Ok(()));
        assert_eq!(backend.enqueue(envelope), Err(EnqueueError::Full));
        assert_eq!(backend.enqueue_calls(), 2);
    }

    #[test]
    fn test_forced_rejection() {
        let backend = MemoryBackend::new();
        backend.set_accepting(false);
        assert_eq!(
            backend.enqueue(Envelope::empty(0).unwrap()),
            Err(EnqueueError::Full)
        );
        backend.set_accepting(true);
        assert_eq!(backend.enqueue(Envelope::empty(0).unwrap()), Ok(()));
    }

    #[test]
    fn test_isr_capability_is_optional() {
        let envelope = Envelope::empty(0).unwrap();
        let plain = MemoryBackend::new();
        assert_eq!(
            plain.enqueue_from_isr(envelope),
            Err(EnqueueError::Unsupported)
        );

        let isr = MemoryBackend::with_config(MemoryBackendConfig {
            isr_enabled: true,
            ..Default::default()
        });
        assert_eq!(isr.enqueue_from_isr(envelope), Ok(()));
    }

    #[test]
    fn test_lock_hooks_are_optional() {
        let unlocked = MemoryBackend::with_config(MemoryBackendConfig {
            locking: false,
            ..Default::default()
        });
        assert!(unlocked.lock_hooks().is_none());
        assert!(MemoryBackend::new().lock_hooks().is_some());
    }

    #[test]
    fn test_pump_without_init() {
        let backend = MemoryBackend::new();
        backend.enqueue(Envelope::empty(0).unwrap()).unwrap();
        assert_eq!(backend.pump(), 0);
        assert_eq!(backend.len(), 1);
    }
}

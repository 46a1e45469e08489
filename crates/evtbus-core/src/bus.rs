//! Event Bus implementation.
//!
//! Provides the EventBus facade, the dispatch engine and the global
//! instance for process-wide event distribution.
//!
//! Publishing only enqueues. Callbacks run when the backend's dispatcher
//! context hands an envelope back through [`Dispatcher::dispatch`] (or the
//! application calls [`EventBus::dispatch`] itself). Dispatch copies the live
//! callbacks out under the lock and calls them after releasing it, so a
//! callback may freely subscribe, unsubscribe or publish.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::backend::{Backend, BackendLockGuard};
use crate::config::MAX_HANDLES;
use crate::envelope::{check_event_id, Envelope, EventId};
use crate::error::{BusError, Result};
use crate::pool::{Handle, SlotPool};
use crate::registry::{Snapshot, SubscriptionRegistry};

/// Subscriber callback. Runs on the dispatcher context and must not block.
pub type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    callback: Callback,
}

struct Tables {
    pool: SlotPool<Subscriber, MAX_HANDLES>,
    registry: SubscriptionRegistry,
}

struct Shared {
    tables: Mutex<Tables>,
    backend: Arc<dyn Backend>,
}

impl Shared {
    fn snapshot(&self, event_id: EventId) -> Snapshot<Subscriber> {
        let _guard = BackendLockGuard::acquire(self.backend.as_ref());
        let mut tables = self.tables.lock();
        let Tables { pool, registry } = &mut *tables;
        registry.snapshot(event_id, &*pool)
    }

    fn dispatch(&self, envelope: &Envelope) {
        let event_id = envelope.id();
        if check_event_id(event_id).is_err() {
            tracing::trace!("Dropped envelope with out-of-range event id {}", event_id);
            return;
        }

        let live = self.snapshot(event_id);
        tracing::trace!(
            "Dispatching event {} ({} bytes) to {} subscribers",
            event_id,
            envelope.len(),
            live.len()
        );

        for subscriber in &live {
            (subscriber.callback)(envelope);
        }
    }
}

/// Handle the backend uses to deliver dequeued envelopes.
///
/// Holds a weak reference, so a backend keeping its dispatcher alive does not
/// keep the bus alive. Dispatching after the bus is dropped does nothing.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Weak<Shared>,
}

impl Dispatcher {
    /// Deliver one envelope to its subscribers.
    ///
    /// Never fails: envelopes with unknown ids are dropped.
    pub fn dispatch(&self, envelope: &Envelope) {
        if let Some(shared) = self.shared.upgrade() {
            shared.dispatch(envelope);
        }
    }

    /// Check if the bus behind this dispatcher still exists
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Bounded publish/subscribe event bus
///
/// Cloning is cheap and every clone refers to the same tables.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    /// Create a bus on top of `backend` with empty tables.
    ///
    /// Call [`EventBus::init`] before publishing so the backend can set up
    /// its transport.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables {
                    pool: SlotPool::new(),
                    registry: SubscriptionRegistry::new(),
                }),
                backend,
            }),
        }
    }

    /// Initialize the backend and reset every subscription.
    ///
    /// A backend failure here is fatal for the bus; callers should treat the
    /// returned [`BusError::BackendInit`] as a startup abort.
    pub fn init(&self) -> Result<()> {
        if let Err(err) = self.shared.backend.init(self.dispatcher()) {
            tracing::error!("Event bus backend failed to initialize: {}", err);
            return Err(err.into());
        }

        let released = {
            let _guard = BackendLockGuard::acquire(self.shared.backend.as_ref());
            let mut tables = self.shared.tables.lock();
            tables.registry.reset();
            tables.pool.reset()
        };
        // Subscribers may own contexts that call back into the bus on drop.
        drop(released);

        tracing::debug!("Event bus initialized");
        Ok(())
    }

    /// Subscribe a handler to `event_id`.
    ///
    /// Fails with [`BusError::InvalidEventId`] for out-of-range ids,
    /// [`BusError::RegistryFull`] when the event already has the maximum
    /// number of subscribers, and [`BusError::PoolFull`] when no subscriber
    /// slot is left. The same handler may be subscribed more than once.
    pub fn subscribe<F>(&self, event_id: EventId, handler: F) -> Result<Handle>
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe_callback(event_id, Arc::new(handler))
    }

    /// Subscribe a plain function together with the context it receives.
    pub fn subscribe_with_context<C>(
        &self,
        event_id: EventId,
        callback: fn(&Envelope, &C),
        context: Arc<C>,
    ) -> Result<Handle>
    where
        C: Send + Sync + 'static,
    {
        self.subscribe(event_id, move |envelope| callback(envelope, &context))
    }

    /// Subscribe an already shared callback.
    pub fn subscribe_callback(&self, event_id: EventId, callback: Callback) -> Result<Handle> {
        check_event_id(event_id)?;

        let (result, rolled_back) = {
            let _guard = BackendLockGuard::acquire(self.shared.backend.as_ref());
            let mut tables = self.shared.tables.lock();
            let Tables { pool, registry } = &mut *tables;

            match pool.allocate(Subscriber { callback }) {
                Ok(handle) => match registry.register(event_id, handle, &*pool) {
                    Ok(()) => (Ok(handle), None),
                    // Never leave a slot allocated without a list entry pointing at it.
                    Err(err) => (Err(err), pool.release(handle.index())),
                },
                Err(err) => (Err(err), None),
            }
        };
        drop(rolled_back);

        match result {
            Ok(handle) => {
                tracing::debug!("Subscription {} added to event {}", handle, event_id);
                Ok(handle)
            }
            Err(err) => {
                tracing::warn!("Cannot subscribe to event {}: {}", event_id, err);
                Err(err)
            }
        }
    }

    /// Remove a subscription.
    ///
    /// Stale, forged and invalid handles are ignored. Returns true if a
    /// subscription was removed. The list entry is reclaimed lazily by a later
    /// subscribe or dispatch on the same event.
    pub fn unsubscribe(&self, handle: Handle) -> bool {
        if handle.is_invalid() {
            return false;
        }

        let released = {
            let _guard = BackendLockGuard::acquire(self.shared.backend.as_ref());
            let mut tables = self.shared.tables.lock();
            if tables.pool.is_valid(handle) {
                tables.pool.release(handle.index())
            } else {
                None
            }
        };

        match released {
            Some(_) => {
                tracing::debug!("Subscription {} removed", handle);
                true
            }
            None => {
                tracing::trace!("Ignored unsubscribe of stale handle {}", handle);
                false
            }
        }
    }

    /// Queue an event for later dispatch. Never runs callbacks.
    pub fn publish(&self, event_id: EventId, payload: &[u8]) -> Result<()> {
        let envelope = Envelope::new(event_id, payload)?;
        if let Err(err) = self.shared.backend.enqueue(envelope) {
            tracing::warn!("Failed to enqueue event {}: {}", event_id, err);
            return Err(err.into());
        }
        tracing::trace!("Published event {} ({} bytes)", event_id, payload.len());
        Ok(())
    }

    /// Queue an event from interrupt context.
    ///
    /// Same validation as [`EventBus::publish`], but goes through the
    /// backend's interrupt-safe enqueue and never touches the bus lock.
    pub fn publish_from_isr(&self, event_id: EventId, payload: &[u8]) -> Result<()> {
        let envelope = Envelope::new(event_id, payload)?;
        self.shared.backend.enqueue_from_isr(envelope)?;
        Ok(())
    }

    /// Deliver one envelope to the subscribers of its event id.
    pub fn dispatch(&self, envelope: &Envelope) {
        self.shared.dispatch(envelope);
    }

    /// Dequeue and dispatch one envelope without waiting.
    ///
    /// Returns false if the backend had nothing queued or cannot dequeue
    /// without blocking.
    pub fn dispatch_one(&self) -> bool {
        match self.shared.backend.try_dequeue() {
            Some(envelope) => {
                self.shared.dispatch(&envelope);
                true
            }
            None => false,
        }
    }

    /// Dispatch until the backend queue is empty, returning the count.
    pub fn dispatch_all(&self) -> usize {
        let mut count = 0;
        while self.dispatch_one() {
            count += 1;
        }
        count
    }

    /// Weak dispatch handle for the backend's dispatcher context
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of live subscriptions across all events
    pub fn subscriber_count(&self) -> usize {
        self.shared.tables.lock().pool.occupied()
    }

    /// Number of live subscriptions on one event
    pub fn subscriber_count_for(&self, event_id: EventId) -> usize {
        let tables = self.shared.tables.lock();
        tables.registry.live_count(event_id, &tables.pool)
    }

    /// Check if a handle still refers to a live subscription
    pub fn is_subscribed(&self, handle: Handle) -> bool {
        self.shared.tables.lock().pool.is_valid(handle)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Global event bus instance
static EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Get the global event bus, if it has been initialized
pub fn event_bus() -> Option<&'static EventBus> {
    EVENT_BUS.get()
}

/// Create and initialize the global event bus on top of `backend`.
///
/// Returns [`BusError::AlreadyInitialized`] on a second call. A backend init
/// failure is returned as [`BusError::BackendInit`]; the global stays in
/// place but should be considered unusable.
pub fn init_event_bus(backend: Arc<dyn Backend>) -> Result<&'static EventBus> {
    let mut created = false;
    let bus = EVENT_BUS.get_or_init(|| {
        created = true;
        EventBus::new(backend)
    });
    if !created {
        return Err(BusError::AlreadyInitialized);
    }
    bus.init()?;
    Ok(bus)
}

/// Publish to the global event bus
#[macro_export]
macro_rules! emit {
    ($event_id:expr) => {
        $crate::emit!($event_id, &[])
    };
    ($event_id:expr, $payload:expr) => {
        match $crate::event_bus() {
            Some(bus) => bus.publish($event_id, $payload),
            None => Err($crate::BusError::NotInitialized),
        }
    };
}

/// Subscribe to an event on the global event bus
#[macro_export]
macro_rules! on_event {
    ($event_id:expr, $handler:expr) => {
        match $crate::event_bus() {
            Some(bus) => bus.subscribe($event_id, $handler),
            None => Err($crate::BusError::NotInitialized),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bus() -> (Arc<MemoryBackend>, EventBus) {
        let backend = Arc::new(MemoryBackend::new());
        let bus = EventBus::new(backend.clone());
        bus.init().expect("Should initialize");
        (backend, bus)
    }

    #[test]
    fn test_event_bus_creation() {
        let (backend, bus) = bus();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(backend.init_calls(), 1);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let (_backend, bus) = bus();

        let handle = bus.subscribe(1, |_| {}).unwrap();
        assert_eq!(bus.subscriber_count(), 1);
        assert!(bus.is_subscribed(handle));

        assert!(bus.unsubscribe(handle));
        assert_eq!(bus.subscriber_count(), 0);

        // Double unsubscribe should return false
        assert!(!bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(Handle::INVALID));
    }

    #[test]
    fn test_publish_does_not_run_callbacks() {
        let (backend, bus) = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        bus.subscribe(2, move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        bus.publish(2, &[1]).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(backend.len(), 1);

        assert_eq!(bus.dispatch_all(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rollback_on_full_list() {
        let (_backend, bus) = bus();
        for _ in 0..crate::config::MAX_SUBSCRIBERS_PER_EVENT {
            bus.subscribe(3, |_| {}).unwrap();
        }
        let before = bus.subscriber_count();
        assert_eq!(
            bus.subscribe(3, |_| {}),
            Err(BusError::RegistryFull { event_id: 3 })
        );
        assert_eq!(bus.subscriber_count(), before);
    }

    #[test]
    fn test_init_resets_subscriptions() {
        let (_backend, bus) = bus();
        let handle = bus.subscribe(0, |_| {}).unwrap();
        bus.init().unwrap();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.is_subscribed(handle));
        assert!(!bus.unsubscribe(handle));
    }

    /// Context that reads the bus when it is dropped.
    struct CountOnDrop {
        bus: EventBus,
        seen: Arc<AtomicUsize>,
    }

    impl Drop for CountOnDrop {
        fn drop(&mut self) {
            self.seen.store(self.bus.subscriber_count() + 1, Ordering::SeqCst);
        }
    }

    fn subscribe_counting_on_drop(
        bus: &EventBus,
        event_id: EventId,
        seen: &Arc<AtomicUsize>,
    ) -> Result<Handle> {
        let context = CountOnDrop {
            bus: bus.clone(),
            seen: seen.clone(),
        };
        bus.subscribe(event_id, move |_| {
            let _context = &context;
        })
    }

    fn finishes_within(f: impl FnOnce() + Send + 'static) -> bool {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            f();
            let _ = tx.send(());
        });
        rx.recv_timeout(std::time::Duration::from_secs(2)).is_ok()
    }

    #[test]
    fn test_init_drops_subscribers_outside_lock() {
        let (_backend, bus) = bus();
        let seen = Arc::new(AtomicUsize::new(0));
        subscribe_counting_on_drop(&bus, 0, &seen).unwrap();

        let reinit = bus.clone();
        assert!(finishes_within(move || reinit.init().unwrap()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_rollback_drops_subscriber_outside_lock() {
        let (_backend, bus) = bus();
        for _ in 0..crate::config::MAX_SUBSCRIBERS_PER_EVENT {
            bus.subscribe(5, |_| {}).unwrap();
        }
        let seen = Arc::new(AtomicUsize::new(0));

        let full = bus.clone();
        let seen_clone = seen.clone();
        assert!(finishes_within(move || {
            assert!(matches!(
                subscribe_counting_on_drop(&full, 5, &seen_clone),
                Err(BusError::RegistryFull { event_id: 5 })
            ));
        }));
        assert_eq!(
            seen.load(Ordering::SeqCst),
            crate::config::MAX_SUBSCRIBERS_PER_EVENT + 1
        );
    }

    #[test]
    fn test_dispatcher_detaches_when_bus_dropped() {
        let (_backend, bus) = bus();
        let dispatcher = bus.dispatcher();
        assert!(dispatcher.is_attached());
        drop(bus);
        assert!(!dispatcher.is_attached());
        dispatcher.dispatch(&Envelope::empty(0).unwrap());
    }

    #[test]
    fn test_debug_output() {
        let (_backend, bus) = bus();
        bus.subscribe(0, |_| {}).unwrap();
        assert_eq!(format!("{:?}", bus), "EventBus { subscribers: 1 }");
    }
}

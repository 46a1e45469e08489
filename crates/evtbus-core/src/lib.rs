//! # evtbus Core
//!
//! Deterministic, bounded publish/subscribe for resource-constrained
//! systems. Modules talk to each other by event id, every table is sized at
//! compile time, and callbacks only ever run on the backend's dispatcher
//! context, never inside `publish`.
//!
//! The pieces, leaves first:
//! - [`Envelope`]: fixed-size, copy-by-value event record
//! - [`SlotPool`]: subscriber slots with generation-checked [`Handle`]s
//! - [`SubscriptionRegistry`]: per-event handle lists with lazy self-healing
//! - [`EventBus`]: subscribe/unsubscribe/publish facade and dispatch engine
//! - [`Backend`]: the transport the bus consumes but does not implement

pub mod backend;
pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod pool;
pub mod registry;

pub use backend::{
    Backend, BackendLockGuard, BusLock, LockProbe, MemoryBackend, MemoryBackendConfig,
};
pub use bus::{event_bus, init_event_bus, Callback, Dispatcher, EventBus};
pub use config::{INLINE_MAX, MAX_EVENT_IDS, MAX_HANDLES, MAX_SUBSCRIBERS_PER_EVENT};
pub use envelope::{Envelope, EventId};
pub use error::{BackendError, BusError, EnqueueError, Result};
pub use pool::{Handle, SlotPool};
pub use registry::{Snapshot, SubscriptionRegistry};

//! Error handling for evtbus
//!
//! Provides error types for every layer of the bus:
//! - Bus errors (validation and capacity, returned by the facade)
//! - Enqueue errors (reported by a backend transport)
//! - Backend errors (one-time backend setup)
//!
//! All error types use `thiserror` for ergonomic error handling.
//! Stale handles and malformed dispatch input are not errors: they are
//! ignored silently and never surface here.

use thiserror::Error;

use crate::envelope::EventId;

/// Error reported by a backend when an envelope cannot be queued.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Transport queue is full (backpressure)
    #[error("Event queue is full")]
    Full,

    /// Backend has not been initialized yet, so it has no queue to enqueue into
    #[error("Backend is not ready")]
    NotReady,

    /// Backend does not provide this enqueue capability
    #[error("Enqueue capability not supported by backend")]
    Unsupported,

    /// Dispatcher side of the transport has shut down
    #[error("Event queue is closed")]
    Closed,
}

/// Error reported by a backend during initialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No async runtime available to host the dispatcher
    #[error("No runtime available to spawn the dispatcher")]
    NoRuntime,

    /// Generic backend error
    #[error("Backend error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl BackendError {
    /// Create a backend error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        BackendError::Other {
            message: msg.into(),
        }
    }
}

/// Main error type for evtbus
///
/// Returned by the bus facade. Every variant is recoverable except
/// [`BusError::BackendInit`], which means the bus cannot start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Event id outside `0..MAX_EVENT_IDS`
    #[error("Invalid event id {event_id} (max {max})")]
    InvalidEventId {
        /// The rejected event id.
        event_id: EventId,
        /// Exclusive upper bound for event ids.
        max: usize,
    },

    /// Payload does not fit inline in an envelope
    #[error("Payload of {len} bytes exceeds inline maximum of {max}")]
    PayloadTooLarge {
        /// The rejected payload length.
        len: usize,
        /// The inline payload capacity.
        max: usize,
    },

    /// Every subscriber pool slot is in use
    #[error("Subscriber pool is full")]
    PoolFull,

    /// The subscription list for this event id is full
    #[error("Subscription list for event {event_id} is full")]
    RegistryFull {
        /// The event id whose list is full.
        event_id: EventId,
    },

    /// Global bus was already created
    #[error("Event bus already initialized")]
    AlreadyInitialized,

    /// Global bus has not been created yet
    #[error("Event bus not initialized")]
    NotInitialized,

    /// Backend refused the envelope
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    /// Backend setup failed during init
    #[error("Backend initialization failed: {0}")]
    BackendInit(#[from] BackendError),
}

impl BusError {
    /// Check if this is a capacity exhaustion error
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            BusError::PoolFull
                | BusError::RegistryFull { .. }
                | BusError::Enqueue(EnqueueError::Full)
        )
    }

    /// Check if this is an input validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            BusError::InvalidEventId { .. } | BusError::PayloadTooLarge { .. }
        )
    }
}

/// Result type using BusError
pub type Result<T> = std::result::Result<T, BusError>;

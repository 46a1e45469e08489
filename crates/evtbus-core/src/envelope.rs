//! Event envelope.
//!
//! The fixed-size message unit moved through a backend transport. It is
//! `Copy` and always passed by value, so nothing crosses a queue boundary by
//! reference.

use crate::config::{INLINE_MAX, MAX_EVENT_IDS};
use crate::error::{BusError, Result};

/// Event identifier. Valid ids are `0..MAX_EVENT_IDS`.
pub type EventId = u16;

/// Check that an event id indexes the subscription registry.
pub(crate) fn check_event_id(event_id: EventId) -> Result<usize> {
    let index = usize::from(event_id);
    if index >= MAX_EVENT_IDS {
        return Err(BusError::InvalidEventId {
            event_id,
            max: MAX_EVENT_IDS,
        });
    }
    Ok(index)
}

/// Event id, length and inline payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    id: EventId,
    len: u16,
    payload: [u8; INLINE_MAX],
}

impl Envelope {
    /// Build an envelope, copying `payload` inline.
    ///
    /// Rejects out-of-range event ids and payloads longer than [`INLINE_MAX`].
    pub fn new(id: EventId, payload: &[u8]) -> Result<Self> {
        if payload.len() > INLINE_MAX {
            return Err(BusError::PayloadTooLarge {
                len: payload.len(),
                max: INLINE_MAX,
            });
        }
        check_event_id(id)?;

        let mut buf = [0u8; INLINE_MAX];
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u16,
            payload: buf,
        })
    }

    /// Build an envelope with no payload.
    pub fn empty(id: EventId) -> Result<Self> {
        Self::new(id, &[])
    }

    /// Build an envelope without validating the id.
    ///
    /// Backends that receive raw frames use this; `dispatch` drops unknown ids.
    pub fn from_raw(id: EventId, len: u16, payload: [u8; INLINE_MAX]) -> Self {
        Self { id, len, payload }
    }

    /// Event id
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Payload length as recorded in the envelope
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Check if the envelope carries no payload
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload bytes, clamped to [`INLINE_MAX`].
    pub fn payload(&self) -> &[u8] {
        let len = self.len().min(INLINE_MAX);
        &self.payload[..len]
    }
}

//! Subscription registry.
//!
//! One fixed list of handles per event id. Unsubscribing never touches these
//! lists; entries whose handle no longer resolves in the pool are stale and
//! are cleared in place the next time the list is registered into or
//! dispatched from.

use heapless::Vec;

use crate::config::{MAX_EVENT_IDS, MAX_SUBSCRIBERS_PER_EVENT};
use crate::envelope::{check_event_id, EventId};
use crate::error::{BusError, Result};
use crate::pool::{Handle, SlotPool};

/// Live subscribers copied out of one list, in delivery order.
pub type Snapshot<T> = Vec<T, MAX_SUBSCRIBERS_PER_EVENT>;

/// Per-event subscription lists
#[derive(Debug)]
pub struct SubscriptionRegistry {
    lists: [[Handle; MAX_SUBSCRIBERS_PER_EVENT]; MAX_EVENT_IDS],
}

impl SubscriptionRegistry {
    /// Create a registry with every list empty
    pub fn new() -> Self {
        Self {
            lists: [[Handle::INVALID; MAX_SUBSCRIBERS_PER_EVENT]; MAX_EVENT_IDS],
        }
    }

    /// Insert `handle` into the first empty entry of the list for `event_id`.
    ///
    /// Stale entries are healed during the scan, so they never count against
    /// capacity. Out-of-range ids fail with [`BusError::InvalidEventId`].
    pub fn register<T, const N: usize>(
        &mut self,
        event_id: EventId,
        handle: Handle,
        pool: &SlotPool<T, N>,
    ) -> Result<()> {
        let list = &mut self.lists[check_event_id(event_id)?];

        for entry in list.iter_mut() {
            if !entry.is_invalid() && !pool.is_valid(*entry) {
                tracing::trace!("Reclaimed stale entry {} on event {}", entry, event_id);
                *entry = Handle::INVALID;
            }
            if entry.is_invalid() {
                *entry = handle;
                return Ok(());
            }
        }

        Err(BusError::RegistryFull { event_id })
    }

    /// Copy out the subscriber of every live entry for `event_id`.
    ///
    /// Entries that fail validation are healed and skipped. An out-of-range
    /// id yields an empty snapshot.
    pub fn snapshot<T: Clone, const N: usize>(
        &mut self,
        event_id: EventId,
        pool: &SlotPool<T, N>,
    ) -> Snapshot<T> {
        let mut live = Snapshot::new();
        let Some(list) = self.lists.get_mut(usize::from(event_id)) else {
            return live;
        };

        for entry in list.iter_mut() {
            if entry.is_invalid() {
                continue;
            }
            match pool.get(*entry) {
                Some(subscriber) => {
                    // Cannot overflow: the list and the snapshot share a capacity.
                    let _ = live.push(subscriber.clone());
                }
                None => {
                    tracing::trace!("Reclaimed stale entry {} on event {}", entry, event_id);
                    *entry = Handle::INVALID;
                }
            }
        }

        live
    }

    /// Number of entries for `event_id` that still resolve in the pool.
    pub fn live_count<T, const N: usize>(
        &self,
        event_id: EventId,
        pool: &SlotPool<T, N>,
    ) -> usize {
        self.lists
            .get(usize::from(event_id))
            .map_or(0, |list| list.iter().filter(|h| pool.is_valid(**h)).count())
    }

    /// Number of non-empty entries for `event_id`, stale ones included.
    pub fn occupied_entries(&self, event_id: EventId) -> usize {
        self.lists
            .get(usize::from(event_id))
            .map_or(0, |list| list.iter().filter(|h| !h.is_invalid()).count())
    }

    /// Empty every list
    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.fill(Handle::INVALID);
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

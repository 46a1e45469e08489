//! Fixed-capacity slot pool with generation-checked handles.
//!
//! A slot map: `allocate` hands out a [`Handle`] made of the slot index and
//! the slot's generation, and every lookup checks both. A slot's generation
//! is bumped on each allocation, so a handle to a released slot never matches
//! whatever is stored there later.

use std::fmt;

use crate::error::{BusError, Result};

/// Subscription handle
///
/// Caller-held identity of a subscription. Only valid while its generation
/// matches the pool's record for the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u16,
    generation: u32,
}

impl Handle {
    /// Sentinel meaning "no handle".
    pub const INVALID: Handle = Handle {
        index: u16::MAX,
        generation: 0,
    };

    pub(crate) fn new(index: u16, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the subscriber pool
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Generation the slot had when this handle was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Check if this is the invalid sentinel
    pub fn is_invalid(&self) -> bool {
        self.index == Self::INVALID.index
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Sub(invalid)")
        } else {
            write!(f, "Sub({}#{})", self.index, self.generation)
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Pool of `N` slots, each free or holding one `T`.
#[derive(Debug)]
pub struct SlotPool<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot {
                generation: 0,
                value: None,
            }),
        }
    }

    /// Store `value` in the first free slot, scanning in ascending order.
    pub fn allocate(&mut self, value: T) -> Result<Handle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())
            .ok_or(BusError::PoolFull)?;

        // Generation 0 is never issued.
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        slot.value = Some(value);
        Ok(Handle::new(index as u16, slot.generation))
    }

    /// Free the slot at `index`, returning its value.
    ///
    /// The generation is left alone; the next `allocate` bumps it.
    pub fn release(&mut self, index: u16) -> Option<T> {
        self.slots.get_mut(usize::from(index))?.value.take()
    }

    /// Look up the value behind a handle, if the handle is still valid.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(usize::from(handle.index))?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Check if a handle is in range, occupied and of the current generation.
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.value.is_some()).count()
    }

    /// Total number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Free every slot, handing back the values that were stored.
    ///
    /// Generations survive the reset so handles issued before it stay dead.
    pub fn reset(&mut self) -> Vec<T> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.value.take())
            .collect()
    }
}

impl<T, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

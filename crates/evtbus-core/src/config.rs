//! Compile-time capacity configuration.
//!
//! Every table in the bus is sized from these constants, so the memory
//! footprint is fixed once the crate is built. Tune them per project.

/// Largest payload, in bytes, that fits inline in an [`Envelope`](crate::Envelope).
pub const INLINE_MAX: usize = 16;

/// Maximum number of subscribers attached to a single event id.
pub const MAX_SUBSCRIBERS_PER_EVENT: usize = 10;

/// Number of distinct event ids. Valid ids are `0..MAX_EVENT_IDS`.
pub const MAX_EVENT_IDS: usize = 20;

/// Subscriber pool capacity.
///
/// Sized so the pool can never run out before every per-event list is full.
pub const MAX_HANDLES: usize = MAX_SUBSCRIBERS_PER_EVENT * MAX_EVENT_IDS;

const _: () = assert!(INLINE_MAX > 0, "INLINE_MAX must be non-zero");
const _: () = assert!(INLINE_MAX <= u16::MAX as usize, "envelope length is a u16");
const _: () = assert!(MAX_SUBSCRIBERS_PER_EVENT > 0, "MAX_SUBSCRIBERS_PER_EVENT must be non-zero");
const _: () = assert!(MAX_EVENT_IDS > 0, "MAX_EVENT_IDS must be non-zero");
const _: () = assert!(MAX_EVENT_IDS <= u16::MAX as usize, "event ids are u16");
// 0xFFFF is reserved for the invalid handle sentinel.
const _: () = assert!(MAX_HANDLES > 0 && MAX_HANDLES < u16::MAX as usize);

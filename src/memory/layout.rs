//! Binary layout of the ring control block.
//!
//! The header is the wire format two processes agree on before exchanging
//! elements: a magic/version pair identifies the structure, and the two
//! cursors live on separate cache lines so producer and consumer cores never
//! contend on the same line. The layout must stay bit-compatible across any
//! two processes mapping the same segment.

use std::mem;
use std::sync::atomic::AtomicU64;

use crate::error::{RingError, RingResult};

/// Identifies a ring header in shared memory (ASCII "SPSC").
pub const RING_MAGIC: u32 = u32::from_le_bytes(*b"SPSC");

/// Bumped whenever the binary header layout changes.
pub const RING_VERSION: u32 = 1;

// Safety envelope applied to every construction form.
pub(crate) const MIN_CAPACITY: u64 = 1;
pub(crate) const MAX_CAPACITY: u64 = 1_000_000;
pub(crate) const MAX_ELEMENT_SIZE: usize = 1_000_000;
pub(crate) const MAX_TOTAL_SIZE: usize = 100_000_000; // 100MB

/// Cache line padding to prevent false sharing between the two cursors.
#[repr(C, align(64))]
pub(crate) struct CachePadded<T>(pub T);

/// Control block at the start of every ring region, heap or shared.
///
/// Both cursors are monotonically increasing element counts, never slot
/// indices: `write_pos - read_pos` is the live count regardless of how many
/// times the slot positions have wrapped.
#[repr(C, align(64))]
pub struct RingHeader {
    /// Producer cursor: total elements ever pushed (own cache line).
    pub(crate) write_pos: CachePadded<AtomicU64>,
    /// Consumer cursor: total elements ever popped (own cache line).
    pub(crate) read_pos: CachePadded<AtomicU64>,
    pub(crate) capacity: u64,
    pub(crate) magic: u32,
    pub(crate) version: u32,
}

// Two cursor lines plus one trailing line for the scalars.
const _: () = assert!(mem::size_of::<RingHeader>() == 192);
const _: () = assert!(mem::align_of::<RingHeader>() == 64);

impl RingHeader {
    /// Construct a fresh header in place.
    ///
    /// Called exactly once per region — by the heap constructor or by the
    /// shared-memory creator. Attachers validate, they never reconstruct.
    ///
    /// # Safety
    /// `ptr` must point at writable memory of at least
    /// `size_of::<RingHeader>()` bytes, aligned to 64 bytes.
    pub(crate) unsafe fn init_in_place(ptr: *mut RingHeader, capacity: u64) {
        ptr.write(RingHeader {
            write_pos: CachePadded(AtomicU64::new(0)),
            read_pos: CachePadded(AtomicU64::new(0)),
            capacity,
            magic: RING_MAGIC,
            version: RING_VERSION,
        });
    }

    /// Check magic/version before trusting a header mapped from another
    /// process.
    pub(crate) fn validate(&self) -> RingResult<()> {
        if self.magic != RING_MAGIC {
            return Err(RingError::invalid_argument(format!(
                "magic mismatch: expected {:#010x}, found {:#010x}",
                RING_MAGIC, self.magic
            )));
        }
        if self.version != RING_VERSION {
            return Err(RingError::invalid_argument(format!(
                "header version mismatch: expected {}, found {}",
                RING_VERSION, self.version
            )));
        }
        Ok(())
    }
}

/// Total bytes for a header plus `capacity` slots of `T`.
///
/// The data region starts at `size_of::<RingHeader>()`, which is a multiple
/// of 64, so any element whose alignment divides 64 lands correctly.
pub(crate) fn region_size<T>(capacity: u64) -> RingResult<usize> {
    let element_size = mem::size_of::<T>();
    let element_align = mem::align_of::<T>();

    if element_size == 0 {
        return Err(RingError::invalid_argument(
            "zero-sized element types are not supported",
        ));
    }
    if element_size > MAX_ELEMENT_SIZE {
        return Err(RingError::invalid_argument(format!(
            "element size {} too large, maximum is {}",
            element_size, MAX_ELEMENT_SIZE
        )));
    }
    if element_align > mem::align_of::<RingHeader>() {
        return Err(RingError::invalid_argument(format!(
            "element alignment {} exceeds the region alignment {}",
            element_align,
            mem::align_of::<RingHeader>()
        )));
    }
    if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
        return Err(RingError::invalid_argument(format!(
            "capacity {} out of range {}..={}",
            capacity, MIN_CAPACITY, MAX_CAPACITY
        )));
    }

    let data_size = (capacity as usize)
        .checked_mul(element_size)
        .ok_or_else(|| RingError::invalid_argument("data region size overflow"))?;
    let total = mem::size_of::<RingHeader>()
        .checked_add(data_size)
        .ok_or_else(|| RingError::invalid_argument("total region size overflow"))?;
    if total > MAX_TOTAL_SIZE {
        return Err(RingError::invalid_argument(format!(
            "region size {} exceeds maximum {}",
            total, MAX_TOTAL_SIZE
        )));
    }

    Ok(total)
}

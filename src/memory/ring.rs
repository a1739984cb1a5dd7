//! Fixed-capacity SPSC ring buffers over a private heap region or a named
//! POSIX shared-memory object.
//!
//! One producer and one consumer, each on its own thread or process, share a
//! region laid out as `[RingHeader][T; capacity]`. The hot path (push, pop,
//! peek) touches only that region and is identical for every backing; the
//! cold path (snapshots, drain) exists for diagnostics and persistence.
//!
//! Nothing here ever blocks: a full ring fails the push and an empty ring
//! fails the pop, both with [`RingError::Timeout`] to signal that retrying
//! is the correct response.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use super::layout::{
    region_size, RingHeader, MAX_CAPACITY, MIN_CAPACITY, RING_MAGIC, RING_VERSION,
};
#[cfg(unix)]
use super::platform::{self, ShmMapping};
use crate::error::{RingError, RingResult};

/// One 64-byte-aligned zeroed allocation holding the header and slot array.
struct HeapBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HeapBlock {
    fn alloc_zeroed(size: usize) -> Self {
        let layout = Layout::from_size_align(size, mem::align_of::<RingHeader>())
            .expect("region size already validated");
        // SAFETY: layout has non-zero size (the header alone is 192 bytes)
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };
        Self { ptr, layout }
    }
}

impl Drop for HeapBlock {
    fn drop(&mut self) {
        // SAFETY: ptr/layout are the exact pair returned by alloc_zeroed
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Who owns the region and how it is released.
///
/// Destructor behavior is one exhaustive match instead of a pair of
/// owns-memory/is-shared flags that must be kept consistent by hand.
enum Backing {
    /// Process-private allocation, freed on drop.
    Heap(HeapBlock),
    /// Creator side of a named object: unmaps, closes and unlinks on drop.
    #[cfg(unix)]
    SharedOwned { map: ShmMapping, name: String },
    /// Attacher side: unmaps and closes on drop, never unlinks.
    #[cfg(unix)]
    SharedAttached { map: ShmMapping },
}

impl Drop for Backing {
    fn drop(&mut self) {
        match self {
            // The allocation frees itself.
            Backing::Heap(_) => {}
            // Owner removes the name; the mapping unmaps afterwards.
            #[cfg(unix)]
            Backing::SharedOwned { name, .. } => platform::unlink(name),
            // Attachers leave the name alone.
            #[cfg(unix)]
            Backing::SharedAttached { .. } => {}
        }
    }
}

/// Fixed-capacity single-producer/single-consumer ring buffer.
///
/// Elements must be [`bytemuck::Pod`]: plain old data that can be copied
/// bitwise across process boundaries without serialization.
///
/// The cursor protocol is strictly single-writer/single-reader: only the
/// producer advances `write_pos`, only the consumer advances `read_pos`,
/// and each side pairs a relaxed load of its own cursor with an acquire
/// load of the peer's and a release store of its own. Using more than one
/// producer or more than one consumer breaks the protocol.
///
/// `RingBuffer` is move-only — cloning a handle would mean two owners for
/// one region (and, for shared-memory creators, two unlinkers of one name).
pub struct RingBuffer<T: Pod> {
    base: NonNull<u8>,
    capacity: u64,
    backing: Backing,
    _phantom: PhantomData<T>,
}

// SAFETY: the region is private or OS shared memory with no thread affinity;
// all cross-thread coordination goes through the atomic cursors.
unsafe impl<T: Pod + Send> Send for RingBuffer<T> {}
unsafe impl<T: Pod + Send> Sync for RingBuffer<T> {}

impl<T: Pod> RingBuffer<T> {
    /// Private, heap-backed ring. `capacity` is clamped into the supported
    /// range, so a zero request still yields a usable one-slot ring.
    ///
    /// # Panics
    ///
    /// Panics if `T` itself cannot be ringed (zero-sized, or aligned above
    /// 64 bytes). Allocation failure follows the global allocator
    /// convention.
    pub fn new(capacity: usize) -> Self {
        let capacity = (capacity as u64).clamp(MIN_CAPACITY, MAX_CAPACITY);
        let size = match region_size::<T>(capacity) {
            Ok(size) => size,
            Err(err) => panic!("unsupported ring element type: {}", err),
        };
        let block = HeapBlock::alloc_zeroed(size);
        let base = block.ptr;
        // SAFETY: the allocation is 64-byte aligned and sized for the header
        unsafe { RingHeader::init_in_place(base.as_ptr() as *mut RingHeader, capacity) };
        Self {
            base,
            capacity,
            backing: Backing::Heap(block),
            _phantom: PhantomData,
        }
    }

    /// Create a named shared-memory ring and take ownership of the name.
    ///
    /// The object is created exclusively (`AlreadyExists` on collision),
    /// sized to hold the header plus `capacity` slots, and unlinked when
    /// this handle drops. A failed create never leaves a named object
    /// behind.
    #[cfg(unix)]
    pub fn create_shm(name: &str, capacity: usize) -> RingResult<Self> {
        let capacity = capacity as u64;
        let size = region_size::<T>(capacity)?;
        let map = platform::create_exclusive(name, size)?;
        let base = NonNull::new(map.as_ptr() as *mut u8)
            .ok_or_else(|| RingError::io_error("shared memory mapping is null"))?;
        // SAFETY: the mapping is page-aligned and sized for the header
        unsafe { RingHeader::init_in_place(base.as_ptr() as *mut RingHeader, capacity) };

        log::info!(
            "shm: created ring '{}' (capacity {}, {} bytes)",
            name,
            capacity,
            size
        );
        Ok(Self {
            base,
            capacity,
            backing: Backing::SharedOwned {
                map,
                name: name.to_string(),
            },
            _phantom: PhantomData,
        })
    }

    /// Attach to a ring created by another handle or process.
    ///
    /// The mapped size is discovered from the object itself and the header
    /// is validated (magic, version, capacity-vs-size) before the ring may
    /// be used; on any validation failure the mapping is released and
    /// `InvalidArgument` returned. Attached handles never unlink the name.
    #[cfg(unix)]
    pub fn attach_shm(name: &str) -> RingResult<Self> {
        let map = platform::attach_existing(name)?;
        if map.len() < mem::size_of::<RingHeader>() {
            return Err(RingError::invalid_argument(format!(
                "shared memory object '{}' is too small for a ring header ({} bytes)",
                name,
                map.len()
            )));
        }
        let base = NonNull::new(map.as_ptr() as *mut u8)
            .ok_or_else(|| RingError::io_error("shared memory mapping is null"))?;

        // SAFETY: the mapping covers at least one header and mmap returns
        // page-aligned addresses
        let header = unsafe { &*(base.as_ptr() as *const RingHeader) };
        header.validate()?;

        let capacity = header.capacity;
        let expected = region_size::<T>(capacity)?;
        if map.len() < expected {
            return Err(RingError::invalid_argument(format!(
                "shared memory object '{}' holds {} bytes but a ring of capacity {} needs {}",
                name,
                map.len(),
                capacity,
                expected
            )));
        }

        log::info!("shm: attached ring '{}' (capacity {})", name, capacity);
        Ok(Self {
            base,
            capacity,
            backing: Backing::SharedAttached { map },
            _phantom: PhantomData,
        })
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // SAFETY: base points at a header initialized or validated at
        // construction and alive for as long as the backing
        unsafe { &*(self.base.as_ptr() as *const RingHeader) }
    }

    #[inline]
    fn slot_ptr(&self, pos: u64) -> *mut T {
        let index = (pos % self.capacity) as usize;
        // SAFETY: index < capacity and the region was sized for `capacity`
        // slots starting right after the header
        unsafe { (self.base.as_ptr().add(mem::size_of::<RingHeader>()) as *mut T).add(index) }
    }

    /// Append one element.
    ///
    /// Fails with `Timeout` when the ring is full; the ring is left
    /// unchanged and the caller may retry once the consumer makes progress.
    #[inline]
    pub fn push(&self, value: T) -> RingResult<()> {
        let header = self.header();
        // write_pos is producer-owned, so Relaxed is exact here; the
        // Acquire on read_pos pairs with the consumer's Release in pop.
        let write = header.write_pos.0.load(Ordering::Relaxed);
        let read = header.read_pos.0.load(Ordering::Acquire);
        if write - read >= self.capacity {
            return Err(RingError::timeout("ring buffer full"));
        }
        // SAFETY: slot `write` lies outside [read_pos, write_pos) and only
        // the producer writes slots
        unsafe { ptr::write(self.slot_ptr(write), value) };
        // Publish: the consumer's Acquire of write_pos sees the slot write.
        header.write_pos.0.store(write + 1, Ordering::Release);
        Ok(())
    }

    /// Emplace form of [`push`](Self::push): the value is constructed only
    /// after the capacity check admits it, and written straight into the
    /// slot.
    #[inline]
    pub fn push_with<F>(&self, make: F) -> RingResult<()>
    where
        F: FnOnce() -> T,
    {
        let header = self.header();
        let write = header.write_pos.0.load(Ordering::Relaxed);
        let read = header.read_pos.0.load(Ordering::Acquire);
        if write - read >= self.capacity {
            return Err(RingError::timeout("ring buffer full"));
        }
        // SAFETY: as in push
        unsafe { ptr::write(self.slot_ptr(write), make()) };
        header.write_pos.0.store(write + 1, Ordering::Release);
        Ok(())
    }

    /// Remove and return the oldest element.
    ///
    /// Fails with `Timeout` when the ring is empty; the ring is left
    /// unchanged.
    #[inline]
    pub fn pop(&self) -> RingResult<T> {
        let header = self.header();
        let read = header.read_pos.0.load(Ordering::Relaxed);
        let write = header.write_pos.0.load(Ordering::Acquire);
        if read == write {
            return Err(RingError::timeout("ring buffer empty"));
        }
        // SAFETY: slot `read` lies inside [read_pos, write_pos) and was
        // published by the producer's Release store
        let value = unsafe { ptr::read(self.slot_ptr(read)) };
        // Only after the copy may the producer see the slot as free.
        header.read_pos.0.store(read + 1, Ordering::Release);
        Ok(value)
    }

    /// Reference to the oldest element without consuming it.
    ///
    /// The reference is invalidated by the next `pop`; do not hold it
    /// across one.
    #[inline]
    pub fn peek(&self) -> RingResult<&T> {
        let header = self.header();
        let read = header.read_pos.0.load(Ordering::Relaxed);
        let write = header.write_pos.0.load(Ordering::Acquire);
        if read == write {
            return Err(RingError::timeout("ring buffer empty"));
        }
        // SAFETY: as in pop; the producer cannot overwrite this slot until
        // read_pos advances past it
        Ok(unsafe { &*self.slot_ptr(read) })
    }

    /// Live element count.
    ///
    /// Cursors are monotonic u64 counts, so the subtraction stays correct
    /// across any number of slot-index wrap-arounds. read_pos is loaded
    /// first: write_pos can only grow in between, never dip below it.
    pub fn len(&self) -> usize {
        let header = self.header();
        let read = header.read_pos.0.load(Ordering::Acquire);
        let write = header.write_pos.0.load(Ordering::Acquire);
        (write - read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() as u64 >= self.capacity
    }

    /// Slot count fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// O(1) value copy of the control block. Does not touch the data
    /// region.
    pub fn snapshot(&self) -> RingSnapshot {
        let header = self.header();
        let read_pos = header.read_pos.0.load(Ordering::Acquire);
        let write_pos = header.write_pos.0.load(Ordering::Acquire);
        RingSnapshot {
            write_pos,
            read_pos,
            capacity: header.capacity,
            magic: header.magic,
            version: header.version,
        }
    }

    /// Snapshot plus a copy of every live element in logical order.
    ///
    /// This is an unlocked, best-effort copy: it is not linearizable
    /// against a concurrently running producer or consumer. Quiesce both
    /// sides first when a consistent point-in-time view is required.
    pub fn snapshot_with_data(&self) -> RingSnapshotData<T> {
        let snapshot = self.snapshot();
        let mut elements = Vec::with_capacity((snapshot.write_pos - snapshot.read_pos) as usize);
        for pos in snapshot.read_pos..snapshot.write_pos {
            // SAFETY: positions in [read_pos, write_pos) address initialized
            // slots
            elements.push(unsafe { ptr::read(self.slot_ptr(pos)) });
        }
        RingSnapshotData { snapshot, elements }
    }

    /// Rebuild a private heap ring from a captured snapshot, replaying the
    /// elements in their original order.
    ///
    /// The snapshot header is validated first; a "full" during replay would
    /// mean the snapshot carried more elements than its capacity and is
    /// surfaced as an IO error.
    pub fn from_snapshot(data: &RingSnapshotData<T>) -> RingResult<Self> {
        let snap = &data.snapshot;
        if snap.magic != RING_MAGIC || snap.version != RING_VERSION {
            return Err(RingError::invalid_argument(format!(
                "snapshot header mismatch (magic {:#010x}, version {})",
                snap.magic, snap.version
            )));
        }
        if snap.capacity == 0 {
            return Err(RingError::invalid_argument(
                "snapshot capacity must be non-zero",
            ));
        }
        // Same envelope as every other construction form.
        region_size::<T>(snap.capacity)?;

        let ring = Self::new(snap.capacity as usize);
        for element in &data.elements {
            ring.push(*element).map_err(|_| {
                RingError::io_error("snapshot replay overflowed the ring capacity")
            })?;
        }
        Ok(ring)
    }

    /// Pop until empty, preserving FIFO order.
    ///
    /// Single-consumer discipline applies, exactly as for `pop`.
    pub fn drain(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Ok(value) = self.pop() {
            out.push(value);
        }
        out
    }
}

impl<T: Pod + PartialEq> PartialEq for RingBuffer<T> {
    /// Two rings are equal when their capacities and live contents match.
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity
            && self.snapshot_with_data().elements == other.snapshot_with_data().elements
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("write_pos", &snap.write_pos)
            .field("read_pos", &snap.read_pos)
            .finish()
    }
}

/// Value copy of a ring's control block: O(1), no data-region access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSnapshot {
    pub write_pos: u64,
    pub read_pos: u64,
    pub capacity: u64,
    pub magic: u32,
    pub version: u32,
}

impl RingSnapshot {
    /// Live element count captured by this snapshot.
    pub fn len(&self) -> usize {
        (self.write_pos - self.read_pos) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == self.read_pos
    }
}

/// A snapshot together with the live elements it covered, in logical order.
///
/// Serializable, so ring state can be persisted and later restored with
/// [`RingBuffer::from_snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingSnapshotData<T> {
    pub snapshot: RingSnapshot,
    pub elements: Vec<T>,
}

//! # ringlink
//!
//! Fixed-capacity single-producer/single-consumer ring buffers for
//! low-latency data exchange — privately within one process, or across two
//! cooperating processes through named POSIX shared memory.
//!
//! - **Non-blocking**: every operation returns immediately; full and empty
//!   conditions are reported as retryable [`RingError::Timeout`] errors.
//! - **Cross-process**: a versioned binary header with cache-line separated
//!   cursors is validated before a foreign segment is trusted.
//! - **Persistable**: snapshots of a ring (with or without its live
//!   elements) are plain serde values.
//!
//! ## Quick Start
//!
//! ```rust
//! use ringlink::RingBuffer;
//!
//! let ring = RingBuffer::<u64>::new(4);
//! ring.push(1).unwrap();
//! ring.push(2).unwrap();
//! assert_eq!(ring.pop().unwrap(), 1);
//! assert_eq!(ring.drain(), vec![2]);
//! assert!(ring.pop().is_err()); // empty: retryable, not fatal
//! ```
//!
//! ## Cross-process use
//!
//! One side creates (`RingBuffer::create_shm("/my_ring", 64)`) and owns the
//! name; any later side attaches (`RingBuffer::attach_shm("/my_ring")`).
//! Exactly one producer and one consumer may operate on a ring at a time —
//! the cursor protocol is strictly single-writer/single-reader.

pub mod error;
pub mod memory;

// Re-export commonly used types for easy access
pub use error::{RingError, RingResult};
pub use memory::{RingBuffer, RingSnapshot, RingSnapshotData};

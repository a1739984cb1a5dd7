//! Unified error handling for ringlink.
//!
//! Every fallible operation in the crate returns [`RingResult`] rather than
//! panicking. The variants mirror the failure taxonomy of the shared-memory
//! lifecycle: argument problems, name collisions, missing objects, OS-level
//! faults, and transient backpressure.

use thiserror::Error;

/// Error type for all fallible ring buffer operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// Malformed input: bad shared-memory name, zero/invalid capacity,
    /// or a header whose magic/version does not match this crate.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Exclusive creation collided with an existing shared-memory object.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Attach targeted a shared-memory object that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// OS call failure (open/truncate/map/stat), or a replay invariant
    /// violation while restoring a snapshot.
    #[error("IO error: {0}")]
    Io(String),

    /// Transient backpressure: the ring is full (push side) or empty
    /// (pop side). Retry after the peer makes progress.
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl From<std::io::Error> for RingError {
    fn from(err: std::io::Error) -> Self {
        RingError::Io(err.to_string())
    }
}

/// Convenience type alias for Results using RingError
pub type RingResult<T> = std::result::Result<T, RingError>;

/// Short alias — `Result<T>` is equivalent to `RingResult<T>`
pub type Result<T> = RingResult<T>;

// Helper constructors — one per variant, so call sites stay terse.
impl RingError {
    /// Create an invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        RingError::InvalidArgument(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        RingError::AlreadyExists(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        RingError::NotFound(msg.into())
    }

    /// Create an IO error with a custom message
    pub fn io_error<S: Into<String>>(msg: S) -> Self {
        RingError::Io(msg.into())
    }

    /// Create a timeout error (retryable full/empty backpressure)
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        RingError::Timeout(msg.into())
    }

    /// Whether this error signals retryable backpressure rather than a fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RingError::Timeout(_))
    }
}

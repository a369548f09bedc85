//! Error types for the ledger core.

use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Precondition violations raised by the ledger and allocator.
///
/// None of these are runtime conditions: they mean the caller skipped
/// validation or handed over a ledger of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A campaign needs at least one bucket.
    #[error("ledger must have at least one bucket")]
    NoBuckets,

    /// Bucket capacity must be positive.
    #[error("bucket capacity must be positive")]
    ZeroCapacity,

    /// A referenced bucket does not exist in the ledger.
    #[error("bucket {index} out of range for ledger of {buckets} buckets")]
    BucketOutOfRange { index: usize, buckets: usize },

    /// Replacement totals do not cover every bucket.
    #[error("expected {expected} bucket totals, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

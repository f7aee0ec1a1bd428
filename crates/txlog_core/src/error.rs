//! Error types for the log engine.

use std::io;
use thiserror::Error;

/// Result type for log engine operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in log engine operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] txlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Append attempted on a sealed segment. This is a `Log` invariant
    /// violation, not a caller error.
    #[error("segment sealed: base offset {base_offset}")]
    SegmentSealed {
        /// Base offset of the sealed segment.
        base_offset: u64,
    },

    /// Index bookkeeping went backwards. This is a `Log` invariant
    /// violation, not a caller error.
    #[error("non-monotonic offset: {offset} follows {last}")]
    NonMonotonicOffset {
        /// The offset that was recorded out of order.
        offset: u64,
        /// The last offset previously recorded.
        last: u64,
    },

    /// A read named an offset the log has never assigned.
    ///
    /// Distinct from an empty read: an assigned offset holding no data
    /// record (a control-marker gap) reads as
    /// [`ReadOutcome::Empty`](crate::log::ReadOutcome::Empty), not as this
    /// error.
    #[error("offset {offset} out of range: log end is {log_end}")]
    OffsetOutOfRange {
        /// The requested offset.
        offset: u64,
        /// The first unassigned offset.
        log_end: u64,
    },

    /// A transactional id was reused while still open.
    #[error("transaction already open: {transactional_id}")]
    TransactionAlreadyOpen {
        /// The transactional id supplied by the caller.
        transactional_id: String,
    },

    /// Operation on a transaction that is not open (already committed or
    /// aborted, or superseded by a newer transaction with the same id).
    #[error("invalid transaction state: {transactional_id} is not open")]
    InvalidTransactionState {
        /// The transactional id supplied by the caller.
        transactional_id: String,
    },

    /// A partition with this topic and id already exists.
    #[error("partition exists: {topic}-{partition}")]
    PartitionExists {
        /// Topic name.
        topic: String,
        /// Partition id within the topic.
        partition: u32,
    },

    /// No partition with this topic and id is registered.
    #[error("partition not found: {topic}-{partition}")]
    PartitionNotFound {
        /// Topic name.
        topic: String,
        /// Partition id within the topic.
        partition: u32,
    },

    /// Checksum mismatch while decoding a record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Segment data is corrupted or invalid.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Configuration rejected at construction.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// Description of the rejected value.
        message: String,
    },
}

impl LogError {
    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid transaction state error.
    pub fn invalid_transaction_state(transactional_id: impl Into<String>) -> Self {
        Self::InvalidTransactionState {
            transactional_id: transactional_id.into(),
        }
    }
}

//! Log engine configuration.

use crate::error::{LogError, LogResult};
use std::path::PathBuf;
use std::time::Duration;

/// Which records a read makes visible.
///
/// Control markers are never returned under either level; the levels differ
/// only in how data records of unresolved or aborted transactions are
/// treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Return every data record, including those of open or aborted
    /// transactions.
    #[default]
    ReadUncommitted,
    /// Return only data records of committed transactions (and
    /// non-transactional records).
    ReadCommitted,
}

/// Configuration for opening a log engine.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Maximum size of a single segment before rollover.
    pub segment_max_bytes: u64,

    /// Bytes of record data between sparse index entries. Zero indexes
    /// every record.
    pub index_interval_bytes: u64,

    /// Default wait window for `poll` when the caller does not supply one.
    pub poll_wait_default: Duration,

    /// Maximum number of records a single `poll` returns.
    pub max_poll_records: usize,

    /// Visibility of transactional data records.
    pub isolation: IsolationLevel,

    /// Directory for segment files. `None` keeps the partition in memory.
    pub dir: Option<PathBuf>,

    /// Whether to sync the active segment after every append (safer but
    /// slower).
    pub sync_on_append: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            segment_max_bytes: 256 * 1024 * 1024, // 256 MiB
            index_interval_bytes: 4 * 1024,       // 4 KiB
            poll_wait_default: Duration::from_secs(1),
            max_poll_records: 500,
            isolation: IsolationLevel::ReadUncommitted,
            dir: None,
            sync_on_append: false,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum segment size before rollover.
    #[must_use]
    pub const fn segment_max_bytes(mut self, size: u64) -> Self {
        self.segment_max_bytes = size;
        self
    }

    /// Sets the sparse index interval in bytes.
    #[must_use]
    pub const fn index_interval_bytes(mut self, interval: u64) -> Self {
        self.index_interval_bytes = interval;
        self
    }

    /// Sets the default poll wait window.
    #[must_use]
    pub const fn poll_wait_default(mut self, wait: Duration) -> Self {
        self.poll_wait_default = wait;
        self
    }

    /// Sets the per-poll record cap.
    #[must_use]
    pub const fn max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max;
        self
    }

    /// Sets the isolation level for reads.
    #[must_use]
    pub const fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Sets the segment file directory, making the partition persistent.
    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Sets whether every append is synced to durable storage.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidConfig`] if a field holds a value the
    /// engine cannot operate with.
    pub fn validate(&self) -> LogResult<()> {
        if self.segment_max_bytes == 0 {
            return Err(LogError::invalid_config("segment_max_bytes must be > 0"));
        }
        if self.max_poll_records == 0 {
            return Err(LogError::invalid_config("max_poll_records must be > 0"));
        }
        Ok(())
    }
}

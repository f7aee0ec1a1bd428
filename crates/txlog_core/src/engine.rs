//! The log engine facade.
//!
//! [`LogEngine`] is the sole entry point external callers use: transactional
//! and plain appends, point reads, and blocking polls over one partition.
//! Construction validates the configuration and, for file-backed
//! partitions, rebuilds state by scanning existing segment files. Teardown
//! is `Drop`: releasing the engine releases every segment store on all exit
//! paths.

use crate::config::LogConfig;
use crate::error::LogResult;
use crate::log::{self, Log, ReadOutcome};
use crate::record::Record;
use crate::txn::{TransactionLedger, TxnHandle};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A single-partition transactional log engine.
///
/// # Concurrency
///
/// One append path is active at a time (the log's single-writer lock);
/// reads and polls run concurrently with the writer and observe only fully
/// appended records. `poll` blocks its calling thread, never the writer.
pub struct LogEngine {
    config: LogConfig,
    ledger: Arc<TransactionLedger>,
    log: Log,
    /// Pairs with `appended` for poll wakeups.
    wait_lock: Mutex<()>,
    /// Signaled after every append (data or control marker).
    appended: Condvar,
}

impl LogEngine {
    /// Opens a log engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or existing segment
    /// files cannot be read.
    pub fn open(config: LogConfig) -> LogResult<Self> {
        config.validate()?;

        let recovered = log::recover(&config)?;
        let ledger = Arc::new(TransactionLedger::with_state(
            recovered.next_offset,
            recovered.next_txn,
            recovered.outcomes,
        ));
        let log = Log::new(config.clone(), Arc::clone(&ledger), recovered.segments);

        Ok(Self {
            config,
            ledger,
            log,
            wait_lock: Mutex::new(()),
            appended: Condvar::new(),
        })
    }

    /// Begins a transaction under a caller-supplied transactional id.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::TransactionAlreadyOpen`](crate::error::LogError::TransactionAlreadyOpen)
    /// if the id is still open.
    pub fn begin(&self, transactional_id: &str) -> LogResult<TxnHandle> {
        debug!(transactional_id, "transaction begin");
        self.ledger.begin(transactional_id)
    }

    /// Appends a value, inside the given transaction or outside any.
    ///
    /// Returns the assigned offset.
    pub fn send(&self, txn: Option<&TxnHandle>, value: Bytes) -> LogResult<u64> {
        let offset = self.log.append(txn, value)?;
        self.signal_appended();
        Ok(offset)
    }

    /// Commits a transaction. Its control marker consumes one offset, which
    /// is returned.
    pub fn commit(&self, handle: &TxnHandle) -> LogResult<u64> {
        let marker = self.log.commit(handle)?;
        self.signal_appended();
        Ok(marker)
    }

    /// Aborts a transaction. Its control marker consumes one offset, which
    /// is returned.
    pub fn abort(&self, handle: &TxnHandle) -> LogResult<u64> {
        let marker = self.log.abort(handle)?;
        self.signal_appended();
        Ok(marker)
    }

    /// Reads the record at an exact offset.
    ///
    /// See [`Log::read_from`] for the `Empty` / out-of-range distinction.
    pub fn read_from(&self, offset: u64) -> LogResult<ReadOutcome> {
        self.log.read_from(offset)
    }

    /// Polls for data records starting at `from`, waiting up to `max_wait`.
    ///
    /// Semantics mirror a consumer seek-then-poll:
    ///
    /// - If `from` is at or past the log end, the call blocks until a
    ///   record is appended at or after it, or the wait window elapses.
    /// - Otherwise the batch is evaluated against the segment owning
    ///   `from` only. A `from` landing in a marker-only segment tail
    ///   returns an empty batch even though data exists in later segments;
    ///   the poll never skips forward past the gap on its own.
    ///
    /// Timeouts are not errors: the result is an empty batch. Waiting at an
    /// already-assigned gap offset cannot produce data, so such polls
    /// return immediately.
    pub fn poll(&self, from: u64, max_wait: Duration) -> LogResult<Vec<Record>> {
        let deadline = Instant::now() + max_wait;

        loop {
            if from < self.log.end_offset() {
                return self.log.fetch(from);
            }

            let mut guard = self.wait_lock.lock();
            // Recheck under the lock so an append between the check above
            // and the wait below cannot be missed.
            if from < self.log.end_offset() {
                continue;
            }
            if self.appended.wait_until(&mut guard, deadline).timed_out() {
                return Ok(Vec::new());
            }
        }
    }

    /// Polls with the configured default wait window.
    pub fn poll_default(&self, from: u64) -> LogResult<Vec<Record>> {
        self.poll(from, self.config.poll_wait_default)
    }

    /// Returns the first unassigned offset.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.log.end_offset()
    }

    /// Returns the number of open transactions.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.ledger.open_count()
    }

    /// Returns the base offsets of the log's segments, in order.
    #[must_use]
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.log.segment_base_offsets()
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Wakes every poll blocked on the log end moving.
    fn signal_appended(&self) {
        drop(self.wait_lock.lock());
        self.appended.notify_all();
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("end_offset", &self.end_offset())
            .field("open_transactions", &self.open_transactions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn engine() -> LogEngine {
        LogEngine::open(LogConfig::default()).unwrap()
    }

    #[test]
    fn send_outside_transaction() {
        let engine = engine();
        let offset = engine.send(None, Bytes::from_static(b"v")).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(engine.end_offset(), 1);
    }

    #[test]
    fn transactional_send_and_commit() {
        let engine = engine();
        let handle = engine.begin("tx-a").unwrap();

        let o0 = engine.send(Some(&handle), Bytes::from_static(b"a")).unwrap();
        let o1 = engine.send(Some(&handle), Bytes::from_static(b"b")).unwrap();
        let marker = engine.commit(&handle).unwrap();

        assert_eq!((o0, o1, marker), (0, 1, 2));
        assert_eq!(engine.open_transactions(), 0);
        assert!(engine.read_from(marker).unwrap().is_empty());
    }

    #[test]
    fn poll_returns_available_data_immediately() {
        let engine = engine();
        engine.send(None, Bytes::from_static(b"one")).unwrap();
        engine.send(None, Bytes::from_static(b"two")).unwrap();

        let batch = engine.poll(0, Duration::from_millis(10)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].offset, 0);
        assert_eq!(batch[1].offset, 1);
    }

    #[test]
    fn poll_on_empty_log_times_out_empty() {
        let engine = engine();
        let start = Instant::now();

        let batch = engine.poll(0, Duration::from_millis(50)).unwrap();
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn poll_wakes_on_concurrent_append() {
        let engine = Arc::new(engine());

        let poller = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.poll(0, Duration::from_secs(5)).unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        engine.send(None, Bytes::from_static(b"late")).unwrap();

        let batch = poller.join().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, Bytes::from_static(b"late"));
    }

    #[test]
    fn poll_at_gap_offset_returns_empty_without_waiting() {
        let engine = engine();
        let handle = engine.begin("tx-a").unwrap();
        engine.send(Some(&handle), Bytes::from_static(b"d")).unwrap(); // 0
        let marker = engine.commit(&handle).unwrap(); // 1

        let start = Instant::now();
        let batch = engine.poll(marker, Duration::from_secs(5)).unwrap();
        assert!(batch.is_empty());
        // Known gap: no point burning the wait window.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn poll_default_uses_configured_wait() {
        let config = LogConfig::new().poll_wait_default(Duration::from_millis(10));
        let engine = LogEngine::open(config).unwrap();

        let batch = engine.poll_default(0).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn marker_append_wakes_blocked_poll() {
        let engine = Arc::new(engine());
        let handle = engine.begin("tx-a").unwrap();
        engine.send(Some(&handle), Bytes::from_static(b"d")).unwrap(); // 0

        // Poll at the future marker offset; the commit assigns it.
        let poller = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.poll(1, Duration::from_secs(5)).unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        engine.commit(&handle).unwrap(); // marker at 1

        let batch = poller.join().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn invalid_config_rejected_at_open() {
        let result = LogEngine::open(LogConfig::new().segment_max_bytes(0));
        assert!(result.is_err());
    }
}

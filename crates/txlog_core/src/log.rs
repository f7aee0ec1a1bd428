//! The partition log: an ordered sequence of segments.
//!
//! The log owns segment lifecycle (creation, rollover, sealing), assigns
//! every offset through the shared [`TransactionLedger`] counter, and
//! answers point and range reads. Exactly one segment - the last - is
//! writable at any time; segment offset ranges are contiguous and never
//! overlap.

use crate::config::{IsolationLevel, LogConfig};
use crate::error::{LogError, LogResult};
use crate::record::{Record, RecordKind};
use crate::segment::Segment;
use crate::txn::{TransactionLedger, TxnHandle, TxnOutcome};
use crate::types::TxnId;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use txlog_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Result of a point read.
///
/// `Empty` means the offset is within the assigned range but holds no data
/// record - it was consumed by a transaction control marker (or a failed
/// append). An offset outside the assigned range is not `Empty`; it is the
/// error [`LogError::OffsetOutOfRange`]. Callers must not conflate the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A data record exists at the requested offset.
    Data(Record),
    /// The offset is assigned but holds no data record (a gap).
    Empty,
}

impl ReadOutcome {
    /// Returns the record if this outcome holds one.
    #[must_use]
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Data(record) => Some(record),
            Self::Empty => None,
        }
    }

    /// Returns whether this outcome is a gap.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// State reconstructed by scanning existing segment files.
pub(crate) struct RecoveredLog {
    pub(crate) segments: Vec<Arc<Segment>>,
    pub(crate) next_offset: u64,
    pub(crate) next_txn: u64,
    pub(crate) outcomes: HashMap<TxnId, TxnOutcome>,
}

/// The single-partition log.
pub struct Log {
    config: LogConfig,
    ledger: Arc<TransactionLedger>,
    /// Segments in base-offset order; the last is the active one.
    segments: RwLock<Vec<Arc<Segment>>>,
    /// Single-writer lock: serializes offset assignment, appends, and
    /// rollover into one atomic decision.
    append_lock: Mutex<()>,
}

impl Log {
    /// Creates a log from recovered (or fresh) segments.
    pub(crate) fn new(
        config: LogConfig,
        ledger: Arc<TransactionLedger>,
        segments: Vec<Arc<Segment>>,
    ) -> Self {
        Self {
            config,
            ledger,
            segments: RwLock::new(segments),
            append_lock: Mutex::new(()),
        }
    }

    /// Appends a data record, inside or outside a transaction.
    ///
    /// Returns the assigned offset.
    pub fn append(&self, txn: Option<&TxnHandle>, value: Bytes) -> LogResult<u64> {
        let _guard = self.append_lock.lock();

        let (offset, txn_id) = match txn {
            Some(handle) => (self.ledger.reserve(handle)?, handle.txn()),
            None => (self.ledger.reserve_untracked(), TxnId::NONE),
        };

        let record = Record::data(offset, txn_id, value);
        self.append_record(&record)?;
        Ok(offset)
    }

    /// Commits a transaction, appending its control marker.
    ///
    /// Returns the marker's offset. The single-writer lock is held across
    /// marker reservation, ledger removal, and the marker append, so no
    /// other append can slip an offset in between.
    pub fn commit(&self, handle: &TxnHandle) -> LogResult<u64> {
        self.finish(handle, TxnOutcome::Committed)
    }

    /// Aborts a transaction, appending its control marker.
    ///
    /// Returns the marker's offset.
    pub fn abort(&self, handle: &TxnHandle) -> LogResult<u64> {
        self.finish(handle, TxnOutcome::Aborted)
    }

    fn finish(&self, handle: &TxnHandle, outcome: TxnOutcome) -> LogResult<u64> {
        let _guard = self.append_lock.lock();

        let marker_offset = self.ledger.complete(handle, outcome)?;
        let record = Record::control(marker_offset, handle.txn(), outcome.into());
        self.append_record(&record)?;

        debug!(
            transactional_id = handle.transactional_id(),
            marker_offset,
            ?outcome,
            "transaction finished"
        );
        Ok(marker_offset)
    }

    /// Reads the record at an exact offset.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::OffsetOutOfRange`] if the offset was never
    /// assigned. An assigned offset holding only a control marker reads as
    /// [`ReadOutcome::Empty`].
    pub fn read_from(&self, offset: u64) -> LogResult<ReadOutcome> {
        let log_end = self.ledger.next_offset();
        if offset >= log_end {
            return Err(LogError::OffsetOutOfRange { offset, log_end });
        }

        let segment = self.segment_for(offset, log_end)?;
        match segment.read(offset)? {
            Some(record) if record.is_control() => Ok(ReadOutcome::Empty),
            Some(record) => Ok(ReadOutcome::Data(record)),
            // Assigned but never materialized (failed append): still a gap.
            None => Ok(ReadOutcome::Empty),
        }
    }

    /// Fetches visible data records starting at `from`, bounded to the
    /// segment that owns `from`.
    ///
    /// This deliberately does not continue into later segments: a fetch
    /// landing on a marker-only tail returns an empty batch even though
    /// data exists further on. Callers advance by re-fetching at a higher
    /// offset.
    pub fn fetch(&self, from: u64) -> LogResult<Vec<Record>> {
        let log_end = self.ledger.next_offset();
        if from >= log_end {
            return Ok(Vec::new());
        }

        let segment = self.segment_for(from, log_end)?;
        let records = segment.scan_from(from)?;

        Ok(records
            .into_iter()
            .filter(|record| record.kind == RecordKind::Data)
            .filter(|record| self.visible(record.txn))
            .take(self.config.max_poll_records)
            .collect())
    }

    /// Returns the first unassigned offset.
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.ledger.next_offset()
    }

    /// Returns the number of segments, sealed and active.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Returns the base offsets of all segments in order.
    #[must_use]
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.segments.read().iter().map(|s| s.base_offset()).collect()
    }

    /// Whether a data record is visible under the configured isolation.
    fn visible(&self, txn: TxnId) -> bool {
        match self.config.isolation {
            IsolationLevel::ReadUncommitted => true,
            IsolationLevel::ReadCommitted => txn.is_none() || self.ledger.is_committed(txn),
        }
    }

    /// Appends an already-offset-assigned record, rolling first if it would
    /// overflow the active segment.
    fn append_record(&self, record: &Record) -> LogResult<()> {
        self.maybe_roll(record)?;

        let active = self.active_segment()?;
        active.append(record)?;
        Ok(())
    }

    /// Seals the active segment and opens a new one at the incoming
    /// record's offset if appending it would push the segment past the
    /// configured threshold.
    ///
    /// Rolling happens *before* the append, never after, so a transaction's
    /// control marker lands at the tail of the segment holding its data.
    /// An oversized record into an empty segment is allowed; it gets a
    /// segment of its own.
    fn maybe_roll(&self, record: &Record) -> LogResult<()> {
        let mut segments = self.segments.write();
        let active = segments
            .last()
            .ok_or_else(|| LogError::segment_corruption("log has no active segment"))?;

        let size = active.size_bytes()?;
        if size == 0 || size + record.encoded_size() as u64 <= self.config.segment_max_bytes {
            return Ok(());
        }

        active.seal()?;
        let base_offset = record.offset;
        let segment = self.create_segment(base_offset)?;
        debug!(base_offset, segments = segments.len() + 1, "rolled segment");
        segments.push(Arc::new(segment));
        Ok(())
    }

    fn active_segment(&self) -> LogResult<Arc<Segment>> {
        self.segments
            .read()
            .last()
            .cloned()
            .ok_or_else(|| LogError::segment_corruption("log has no active segment"))
    }

    /// Finds the segment owning `offset`: the last segment whose base
    /// offset is <= `offset`.
    fn segment_for(&self, offset: u64, log_end: u64) -> LogResult<Arc<Segment>> {
        let segments = self.segments.read();
        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        idx.checked_sub(1)
            .and_then(|i| segments.get(i).cloned())
            .ok_or(LogError::OffsetOutOfRange { offset, log_end })
    }

    fn create_segment(&self, base_offset: u64) -> LogResult<Segment> {
        let backend = new_backend(&self.config, base_offset)?;
        Ok(Segment::new(
            base_offset,
            backend,
            self.config.index_interval_bytes,
            self.config.sync_on_append,
        ))
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("end_offset", &self.end_offset())
            .field("segment_count", &self.segment_count())
            .finish_non_exhaustive()
    }
}

/// Segment file name for a base offset, zero-padded so lexicographic and
/// numeric order agree.
fn segment_filename(base_offset: u64) -> String {
    format!("{base_offset:020}.log")
}

/// Creates the byte store for a new segment.
fn new_backend(config: &LogConfig, base_offset: u64) -> LogResult<Box<dyn StorageBackend>> {
    match &config.dir {
        Some(dir) => {
            let path = dir.join(segment_filename(base_offset));
            Ok(Box::new(FileBackend::open_with_create_dirs(&path)?))
        }
        None => Ok(Box::new(InMemoryBackend::new())),
    }
}

/// Opens the log state for a configuration: fresh for in-memory partitions,
/// rebuilt by scanning for file-backed ones.
pub(crate) fn recover(config: &LogConfig) -> LogResult<RecoveredLog> {
    let Some(dir) = config.dir.clone() else {
        return fresh(config);
    };

    std::fs::create_dir_all(&dir)?;
    let mut bases = segment_bases(&dir)?;
    if bases.is_empty() {
        return fresh(config);
    }
    bases.sort_unstable();

    let mut segments = Vec::with_capacity(bases.len());
    let mut next_offset = bases[0];
    let mut next_txn = 1u64;
    let mut outcomes = HashMap::new();

    let last_index = bases.len() - 1;
    for (i, &base) in bases.iter().enumerate() {
        let path = dir.join(segment_filename(base));
        let backend = Box::new(FileBackend::open(&path)?);
        let segment = Segment::open(
            base,
            backend,
            config.index_interval_bytes,
            config.sync_on_append,
        )?;

        for record in segment.scan_from(base)? {
            next_offset = next_offset.max(record.offset + 1);
            next_txn = next_txn.max(record.txn.as_u64() + 1);
            if let RecordKind::Control(control) = record.kind {
                outcomes.insert(record.txn, TxnOutcome::from(control));
            }
        }

        if i < last_index {
            segment.seal()?;
        }
        segments.push(Arc::new(segment));
    }

    info!(
        segments = segments.len(),
        next_offset,
        finished_txns = outcomes.len(),
        "log recovered"
    );

    Ok(RecoveredLog {
        segments,
        next_offset,
        next_txn,
        outcomes,
    })
}

/// A brand-new log: one empty segment at offset zero.
fn fresh(config: &LogConfig) -> LogResult<RecoveredLog> {
    let backend = new_backend(config, 0)?;
    let segment = Segment::new(
        0,
        backend,
        config.index_interval_bytes,
        config.sync_on_append,
    );
    Ok(RecoveredLog {
        segments: vec![Arc::new(segment)],
        next_offset: 0,
        next_txn: 1,
        outcomes: HashMap::new(),
    })
}

/// Lists base offsets of `<base>.log` files in a partition directory.
fn segment_bases(dir: &Path) -> LogResult<Vec<u64>> {
    let mut bases = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(false, |ext| ext == "log") {
            if let Some(base) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                bases.push(base);
            }
        }
    }
    Ok(bases)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_log(config: LogConfig) -> (Log, Arc<TransactionLedger>) {
        let recovered = recover(&config).unwrap();
        let ledger = Arc::new(TransactionLedger::with_state(
            recovered.next_offset,
            recovered.next_txn,
            recovered.outcomes,
        ));
        let log = Log::new(config, Arc::clone(&ledger), recovered.segments);
        (log, ledger)
    }

    fn value(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn append_then_read_back() {
        let (log, _) = open_log(LogConfig::default());

        let o0 = log.append(None, Bytes::from_static(b"first")).unwrap();
        let o1 = log.append(None, Bytes::from_static(b"second")).unwrap();
        assert_eq!((o0, o1), (0, 1));

        let outcome = log.read_from(1).unwrap();
        let record = outcome.into_record().unwrap();
        assert_eq!(record.value, Bytes::from_static(b"second"));
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let (log, _) = open_log(LogConfig::default());
        log.append(None, Bytes::from_static(b"only")).unwrap();

        let result = log.read_from(1);
        assert!(matches!(
            result,
            Err(LogError::OffsetOutOfRange {
                offset: 1,
                log_end: 1
            })
        ));
    }

    #[test]
    fn read_on_empty_log_is_out_of_range() {
        let (log, _) = open_log(LogConfig::default());
        assert!(matches!(
            log.read_from(0),
            Err(LogError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn control_offset_reads_empty() {
        let (log, ledger) = open_log(LogConfig::default());

        let handle = ledger.begin("tx-a").unwrap();
        log.append(Some(&handle), Bytes::from_static(b"payload"))
            .unwrap();
        let marker = log.commit(&handle).unwrap();
        assert_eq!(marker, 1);

        assert!(!log.read_from(0).unwrap().is_empty());
        assert!(log.read_from(1).unwrap().is_empty());
    }

    #[test]
    fn commit_consumes_one_offset_and_next_append_follows() {
        let (log, ledger) = open_log(LogConfig::default());

        let handle = ledger.begin("tx-a").unwrap();
        for _ in 0..3 {
            log.append(Some(&handle), value(8)).unwrap();
        }
        let marker = log.commit(&handle).unwrap();
        assert_eq!(marker, 3);

        let next = log.append(None, value(8)).unwrap();
        assert_eq!(next, 4);
    }

    #[test]
    fn rollover_happens_before_overflowing_append() {
        // Threshold fits two 100-byte payloads (plus framing) but not three.
        let record_size = Record::data(0, TxnId::NONE, value(100)).encoded_size() as u64;
        let config = LogConfig::new().segment_max_bytes(record_size * 2 + 10);
        let (log, _) = open_log(config);

        log.append(None, value(100)).unwrap();
        log.append(None, value(100)).unwrap();
        assert_eq!(log.segment_count(), 1);

        // Third append would overflow: rolls first, lands in a new segment
        // whose base offset is the appended record's offset.
        log.append(None, value(100)).unwrap();
        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.segment_base_offsets(), vec![0, 2]);
    }

    #[test]
    fn oversized_record_gets_own_segment() {
        let config = LogConfig::new().segment_max_bytes(64);
        let (log, _) = open_log(config);

        // Larger than a whole segment; must still be appendable.
        log.append(None, value(500)).unwrap();
        assert_eq!(log.segment_count(), 1);

        log.append(None, value(500)).unwrap();
        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.segment_base_offsets(), vec![0, 1]);
    }

    #[test]
    fn fetch_is_bounded_to_owning_segment() {
        let record_size = Record::data(0, TxnId::NONE, value(64)).encoded_size() as u64;
        let config = LogConfig::new().segment_max_bytes(record_size * 3 + 10);
        let (log, _) = open_log(config);

        for _ in 0..6 {
            log.append(None, value(64)).unwrap();
        }
        assert_eq!(log.segment_base_offsets(), vec![0, 3]);

        let batch = log.fetch(1).unwrap();
        let offsets: Vec<u64> = batch.iter().map(|r| r.offset).collect();
        // Stops at the segment boundary; offsets 3..=5 need another fetch.
        assert_eq!(offsets, vec![1, 2]);
    }

    #[test]
    fn fetch_filters_control_records() {
        let (log, ledger) = open_log(LogConfig::default());

        let handle = ledger.begin("tx-a").unwrap();
        log.append(Some(&handle), value(4)).unwrap();
        log.commit(&handle).unwrap();
        log.append(None, value(4)).unwrap();

        let batch = log.fetch(0).unwrap();
        let offsets: Vec<u64> = batch.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[test]
    fn fetch_past_end_is_empty() {
        let (log, _) = open_log(LogConfig::default());
        assert!(log.fetch(0).unwrap().is_empty());
    }

    #[test]
    fn fetch_respects_max_poll_records() {
        let config = LogConfig::new().max_poll_records(2);
        let (log, _) = open_log(config);

        for _ in 0..5 {
            log.append(None, value(4)).unwrap();
        }

        assert_eq!(log.fetch(0).unwrap().len(), 2);
    }

    #[test]
    fn read_committed_hides_open_and_aborted_data() {
        let config = LogConfig::new().isolation(IsolationLevel::ReadCommitted);
        let (log, ledger) = open_log(config);

        log.append(None, Bytes::from_static(b"plain")).unwrap(); // 0

        let aborted = ledger.begin("tx-a").unwrap();
        log.append(Some(&aborted), Bytes::from_static(b"gone"))
            .unwrap(); // 1
        log.abort(&aborted).unwrap(); // 2

        let open = ledger.begin("tx-b").unwrap();
        log.append(Some(&open), Bytes::from_static(b"pending"))
            .unwrap(); // 3

        let committed = ledger.begin("tx-c").unwrap();
        log.append(Some(&committed), Bytes::from_static(b"kept"))
            .unwrap(); // 4
        log.commit(&committed).unwrap(); // 5

        let offsets: Vec<u64> = log.fetch(0).unwrap().iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 4]);
    }

    #[test]
    fn idempotent_reads() {
        let (log, _) = open_log(LogConfig::default());
        log.append(None, Bytes::from_static(b"stable")).unwrap();

        let first = log.read_from(0).unwrap().into_record().unwrap();
        let second = log.read_from(0).unwrap().into_record().unwrap();
        assert_eq!(first, second);
    }
}

//! Segment storage.
//!
//! A segment is an append-only store covering a contiguous offset range.
//! Exactly one segment per log (the last) is writable; sealing is triggered
//! by the log during rollover and a sealed segment is never modified again.
//!
//! ## Record framing
//!
//! ```text
//! | record_len (4) | offset (8) | kind (1) | txn_id (8) | value (N) | crc32 (4) |
//! ```
//!
//! Records are length-prefixed and self-describing, so a segment can be
//! rebuilt from its bytes alone after reopen.

mod index;

pub use index::OffsetIndex;

use crate::error::{LogError, LogResult};
use crate::record::Record;
use parking_lot::RwLock;
use tracing::{debug, warn};
use txlog_storage::StorageBackend;

/// Length-prefix size for framed records.
const LEN_PREFIX: u64 = 4;

/// Mutable segment bookkeeping, grouped under one lock so appends update it
/// atomically with respect to readers.
#[derive(Debug, Default)]
struct SegmentState {
    sealed: bool,
    last_offset: Option<u64>,
    bytes_since_index: u64,
}

/// One segment of the partition log.
///
/// Owns its byte store exclusively; the log serializes appends, while reads
/// may run concurrently against already-appended records.
pub struct Segment {
    /// Offset of the first record; fixed at creation.
    base_offset: u64,
    /// Bytes between sparse index entries. Zero indexes every record.
    index_interval: u64,
    /// Sync to durable storage after every append.
    sync_on_append: bool,
    backend: RwLock<Box<dyn StorageBackend>>,
    index: RwLock<OffsetIndex>,
    state: RwLock<SegmentState>,
}

impl Segment {
    /// Creates a new empty segment over the given backend.
    pub fn new(
        base_offset: u64,
        backend: Box<dyn StorageBackend>,
        index_interval: u64,
        sync_on_append: bool,
    ) -> Self {
        Self {
            base_offset,
            index_interval,
            sync_on_append,
            backend: RwLock::new(backend),
            index: RwLock::new(OffsetIndex::new()),
            state: RwLock::new(SegmentState::default()),
        }
    }

    /// Opens a segment over a backend that may already hold records,
    /// rebuilding the index and bookkeeping by scanning.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the backing bytes are
    /// corrupted. A torn trailing record (crash mid-append) is discarded,
    /// not treated as corruption.
    pub fn open(
        base_offset: u64,
        backend: Box<dyn StorageBackend>,
        index_interval: u64,
        sync_on_append: bool,
    ) -> LogResult<Self> {
        let segment = Self::new(base_offset, backend, index_interval, sync_on_append);
        segment.rebuild()?;
        Ok(segment)
    }

    /// Returns the offset of the first record this segment covers.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the offset of the last appended record, if any.
    #[must_use]
    pub fn last_offset(&self) -> Option<u64> {
        self.state.read().last_offset
    }

    /// Returns whether this segment has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    /// Returns the current size in bytes.
    pub fn size_bytes(&self) -> LogResult<u64> {
        Ok(self.backend.read().size()?)
    }

    /// Appends a record whose offset was already assigned by the log.
    ///
    /// Returns the byte position the record was written at.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::SegmentSealed`] if the segment is sealed.
    pub fn append(&self, record: &Record) -> LogResult<u64> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(LogError::SegmentSealed {
                base_offset: self.base_offset,
            });
        }

        let encoded = record.encode();
        let mut backend = self.backend.write();
        let position = backend.append(&encoded)?;
        if self.sync_on_append {
            backend.flush()?;
            backend.sync()?;
        }
        drop(backend);

        let mut index = self.index.write();
        if index.is_empty() || state.bytes_since_index >= self.index_interval {
            index.record(record.offset, position)?;
            state.bytes_since_index = 0;
        }
        state.bytes_since_index += encoded.len() as u64;
        state.last_offset = Some(record.offset);

        Ok(position)
    }

    /// Reads the record at an exact offset.
    ///
    /// Returns `None` when this segment holds no record with that offset.
    pub fn read(&self, offset: u64) -> LogResult<Option<Record>> {
        {
            let state = self.state.read();
            match state.last_offset {
                Some(last) if offset >= self.base_offset && offset <= last => {}
                _ => return Ok(None),
            }
        }

        let Some(start) = self.index.read().locate(offset) else {
            return Ok(None);
        };

        let backend = self.backend.read();
        let size = backend.size()?;
        let mut position = start;

        while position + LEN_PREFIX <= size {
            let record = decode_at(backend.as_ref(), position, size)?;
            if record.offset == offset {
                return Ok(Some(record));
            }
            if record.offset > offset {
                break;
            }
            position += record.encoded_size() as u64;
        }

        Ok(None)
    }

    /// Returns every record in this segment with offset >= `from`, in
    /// offset order. Does not look past the end of this segment.
    pub fn scan_from(&self, from: u64) -> LogResult<Vec<Record>> {
        let target = from.max(self.base_offset);
        {
            let state = self.state.read();
            match state.last_offset {
                Some(last) if target <= last => {}
                _ => return Ok(Vec::new()),
            }
        }

        let Some(start) = self.index.read().locate(target) else {
            return Ok(Vec::new());
        };

        let backend = self.backend.read();
        let size = backend.size()?;
        let mut position = start;
        let mut records = Vec::new();

        while position + LEN_PREFIX <= size {
            let record = decode_at(backend.as_ref(), position, size)?;
            position += record.encoded_size() as u64;
            if record.offset >= target {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Seals the segment. Called by the log during rollover; the segment
    /// never triggers this itself.
    ///
    /// Flushes and syncs the backend so a sealed segment is durable.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::SegmentSealed`] if already sealed.
    pub fn seal(&self) -> LogResult<()> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(LogError::SegmentSealed {
                base_offset: self.base_offset,
            });
        }

        let mut backend = self.backend.write();
        backend.flush()?;
        backend.sync()?;
        state.sealed = true;

        debug!(
            base_offset = self.base_offset,
            last_offset = ?state.last_offset,
            "segment sealed"
        );
        Ok(())
    }

    /// Rebuilds index and bookkeeping by scanning the backing store.
    ///
    /// A torn trailing record is truncated away; anything else that fails
    /// to decode is corruption.
    fn rebuild(&self) -> LogResult<()> {
        let mut state = self.state.write();
        let mut index = self.index.write();
        index.clear();
        state.last_offset = None;
        state.bytes_since_index = 0;

        let mut backend = self.backend.write();
        let size = backend.size()?;
        let mut position = 0u64;

        while position + LEN_PREFIX <= size {
            let len_bytes = backend.read_at(position, LEN_PREFIX as usize)?;
            let record_len =
                u64::from(u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]));

            if position + record_len > size {
                break; // torn tail
            }

            let data = backend.read_at(position, record_len as usize)?;
            let record = Record::decode(&data)?;

            if index.is_empty() || state.bytes_since_index >= self.index_interval {
                index.record(record.offset, position)?;
                state.bytes_since_index = 0;
            }
            state.bytes_since_index += record_len;
            state.last_offset = Some(record.offset);

            position += record_len;
        }

        if position < size {
            warn!(
                base_offset = self.base_offset,
                discarded = size - position,
                "discarding torn record tail"
            );
            backend.truncate(position)?;
        }

        Ok(())
    }
}

/// Decodes the framed record starting at `position`.
fn decode_at(backend: &dyn StorageBackend, position: u64, size: u64) -> LogResult<Record> {
    let len_bytes = backend.read_at(position, LEN_PREFIX as usize)?;
    let record_len =
        u64::from(u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]));

    if record_len < LEN_PREFIX || position + record_len > size {
        return Err(LogError::segment_corruption(
            "record extends beyond segment",
        ));
    }

    let data = backend.read_at(position, record_len as usize)?;
    Record::decode(&data)
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("sealed", &state.sealed)
            .field("last_offset", &state.last_offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ControlType;
    use crate::types::TxnId;
    use bytes::Bytes;
    use txlog_storage::InMemoryBackend;

    fn data(offset: u64, payload: &'static [u8]) -> Record {
        Record::data(offset, TxnId::NONE, Bytes::from_static(payload))
    }

    fn create_segment(base: u64) -> Segment {
        Segment::new(base, Box::new(InMemoryBackend::new()), 0, false)
    }

    #[test]
    fn append_and_read_back() {
        let segment = create_segment(0);

        segment.append(&data(0, b"a")).unwrap();
        segment.append(&data(1, b"bb")).unwrap();
        segment.append(&data(2, b"ccc")).unwrap();

        let record = segment.read(1).unwrap().unwrap();
        assert_eq!(record.offset, 1);
        assert_eq!(record.value, Bytes::from_static(b"bb"));
        assert_eq!(segment.last_offset(), Some(2));
    }

    #[test]
    fn read_outside_range_is_none() {
        let segment = create_segment(10);
        segment.append(&data(10, b"x")).unwrap();

        assert!(segment.read(9).unwrap().is_none());
        assert!(segment.read(11).unwrap().is_none());
    }

    #[test]
    fn read_from_empty_segment_is_none() {
        let segment = create_segment(0);
        assert!(segment.read(0).unwrap().is_none());
    }

    #[test]
    fn sealed_segment_rejects_append() {
        let segment = create_segment(0);
        segment.append(&data(0, b"x")).unwrap();
        segment.seal().unwrap();

        let result = segment.append(&data(1, b"y"));
        assert!(matches!(
            result,
            Err(LogError::SegmentSealed { base_offset: 0 })
        ));
    }

    #[test]
    fn double_seal_rejected() {
        let segment = create_segment(0);
        segment.seal().unwrap();
        assert!(matches!(
            segment.seal(),
            Err(LogError::SegmentSealed { .. })
        ));
    }

    #[test]
    fn sealed_segment_still_readable() {
        let segment = create_segment(0);
        segment.append(&data(0, b"keep")).unwrap();
        segment.seal().unwrap();

        let record = segment.read(0).unwrap().unwrap();
        assert_eq!(record.value, Bytes::from_static(b"keep"));
    }

    #[test]
    fn scan_from_returns_tail() {
        let segment = create_segment(0);
        for i in 0..5u64 {
            segment.append(&data(i, b"payload")).unwrap();
        }

        let records = segment.scan_from(3).unwrap();
        let offsets: Vec<u64> = records.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![3, 4]);
    }

    #[test]
    fn scan_from_includes_control_records() {
        let segment = create_segment(0);
        segment.append(&data(0, b"d")).unwrap();
        segment
            .append(&Record::control(1, TxnId::new(1), ControlType::Commit))
            .unwrap();

        let records = segment.scan_from(0).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].is_control());
    }

    #[test]
    fn scan_past_last_offset_is_empty() {
        let segment = create_segment(0);
        segment.append(&data(0, b"x")).unwrap();

        assert!(segment.scan_from(1).unwrap().is_empty());
    }

    #[test]
    fn sparse_index_still_reads_every_offset() {
        // Large interval: only the first record per interval span is indexed,
        // later reads scan forward.
        let segment = Segment::new(0, Box::new(InMemoryBackend::new()), 1024, false);
        for i in 0..20u64 {
            segment.append(&data(i, b"0123456789")).unwrap();
        }

        for i in 0..20u64 {
            let record = segment.read(i).unwrap().unwrap();
            assert_eq!(record.offset, i);
        }
    }

    #[test]
    fn reopen_rebuilds_index_and_state() {
        use txlog_storage::StorageBackend as _;

        // A backend already holding two framed records, as if the process
        // restarted over an existing segment file.
        let mut backend = InMemoryBackend::new();
        backend.append(&data(5, b"one").encode()).unwrap();
        backend.append(&data(6, b"two").encode()).unwrap();

        let reopened = Segment::open(5, Box::new(backend), 0, false).unwrap();
        assert_eq!(reopened.last_offset(), Some(6));
        let record = reopened.read(6).unwrap().unwrap();
        assert_eq!(record.value, Bytes::from_static(b"two"));
    }

    #[test]
    fn reopen_discards_torn_tail() {
        use txlog_storage::StorageBackend as _;

        let mut backend = InMemoryBackend::new();
        let whole = data(0, b"whole").encode();
        let torn = data(1, b"torn-record-payload").encode();
        backend.append(&whole).unwrap();
        backend.append(&torn[..torn.len() - 3]).unwrap();

        let reopened = Segment::open(0, Box::new(backend), 0, false).unwrap();
        assert_eq!(reopened.last_offset(), Some(0));
        assert!(reopened.read(1).unwrap().is_none());
        // The torn bytes are gone; a fresh scan sees one record.
        assert_eq!(reopened.scan_from(0).unwrap().len(), 1);
    }
}

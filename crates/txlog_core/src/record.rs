//! Log record types and on-media codec.

use crate::error::{LogError, LogResult};
use crate::types::TxnId;
use bytes::Bytes;

/// Outcome carried by a control record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// The transaction committed.
    Commit,
    /// The transaction aborted.
    Abort,
}

/// What a record holds: caller data, or a transaction control marker.
///
/// Control markers consume an offset like any other record but are never
/// returned by reads - the offset they occupy is a *gap* from a consumer's
/// point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A data record carrying a caller payload.
    Data,
    /// A transaction control marker.
    Control(ControlType),
}

impl RecordKind {
    const DATA: u8 = 0;
    const CONTROL_COMMIT: u8 = 1;
    const CONTROL_ABORT: u8 = 2;

    /// Returns the wire byte for this kind.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Data => Self::DATA,
            Self::Control(ControlType::Commit) => Self::CONTROL_COMMIT,
            Self::Control(ControlType::Abort) => Self::CONTROL_ABORT,
        }
    }

    /// Parses a wire byte.
    pub fn from_byte(b: u8) -> LogResult<Self> {
        match b {
            Self::DATA => Ok(Self::Data),
            Self::CONTROL_COMMIT => Ok(Self::Control(ControlType::Commit)),
            Self::CONTROL_ABORT => Ok(Self::Control(ControlType::Abort)),
            _ => Err(LogError::segment_corruption(format!(
                "unknown record kind byte {b:#04x}"
            ))),
        }
    }
}

/// A single record in the partition log.
///
/// Immutable once appended. The offset is assigned by the log at append
/// time and is unique across data and control records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Offset of this record in the partition.
    pub offset: u64,
    /// Data or control marker.
    pub kind: RecordKind,
    /// Transaction that produced this record; [`TxnId::NONE`] outside
    /// transactions.
    pub txn: TxnId,
    /// Payload bytes. Empty for control records.
    pub value: Bytes,
}

impl Record {
    /// Header size: record_len (4) + offset (8) + kind (1) + txn_id (8) = 21
    const HEADER_SIZE: usize = 21;
    /// CRC size.
    const CRC_SIZE: usize = 4;

    /// Creates a data record.
    #[must_use]
    pub fn data(offset: u64, txn: TxnId, value: Bytes) -> Self {
        Self {
            offset,
            kind: RecordKind::Data,
            txn,
            value,
        }
    }

    /// Creates a control marker for the given transaction outcome.
    #[must_use]
    pub fn control(offset: u64, txn: TxnId, outcome: ControlType) -> Self {
        Self {
            offset,
            kind: RecordKind::Control(outcome),
            txn,
            value: Bytes::new(),
        }
    }

    /// Returns whether this is a control marker.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(self.kind, RecordKind::Control(_))
    }

    /// Encodes the record to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let record_len = Self::HEADER_SIZE + self.value.len() + Self::CRC_SIZE;
        let mut buf = Vec::with_capacity(record_len);

        // Record length (total including this field)
        buf.extend_from_slice(&(record_len as u32).to_le_bytes());

        // Offset
        buf.extend_from_slice(&self.offset.to_le_bytes());

        // Kind
        buf.push(self.kind.as_byte());

        // Transaction id
        buf.extend_from_slice(&self.txn.as_u64().to_le_bytes());

        // Payload
        buf.extend_from_slice(&self.value);

        // CRC32 (over everything before it)
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decodes a record from bytes.
    pub fn decode(data: &[u8]) -> LogResult<Self> {
        if data.len() < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(LogError::segment_corruption("record too short"));
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE || data.len() < record_len {
            return Err(LogError::segment_corruption("incomplete record"));
        }

        // Verify CRC
        let stored_crc = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed_crc = compute_crc32(&data[..record_len - 4]);
        if stored_crc != computed_crc {
            return Err(LogError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let offset = u64::from_le_bytes([
            data[4], data[5], data[6], data[7], data[8], data[9], data[10], data[11],
        ]);

        let kind = RecordKind::from_byte(data[12])?;

        let txn = TxnId::new(u64::from_le_bytes([
            data[13], data[14], data[15], data[16], data[17], data[18], data[19], data[20],
        ]));

        let payload_len = record_len - Self::HEADER_SIZE - Self::CRC_SIZE;
        let value = Bytes::copy_from_slice(&data[Self::HEADER_SIZE..Self::HEADER_SIZE + payload_len]);

        Ok(Self {
            offset,
            kind,
            txn,
            value,
        })
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.value.len() + Self::CRC_SIZE
    }
}

/// Computes CRC32 (IEEE polynomial) over the given data.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store backing one log segment.
///
/// Backends are **opaque byte stores**. They provide simple operations for
/// reading, appending, and flushing data. The log engine owns all record
/// framing - backends do not understand records, offsets, or segments.
///
/// # Invariants
///
/// - `append` returns the position where data was written
/// - `read_at` returns exactly the bytes previously written at that position
/// - `flush` pushes buffered writes to the OS; `sync` makes them durable
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing and ephemeral partitions
/// - [`super::FileBackend`] - For persistent segment files
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The position is beyond the current size
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, position: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the store.
    ///
    /// Returns the position where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the store in bytes.
    ///
    /// This is the position where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// A stronger guarantee than `flush`: after this returns, appended data
    /// survives process termination and power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the store to the given size.
    ///
    /// Removes all bytes at and after `new_size`. Used to discard a torn
    /// trailing record when a segment is reopened after a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The truncation fails
    /// - `new_size` is greater than the current size
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}

//! Transaction ledger.
//!
//! The ledger owns the partition's single offset counter. Every offset -
//! transactional data, non-transactional data, and control markers - comes
//! from this counter, so no two records ever share an offset and
//! reservation order is assignment order, across however many transactions
//! are open at once.
//!
//! The ledger's own locks only make it safe to share; the atomicity the
//! engine needs (no foreign append between a control marker's reservation
//! and its transaction's removal from the open set) comes from the log's
//! single-writer lock, which is held across the whole commit or abort.

use crate::error::{LogError, LogResult};
use crate::record::ControlType;
use crate::types::TxnId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    /// The transaction committed; its data records are stable.
    Committed,
    /// The transaction aborted; its data records are discarded under
    /// read-committed isolation.
    Aborted,
}

impl From<TxnOutcome> for ControlType {
    fn from(outcome: TxnOutcome) -> Self {
        match outcome {
            TxnOutcome::Committed => ControlType::Commit,
            TxnOutcome::Aborted => ControlType::Abort,
        }
    }
}

impl From<ControlType> for TxnOutcome {
    fn from(control: ControlType) -> Self {
        match control {
            ControlType::Commit => Self::Committed,
            ControlType::Abort => Self::Aborted,
        }
    }
}

/// Handle to an open transaction.
///
/// Obtained from [`TransactionLedger::begin`]; becomes stale once the
/// transaction commits or aborts, after which every operation on it fails
/// with [`LogError::InvalidTransactionState`].
#[derive(Debug)]
pub struct TxnHandle {
    txn: TxnId,
    transactional_id: String,
}

impl TxnHandle {
    /// Returns the internal transaction id.
    #[must_use]
    pub fn txn(&self) -> TxnId {
        self.txn
    }

    /// Returns the caller-supplied transactional id.
    #[must_use]
    pub fn transactional_id(&self) -> &str {
        &self.transactional_id
    }
}

/// Bookkeeping for one open transaction.
#[derive(Debug)]
struct OpenTxn {
    txn: TxnId,
    reserved: Vec<u64>,
}

/// Tracks open transactions, terminal outcomes, and the shared offset
/// counter.
pub struct TransactionLedger {
    /// Next free offset, shared by all append paths.
    next_offset: AtomicU64,
    /// Next internal transaction id. Starts at 1; 0 is [`TxnId::NONE`].
    next_txn: AtomicU64,
    /// Open transactions keyed by transactional id.
    open: Mutex<HashMap<String, OpenTxn>>,
    /// Terminal outcomes of finished transactions.
    outcomes: RwLock<HashMap<TxnId, TxnOutcome>>,
}

impl TransactionLedger {
    /// Creates an empty ledger with the offset counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(0, 1, HashMap::new())
    }

    /// Creates a ledger initialized from recovered state.
    #[must_use]
    pub fn with_state(
        next_offset: u64,
        next_txn: u64,
        outcomes: HashMap<TxnId, TxnOutcome>,
    ) -> Self {
        Self {
            next_offset: AtomicU64::new(next_offset),
            next_txn: AtomicU64::new(next_txn.max(1)),
            open: Mutex::new(HashMap::new()),
            outcomes: RwLock::new(outcomes),
        }
    }

    /// Begins a new transaction under the given transactional id.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::TransactionAlreadyOpen`] if a transaction with
    /// this id is still open.
    pub fn begin(&self, transactional_id: &str) -> LogResult<TxnHandle> {
        let mut open = self.open.lock();
        if open.contains_key(transactional_id) {
            return Err(LogError::TransactionAlreadyOpen {
                transactional_id: transactional_id.to_string(),
            });
        }

        let txn = TxnId::new(self.next_txn.fetch_add(1, Ordering::SeqCst));
        open.insert(
            transactional_id.to_string(),
            OpenTxn {
                txn,
                reserved: Vec::new(),
            },
        );

        Ok(TxnHandle {
            txn,
            transactional_id: transactional_id.to_string(),
        })
    }

    /// Reserves the next free offset for a data record of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidTransactionState`] if the handle's
    /// transaction is no longer open.
    pub fn reserve(&self, handle: &TxnHandle) -> LogResult<u64> {
        let mut open = self.open.lock();
        let entry = Self::open_entry(&mut open, handle)?;

        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        entry.reserved.push(offset);
        Ok(offset)
    }

    /// Reserves the next free offset for a non-transactional record.
    pub fn reserve_untracked(&self) -> u64 {
        self.next_offset.fetch_add(1, Ordering::SeqCst)
    }

    /// Finishes a transaction, consuming one more offset for its control
    /// marker. Returns the marker offset.
    ///
    /// The handle's transaction leaves the open set; only its durable
    /// outcome remains, in the outcome map.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidTransactionState`] if the handle's
    /// transaction is no longer open (re-commit, re-abort, or a stale
    /// handle).
    pub fn complete(&self, handle: &TxnHandle, outcome: TxnOutcome) -> LogResult<u64> {
        let mut open = self.open.lock();
        Self::open_entry(&mut open, handle)?;

        let marker_offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        open.remove(handle.transactional_id());
        self.outcomes.write().insert(handle.txn(), outcome);

        Ok(marker_offset)
    }

    /// Returns the recorded outcome of a finished transaction.
    #[must_use]
    pub fn outcome(&self, txn: TxnId) -> Option<TxnOutcome> {
        self.outcomes.read().get(&txn).copied()
    }

    /// Returns whether the transaction committed.
    #[must_use]
    pub fn is_committed(&self, txn: TxnId) -> bool {
        self.outcome(txn) == Some(TxnOutcome::Committed)
    }

    /// Returns the offsets reserved so far by an open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidTransactionState`] if the handle's
    /// transaction is no longer open.
    pub fn reserved(&self, handle: &TxnHandle) -> LogResult<Vec<u64>> {
        let mut open = self.open.lock();
        let entry = Self::open_entry(&mut open, handle)?;
        Ok(entry.reserved.clone())
    }

    /// Returns the number of open transactions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    /// Returns the next free offset (the log end).
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    /// Looks up the open entry matching the handle, rejecting stale
    /// handles whose transactional id was reused by a newer transaction.
    fn open_entry<'a>(
        open: &'a mut HashMap<String, OpenTxn>,
        handle: &TxnHandle,
    ) -> LogResult<&'a mut OpenTxn> {
        match open.get_mut(handle.transactional_id()) {
            Some(entry) if entry.txn == handle.txn() => Ok(entry),
            _ => Err(LogError::invalid_transaction_state(
                handle.transactional_id(),
            )),
        }
    }
}

impl Default for TransactionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLedger")
            .field("next_offset", &self.next_offset())
            .field("open_count", &self.open_count())
            .finish_non_exhaustive()
    }
}

//! # txlog Core
//!
//! A single-partition, transactional, segmented log engine.
//!
//! This crate provides:
//! - Append-only segments with size-based rollover and sparse offset
//!   indexes
//! - A transaction ledger sharing one offset counter across transactional
//!   appends, plain appends, and control markers
//! - The [`LogEngine`] facade: begin/send/commit/abort plus point reads and
//!   blocking polls
//! - A [`PartitionRegistry`] boundary for the outer topic-management layer
//!
//! ## Offsets and gaps
//!
//! Committing or aborting a transaction appends a control marker that
//! consumes an offset but is invisible to reads. Such offsets are *gaps*:
//! a point read returns [`ReadOutcome::Empty`] (not an error), and a poll
//! whose start offset lands in a marker-only segment tail returns an empty
//! batch without skipping ahead - the behavior a seek-then-poll consumer
//! actually observes.
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use txlog_core::{LogConfig, LogEngine};
//!
//! let engine = LogEngine::open(LogConfig::default()).unwrap();
//!
//! let tx = engine.begin("example-tx").unwrap();
//! engine.send(Some(&tx), Bytes::from_static(b"payload")).unwrap();
//! let marker = engine.commit(&tx).unwrap();
//!
//! // The marker's offset is a gap.
//! assert!(engine.read_from(marker).unwrap().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod partition;
pub mod record;
pub mod segment;
pub mod txn;
pub mod types;

pub use config::{IsolationLevel, LogConfig};
pub use engine::LogEngine;
pub use error::{LogError, LogResult};
pub use log::ReadOutcome;
pub use partition::PartitionRegistry;
pub use record::{ControlType, Record, RecordKind};
pub use txn::{TransactionLedger, TxnHandle, TxnOutcome};
pub use types::TxnId;

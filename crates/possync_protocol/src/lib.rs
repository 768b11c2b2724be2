//! # POS Sync Protocol
//!
//! Canonical transaction records and submission filtering for the POS sync
//! middleware.
//!
//! This crate provides:
//! - [`Submission`] for raw terminal payloads
//! - The deduplication filter (alias canonicalization + line dedup)
//! - [`StagedTransaction`] / [`StagedLineItem`] canonical records
//! - Refund planning for upstream amendments
//!
//! This is a pure crate with no I/O operations. Everything here is
//! deterministic given its inputs, including the timestamp passed in by the
//! caller.
//!
//! ## Key Invariants
//!
//! - Aliases are resolved exactly once, at the boundary
//! - Line numbers are unique within a transaction (first seen wins)
//! - Numeric fields are stored as two-place fixed-point strings

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alias;
mod decimal;
mod error;
pub mod filter;
mod record;
mod refund;
mod schema;
mod submission;

pub use alias::{resolve_aliases, AliasGroup, LINE_ALIASES, SUMMARY_ALIASES};
pub use decimal::{format_decimal, is_empty, parse_integer, parse_number, truncate_chars};
pub use error::{ValidationError, ValidationResult};
pub use record::{StagedLineItem, StagedRecord, StagedTransaction, SyncState};
pub use refund::{RefundPlan, RefundRequest, RefundTotals};
pub use schema::{FieldDefault, FieldKind, FieldSpec, LINE_SCHEMA, SUMMARY_SCHEMA};
pub use submission::{Fields, Submission};

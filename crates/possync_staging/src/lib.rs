//! # POS Sync Staging
//!
//! Local staging store for the POS sync middleware.
//!
//! Terminal submissions are written here before anything touches the
//! network. The reconciler later reads pending records back and marks them
//! synced as the upstream confirms them.
//!
//! ## Available Stores
//!
//! - [`MemoryStagingStore`] - For testing and ephemeral deployments
//! - [`JournalStagingStore`] - Memory store backed by an append-only
//!   JSON-lines journal that is replayed on open
//!
//! ## Example
//!
//! ```rust
//! use possync_protocol::{StagedRecord, Submission};
//! use possync_staging::{MemoryStagingStore, StagingStore, UpsertOutcome};
//!
//! let body = serde_json::json!({
//!     "transactionSummary": { "store": "lapaz", "transactionid": "1001", "receiptid": "R1" },
//!     "transactionRecords": [{ "linenum": 1, "itemid": "SKU-1" }]
//! });
//! let submission = Submission::from_value(&body).unwrap();
//! let record = StagedRecord::from_submission(submission, chrono::Utc::now()).unwrap();
//!
//! let store = MemoryStagingStore::new();
//! assert_eq!(store.upsert(record.clone()).unwrap(), UpsertOutcome::Inserted);
//! assert_eq!(store.upsert(record).unwrap(), UpsertOutcome::Unchanged);
//! assert_eq!(store.list_pending(None, 10).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod memory;
mod store;

pub use error::{StagingError, StagingResult};
pub use journal::JournalStagingStore;
pub use memory::MemoryStagingStore;
pub use store::{StagingStats, StagingStore, UpsertOutcome};

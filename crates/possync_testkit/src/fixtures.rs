//! Test fixtures and staging helpers.
//!
//! Provides sample terminal payloads, canonical records built from them and
//! temporary stores preloaded with those records.

use chrono::{DateTime, TimeZone, Utc};
use possync_protocol::{StagedRecord, Submission};
use possync_staging::{JournalStagingStore, MemoryStagingStore, StagingStore};
use serde_json::{json, Value};
use std::ops::Deref;
use std::path::PathBuf;
use tempfile::TempDir;

/// Fixed staging time used by fixtures.
pub fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0)
        .single()
        .expect("valid fixture time")
}

/// Builds a submission body with one line per number, in the given order.
///
/// Repeated numbers produce duplicate lines, which is what terminals do
/// when a retry is merged into the same payload.
pub fn submission_body(store: &str, transaction_id: &str, line_nums: &[i64]) -> Value {
    let lines: Vec<Value> = line_nums
        .iter()
        .enumerate()
        .map(|(pos, n)| {
            json!({
                "linenum": n,
                "itemid": format!("SKU-{n}"),
                "itemname": format!("Item {n} #{pos}"),
                "price": "25.00",
                "qty": 1,
                "netamount": "25.00",
                "grossamount": "25.00",
                "paymentMethod": "Cash"
            })
        })
        .collect();

    json!({
        "transactionSummary": {
            "store": store,
            "transactionid": transaction_id,
            "receiptid": format!("R-{transaction_id}"),
            "staff": "ana",
            "netamount": format!("{:.2}", 25.0 * lines.len() as f64),
            "grossamount": format!("{:.2}", 25.0 * lines.len() as f64),
            "Zreportid": "",
            "paymentmethod": "Cash"
        },
        "transactionRecords": lines
    })
}

/// The reference scenario: store `lapaz`, transaction `1001`, lines 1, 2
/// and a duplicate of line 1.
pub fn lapaz_submission() -> Value {
    submission_body("lapaz", "1001", &[1, 2, 1])
}

/// Canonicalizes a submission body into a staged record at [`fixture_time`].
pub fn staged_from(body: &Value) -> StagedRecord {
    let submission = Submission::from_value(body).expect("fixture submission is well-formed");
    StagedRecord::from_submission(submission, fixture_time()).expect("fixture record is valid")
}

/// Builds a staged record for `store`/`transaction_id` with the given lines.
pub fn staged(store: &str, transaction_id: &str, line_nums: &[i64]) -> StagedRecord {
    staged_from(&submission_body(store, transaction_id, line_nums))
}

/// Creates a memory store preloaded with `records`.
pub fn memory_store_with(records: &[StagedRecord]) -> MemoryStagingStore {
    let store = MemoryStagingStore::new();
    for record in records {
        store.upsert(record.clone()).expect("memory upsert");
    }
    store
}

/// A journal-backed store in a temporary directory.
pub struct TempJournal {
    /// The store.
    pub store: JournalStagingStore,
    temp_dir: TempDir,
}

impl TempJournal {
    /// Opens an empty journal in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = JournalStagingStore::open(&temp_dir.path().join("staging.jsonl"))
            .expect("Failed to open journal");
        Self { store, temp_dir }
    }

    /// Returns the journal path.
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("staging.jsonl")
    }

    /// Closes and reopens the journal, replaying it from disk.
    pub fn reopen(self) -> Self {
        let Self { store, temp_dir } = self;
        drop(store);
        let store = JournalStagingStore::open(&temp_dir.path().join("staging.jsonl"))
            .expect("Failed to reopen journal");
        Self { store, temp_dir }
    }
}

impl Default for TempJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TempJournal {
    type Target = JournalStagingStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lapaz_fixture_dedups_to_two_lines() {
        let record = staged_from(&lapaz_submission());
        assert_eq!(record.id(), "LAPAZ1001");
        assert_eq!(record.lines.len(), 2);
        assert_eq!(record.line(1).unwrap().fields["itemname"], "Item 1 #0");
    }

    #[test]
    fn temp_journal_reopens() {
        let journal = TempJournal::new();
        journal.upsert(staged("lapaz", "7", &[1])).unwrap();
        assert!(journal.path().exists());

        let journal = journal.reopen();
        assert!(journal.get("LAPAZ7").is_some());
    }
}

//! Staging store trait definition.

use crate::error::StagingResult;
use chrono::{DateTime, Utc};
use possync_protocol::{Fields, StagedRecord, SyncState};
use serde::Serialize;

/// Field excluded from change detection. It defaults to the staging time,
/// so a terminal retry without it would otherwise always look changed.
const CREATED_DATE: &str = "createddate";

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// The transaction id was new.
    Inserted,
    /// The summary or at least one line changed, or lines were added.
    Updated,
    /// Identical resubmission; nothing was written.
    Unchanged,
}

/// Counters over the staged records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingStats {
    /// Staged transactions.
    pub transactions: usize,
    /// Transactions whose summary or any line is pending.
    pub pending_transactions: usize,
    /// Pending lines across all transactions.
    pub pending_lines: usize,
}

/// Durable local store for canonical transactions.
///
/// Stores never touch the network and never delete records. Every mutation
/// is atomic per transaction id: concurrent upserts of the same id leave
/// exactly one record behind.
///
/// # Invariants
///
/// - At most one record per transaction id
/// - Line numbers are unique within a record
/// - `created_at` and `last_sync_attempt` survive upserts
/// - Transitions on unknown ids are no-ops returning `false`
/// - A record is only marked synced with the fields that were pushed
pub trait StagingStore: Send + Sync {
    /// Inserts or refreshes a record.
    ///
    /// A summary whose canonical fields changed goes back to Pending, and so
    /// does every changed line. New lines are added as Pending. Stored lines
    /// missing from the resubmission are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn upsert(&self, record: StagedRecord) -> StagingResult<UpsertOutcome>;

    /// Returns records with a pending summary or line, oldest first.
    ///
    /// Records are ordered by `created_at`, ties broken by insertion order.
    /// `store` filters on the upper-cased store code.
    fn list_pending(&self, store: Option<&str>, limit: usize) -> Vec<StagedRecord>;

    /// Returns a staged record by transaction id.
    fn get(&self, transaction_id: &str) -> Option<StagedRecord>;

    /// Marks a transaction summary as synced, provided its stored fields
    /// still equal `pushed`.
    ///
    /// `pushed` is what went upstream. If an upsert changed the summary in
    /// the meantime the record stays Pending and `false` is returned, the
    /// same as for an unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn mark_synced(&self, transaction_id: &str, pushed: &Fields) -> StagingResult<bool>;

    /// Marks one line as synced, provided its stored fields still equal
    /// `pushed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn mark_line_synced(
        &self,
        transaction_id: &str,
        line_num: i64,
        pushed: &Fields,
    ) -> StagingResult<bool>;

    /// Records a sync attempt on the summary without changing its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn record_attempt(&self, transaction_id: &str, at: DateTime<Utc>) -> StagingResult<bool>;

    /// Records a push attempt on one line without changing its state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn record_line_attempt(
        &self,
        transaction_id: &str,
        line_num: i64,
        at: DateTime<Utc>,
    ) -> StagingResult<bool>;

    /// Assigns a Z-report id to every transaction of `store` that has none.
    ///
    /// Returns the number of transactions updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn assign_z_report(&self, store: &str, z_report_id: &str) -> StagingResult<usize>;

    /// Returns counters over the staged records.
    fn stats(&self) -> StagingStats;
}

/// Folds a resubmission into the stored record.
pub(crate) fn merge(existing: &mut StagedRecord, incoming: StagedRecord) -> UpsertOutcome {
    let mut changed = false;

    let current = &mut existing.transaction;
    if !same_fields(&current.fields, &incoming.transaction.fields) {
        current.fields = keep_created_date(&current.fields, incoming.transaction.fields);
        current.receipt_id = incoming.transaction.receipt_id;
        current.sync_state = SyncState::Pending;
        changed = true;
    }

    for line in incoming.lines {
        match existing.lines.iter_mut().find(|l| l.line_num == line.line_num) {
            Some(stored) => {
                if !same_fields(&stored.fields, &line.fields) {
                    stored.fields = keep_created_date(&stored.fields, line.fields);
                    stored.sync_state = SyncState::Pending;
                    changed = true;
                }
            }
            None => {
                existing.lines.push(line);
                changed = true;
            }
        }
    }

    if changed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Unchanged
    }
}

pub(crate) fn compute_stats<'a>(records: impl Iterator<Item = &'a StagedRecord>) -> StagingStats {
    let mut stats = StagingStats::default();
    for record in records {
        stats.transactions += 1;
        if record.has_pending() {
            stats.pending_transactions += 1;
        }
        stats.pending_lines += record.pending_lines().count();
    }
    stats
}

pub(crate) fn store_matches(record: &StagedRecord, store: Option<&str>) -> bool {
    store.map_or(true, |s| record.transaction.store.eq_ignore_ascii_case(s.trim()))
}

pub(crate) fn same_fields(stored: &Fields, incoming: &Fields) -> bool {
    let relevant = |fields: &Fields| {
        fields
            .iter()
            .filter(|(k, _)| k.as_str() != CREATED_DATE)
            .count()
    };
    relevant(stored) == relevant(incoming)
        && incoming
            .iter()
            .filter(|(k, _)| k.as_str() != CREATED_DATE)
            .all(|(k, v)| stored.get(k) == Some(v))
}

fn keep_created_date(stored: &Fields, mut incoming: Fields) -> Fields {
    if let Some(created) = stored.get(CREATED_DATE) {
        incoming.insert(CREATED_DATE.to_string(), created.clone());
    }
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use possync_protocol::Submission;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn record(at: DateTime<Utc>, netamount: &str, lines: serde_json::Value) -> StagedRecord {
        let body = json!({
            "transactionSummary": {
                "store": "lapaz", "transactionid": "1001", "receiptid": "R1",
                "netamount": netamount
            },
            "transactionRecords": lines
        });
        StagedRecord::from_submission(Submission::from_value(&body).unwrap(), at).unwrap()
    }

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, minute, 0).unwrap()
    }

    #[test]
    fn identical_resubmission_is_unchanged() {
        let mut stored = record(t(0), "10", json!([{ "linenum": 1 }]));
        stored.transaction.sync_state = SyncState::Synced;

        // Staged a minute later: createddate differs, nothing else does.
        let outcome = merge(&mut stored, record(t(1), "10", json!([{ "linenum": 1 }])));

        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(stored.transaction.sync_state, SyncState::Synced);
    }

    #[test]
    fn changed_summary_resets_to_pending() {
        let mut stored = record(t(0), "10", json!([{ "linenum": 1 }]));
        stored.transaction.sync_state = SyncState::Synced;
        stored.lines[0].sync_state = SyncState::Synced;

        let outcome = merge(&mut stored, record(t(1), "12", json!([{ "linenum": 1 }])));

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(stored.transaction.sync_state, SyncState::Pending);
        assert_eq!(stored.transaction.fields["netamount"], "12.00");
        assert_eq!(stored.transaction.fields["createddate"], "2024-03-01T08:00:00.000Z");
        assert_eq!(stored.lines[0].sync_state, SyncState::Synced);
    }

    #[test]
    fn changed_and_new_lines_pending() {
        let mut stored = record(t(0), "10", json!([{ "linenum": 1, "itemid": "A" }, { "linenum": 2 }]));
        stored.transaction.sync_state = SyncState::Synced;
        for line in &mut stored.lines {
            line.sync_state = SyncState::Synced;
        }

        let outcome = merge(
            &mut stored,
            record(t(1), "10", json!([{ "linenum": 1, "itemid": "B" }, { "linenum": 3 }])),
        );

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(stored.transaction.sync_state, SyncState::Synced);
        assert_eq!(stored.lines.len(), 3);
        assert_eq!(stored.line(1).unwrap().sync_state, SyncState::Pending);
        assert_eq!(stored.line(2).unwrap().sync_state, SyncState::Synced);
        assert_eq!(stored.line(3).unwrap().sync_state, SyncState::Pending);
    }

    #[test]
    fn store_filter_ignores_case() {
        let r = record(t(0), "1", json!([{ "linenum": 1 }]));
        assert!(store_matches(&r, None));
        assert!(store_matches(&r, Some("lapaz")));
        assert!(!store_matches(&r, Some("makati")));
    }

    fn numbered(nums: &BTreeSet<i64>) -> serde_json::Value {
        nums.iter().map(|n| json!({ "linenum": n })).collect()
    }

    proptest! {
        #[test]
        fn merge_keeps_the_union_of_lines(
            stored in prop::collection::btree_set(1i64..20, 1..10),
            incoming in prop::collection::btree_set(1i64..20, 1..10),
        ) {
            let mut existing = record(t(0), "10", numbered(&stored));
            for line in &mut existing.lines {
                line.sync_state = SyncState::Synced;
            }

            merge(&mut existing, record(t(1), "10", numbered(&incoming)));

            let got: BTreeSet<i64> = existing.lines.iter().map(|l| l.line_num).collect();
            let union: BTreeSet<i64> = stored.union(&incoming).copied().collect();
            prop_assert_eq!(got, union);
            for line in &existing.lines {
                let expected = if stored.contains(&line.line_num) {
                    SyncState::Synced
                } else {
                    SyncState::Pending
                };
                prop_assert_eq!(&line.sync_state, &expected);
            }
        }
    }
}

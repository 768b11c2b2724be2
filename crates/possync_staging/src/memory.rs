//! In-memory staging store.

use crate::error::StagingResult;
use crate::store::{
    compute_stats, merge, same_fields, store_matches, StagingStats, StagingStore, UpsertOutcome,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use possync_protocol::{Fields, StagedRecord, SyncState};
use serde_json::Value;
use std::collections::HashMap;

/// An in-memory staging store.
///
/// All records live behind a single lock, so every read-modify-write is
/// atomic per record. Suitable for tests and for deployments that accept
/// losing unsynced records on restart.
///
/// # Example
///
/// ```rust
/// use possync_staging::{MemoryStagingStore, StagingStore};
///
/// let store = MemoryStagingStore::new();
/// assert!(store.is_empty());
/// assert!(!store.mark_synced("NOPE1", &Default::default()).unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, StagedRecord>,
    next_seq: u64,
}

impl MemoryStagingStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from replayed snapshots. Later snapshots win.
    pub(crate) fn from_snapshots(snapshots: impl IntoIterator<Item = StagedRecord>) -> Self {
        let mut inner = Inner::default();
        for record in snapshots {
            inner.next_seq = inner.next_seq.max(record.transaction.seq + 1);
            inner.records.insert(record.id().to_string(), record);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Returns the number of staged transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every staged record in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<StagedRecord> {
        let mut records: Vec<_> = self.inner.read().records.values().cloned().collect();
        records.sort_by_key(|r| r.transaction.seq);
        records
    }

    /// Merges `record` into the store.
    ///
    /// `commit` sees the new snapshot before it is installed; if it fails the
    /// store is left as it was.
    pub(crate) fn apply_upsert(
        &self,
        mut record: StagedRecord,
        commit: impl FnOnce(&StagedRecord) -> StagingResult<()>,
    ) -> StagingResult<UpsertOutcome> {
        let mut inner = self.inner.write();
        let id = record.id().to_string();

        if let Some(existing) = inner.records.get(&id) {
            let mut merged = existing.clone();
            let outcome = merge(&mut merged, record);
            if outcome == UpsertOutcome::Updated {
                commit(&merged)?;
                inner.records.insert(id, merged);
            }
            return Ok(outcome);
        }

        record.transaction.seq = inner.next_seq;
        commit(&record)?;
        inner.next_seq += 1;
        inner.records.insert(id, record);
        Ok(UpsertOutcome::Inserted)
    }

    /// Runs `f` on a copy of the record and installs the copy once `commit`
    /// accepts it.
    ///
    /// `f` returns `None` if its target does not exist or no longer matches
    /// what the caller read, otherwise whether it changed anything. Returns
    /// whether the target was found.
    pub(crate) fn touch(
        &self,
        transaction_id: &str,
        f: impl FnOnce(&mut StagedRecord) -> Option<bool>,
        commit: impl FnOnce(&StagedRecord) -> StagingResult<()>,
    ) -> StagingResult<bool> {
        let mut inner = self.inner.write();
        let Some(current) = inner.records.get(transaction_id) else {
            return Ok(false);
        };
        let mut updated = current.clone();
        match f(&mut updated) {
            None => Ok(false),
            Some(false) => Ok(true),
            Some(true) => {
                commit(&updated)?;
                inner.records.insert(transaction_id.to_string(), updated);
                Ok(true)
            }
        }
    }

    /// Stamps `z_report_id` on every record of `store` without one, in
    /// insertion order. Records committed before a failing `commit` keep
    /// the stamp.
    pub(crate) fn apply_z_report(
        &self,
        store: &str,
        z_report_id: &str,
        mut commit: impl FnMut(&StagedRecord) -> StagingResult<()>,
    ) -> StagingResult<usize> {
        let mut inner = self.inner.write();
        let mut targets: Vec<StagedRecord> = inner
            .records
            .values()
            .filter(|r| store_matches(r, Some(store)) && r.transaction.z_report_id().is_none())
            .cloned()
            .collect();
        targets.sort_by_key(|r| r.transaction.seq);

        let updated = targets.len();
        for mut record in targets {
            record
                .transaction
                .fields
                .insert("zReportid".to_string(), Value::from(z_report_id));
            commit(&record)?;
            inner.records.insert(record.id().to_string(), record);
        }
        Ok(updated)
    }
}

/// Returns `None` when the summary no longer matches `pushed`.
pub(crate) fn set_synced(record: &mut StagedRecord, pushed: &Fields) -> Option<bool> {
    if !same_fields(&record.transaction.fields, pushed) {
        return None;
    }
    let changed = record.transaction.sync_state != SyncState::Synced;
    record.transaction.sync_state = SyncState::Synced;
    Some(changed)
}

pub(crate) fn set_line_synced(
    record: &mut StagedRecord,
    line_num: i64,
    pushed: &Fields,
) -> Option<bool> {
    let line = record
        .lines
        .iter_mut()
        .find(|l| l.line_num == line_num && same_fields(&l.fields, pushed))?;
    let changed = line.sync_state != SyncState::Synced;
    line.sync_state = SyncState::Synced;
    Some(changed)
}

pub(crate) fn set_attempt(record: &mut StagedRecord, at: DateTime<Utc>) -> Option<bool> {
    record.transaction.last_sync_attempt = Some(at);
    Some(true)
}

pub(crate) fn set_line_attempt(
    record: &mut StagedRecord,
    line_num: i64,
    at: DateTime<Utc>,
) -> Option<bool> {
    let line = record.lines.iter_mut().find(|l| l.line_num == line_num)?;
    line.last_sync_attempt = Some(at);
    Some(true)
}

impl StagingStore for MemoryStagingStore {
    fn upsert(&self, record: StagedRecord) -> StagingResult<UpsertOutcome> {
        self.apply_upsert(record, |_| Ok(()))
    }

    fn list_pending(&self, store: Option<&str>, limit: usize) -> Vec<StagedRecord> {
        let inner = self.inner.read();
        let mut pending: Vec<&StagedRecord> = inner
            .records
            .values()
            .filter(|r| r.has_pending() && store_matches(r, store))
            .collect();
        pending.sort_by_key(|r| (r.transaction.created_at, r.transaction.seq));
        pending.into_iter().take(limit).cloned().collect()
    }

    fn get(&self, transaction_id: &str) -> Option<StagedRecord> {
        self.inner.read().records.get(transaction_id).cloned()
    }

    fn mark_synced(&self, transaction_id: &str, pushed: &Fields) -> StagingResult<bool> {
        self.touch(transaction_id, |r| set_synced(r, pushed), |_| Ok(()))
    }

    fn mark_line_synced(
        &self,
        transaction_id: &str,
        line_num: i64,
        pushed: &Fields,
    ) -> StagingResult<bool> {
        self.touch(
            transaction_id,
            |r| set_line_synced(r, line_num, pushed),
            |_| Ok(()),
        )
    }

    fn record_attempt(&self, transaction_id: &str, at: DateTime<Utc>) -> StagingResult<bool> {
        self.touch(transaction_id, |r| set_attempt(r, at), |_| Ok(()))
    }

    fn record_line_attempt(
        &self,
        transaction_id: &str,
        line_num: i64,
        at: DateTime<Utc>,
    ) -> StagingResult<bool> {
        self.touch(
            transaction_id,
            |r| set_line_attempt(r, line_num, at),
            |_| Ok(()),
        )
    }

    fn assign_z_report(&self, store: &str, z_report_id: &str) -> StagingResult<usize> {
        self.apply_z_report(store, z_report_id, |_| Ok(()))
    }

    fn stats(&self) -> StagingStats {
        compute_stats(self.inner.read().records.values())
    }
}

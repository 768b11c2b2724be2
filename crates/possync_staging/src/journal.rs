//! File-backed staging store.

use crate::error::{StagingError, StagingResult};
use crate::memory::{set_attempt, set_line_attempt, set_line_synced, set_synced, MemoryStagingStore};
use crate::store::{StagingStats, StagingStore, UpsertOutcome};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use possync_protocol::{Fields, StagedRecord};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A staging store persisted to an append-only JSON-lines journal.
///
/// Every mutation that changes a record appends the full post-mutation
/// snapshot of that record before the change becomes visible. A failed
/// append leaves the store unchanged. On open the journal is replayed and
/// the last snapshot of each transaction wins.
///
/// # Durability
///
/// - Mutations are serialized by the journal lock, so the journal order
///   matches the order in which snapshots were taken
/// - A torn trailing line (crash mid-append) is dropped on open
/// - [`JournalStagingStore::compact`] rewrites the journal to one line per
///   record via a temporary file and an atomic rename
///
/// # Example
///
/// ```no_run
/// use possync_staging::{JournalStagingStore, StagingStore};
/// use std::path::Path;
///
/// let store = JournalStagingStore::open(Path::new("staging.jsonl")).unwrap();
/// println!("{} pending", store.stats().pending_transactions);
/// ```
#[derive(Debug)]
pub struct JournalStagingStore {
    path: PathBuf,
    memory: MemoryStagingStore,
    journal: Mutex<File>,
}

impl JournalStagingStore {
    /// Opens or creates a journal at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, or if an entry other
    /// than the last one cannot be parsed.
    pub fn open(path: &Path) -> StagingResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let (snapshots, valid_len) = replay(path)?;
        let replayed = snapshots.len();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if file.metadata()?.len() > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let memory = MemoryStagingStore::from_snapshots(snapshots);
        tracing::info!(
            path = %path.display(),
            entries = replayed,
            transactions = memory.len(),
            "staging journal opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            memory,
            journal: Mutex::new(file),
        })
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the journal with one snapshot per staged record.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be written or renamed.
    pub fn compact(&self) -> StagingResult<usize> {
        let mut journal = self.journal.lock();

        let records = self.memory.records();
        let tmp_path = self.path.with_extension("compact.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for record in &records {
                serde_json::to_writer(&mut tmp, record)?;
                tmp.write_all(b"\n")?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        *journal = file;

        tracing::info!(path = %self.path.display(), records = records.len(), "staging journal compacted");
        Ok(records.len())
    }

    fn append(journal: &mut File, record: &StagedRecord) -> StagingResult<()> {
        let mut entry = serde_json::to_vec(record)?;
        entry.push(b'\n');
        let len = journal.metadata()?.len();
        if let Err(e) = journal.write_all(&entry) {
            tracing::error!(transaction_id = %record.id(), error = %e, "staging journal append failed");
            // A partial entry would corrupt every later one.
            if let Err(trim) = journal.set_len(len) {
                tracing::warn!(error = %trim, "could not trim partial journal entry");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn persist(
        &self,
        transaction_id: &str,
        f: impl FnOnce(&mut StagedRecord) -> Option<bool>,
    ) -> StagingResult<bool> {
        let mut journal = self.journal.lock();
        self.memory
            .touch(transaction_id, f, |snapshot| Self::append(&mut journal, snapshot))
    }
}

/// Reads every snapshot in the journal.
///
/// Returns the snapshots in file order and the byte length of the readable
/// prefix.
fn replay(path: &Path) -> StagingResult<(Vec<StagedRecord>, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut snapshots = Vec::new();
    let mut valid_len = 0u64;
    let mut pending_error: Option<(usize, String)> = None;
    let mut line_no = 0usize;
    let mut buf = String::new();

    loop {
        buf.clear();
        let read = reader.read_line(&mut buf)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        if let Some((line, message)) = pending_error.take() {
            // A bad entry followed by more data is not a torn tail.
            return Err(StagingError::Corrupted { line, message });
        }

        let complete = buf.ends_with('\n');
        let text = buf.trim();
        if text.is_empty() {
            valid_len += read as u64;
            continue;
        }

        match serde_json::from_str::<StagedRecord>(text) {
            Ok(record) if complete => {
                snapshots.push(record);
                valid_len += read as u64;
            }
            Ok(_) => pending_error = Some((line_no, "missing line terminator".to_string())),
            Err(e) => pending_error = Some((line_no, e.to_string())),
        }
    }

    if let Some((line, message)) = pending_error {
        tracing::warn!(
            path = %path.display(),
            line,
            error = %message,
            "dropping torn trailing journal entry"
        );
    }

    Ok((snapshots, valid_len))
}

impl StagingStore for JournalStagingStore {
    fn upsert(&self, record: StagedRecord) -> StagingResult<UpsertOutcome> {
        let mut journal = self.journal.lock();
        self.memory
            .apply_upsert(record, |snapshot| Self::append(&mut journal, snapshot))
    }

    fn list_pending(&self, store: Option<&str>, limit: usize) -> Vec<StagedRecord> {
        self.memory.list_pending(store, limit)
    }

    fn get(&self, transaction_id: &str) -> Option<StagedRecord> {
        self.memory.get(transaction_id)
    }

    fn mark_synced(&self, transaction_id: &str, pushed: &Fields) -> StagingResult<bool> {
        self.persist(transaction_id, |r| set_synced(r, pushed))
    }

    fn mark_line_synced(
        &self,
        transaction_id: &str,
        line_num: i64,
        pushed: &Fields,
    ) -> StagingResult<bool> {
        self.persist(transaction_id, |r| set_line_synced(r, line_num, pushed))
    }

    fn record_attempt(&self, transaction_id: &str, at: DateTime<Utc>) -> StagingResult<bool> {
        self.persist(transaction_id, |r| set_attempt(r, at))
    }

    fn record_line_attempt(
        &self,
        transaction_id: &str,
        line_num: i64,
        at: DateTime<Utc>,
    ) -> StagingResult<bool> {
        self.persist(transaction_id, |r| set_line_attempt(r, line_num, at))
    }

    fn assign_z_report(&self, store: &str, z_report_id: &str) -> StagingResult<usize> {
        let mut journal = self.journal.lock();
        self.memory
            .apply_z_report(store, z_report_id, |snapshot| Self::append(&mut journal, snapshot))
    }

    fn stats(&self) -> StagingStats {
        self.memory.stats()
    }
}

//! Pending command implementation.

use possync_staging::{JournalStagingStore, StagingStore};
use serde_json::json;
use std::path::Path;

/// Lists staged records still waiting for the upstream.
pub fn run(
    path: &Path,
    store: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Journal not found: {}", path.display()).into());
    }
    let journal = JournalStagingStore::open(path)?;
    let records = journal.list_pending(store, limit.max(1));
    let stats = journal.stats();

    match format {
        "json" => {
            let rows: Vec<_> = records
                .iter()
                .map(|r| {
                    json!({
                        "transactionId": r.transaction.transaction_id,
                        "store": r.transaction.store,
                        "syncState": r.transaction.sync_state,
                        "pendingLines": r.pending_lines().count(),
                        "createdAt": r.transaction.created_at,
                        "lastSyncAttempt": r.transaction.last_sync_attempt,
                    })
                })
                .collect();
            let out = json!({ "stats": stats, "transactions": rows });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "text" => {
            println!("Staging journal: {}", path.display());
            println!(
                "  Transactions: {}  Pending: {}  Pending lines: {}",
                stats.transactions, stats.pending_transactions, stats.pending_lines
            );
            println!();
            if records.is_empty() {
                println!("Nothing pending");
            }
            for record in &records {
                let tx = &record.transaction;
                let attempt = tx
                    .last_sync_attempt
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "  {:<24} {:<8} lines pending: {:<3} created: {}  last attempt: {}",
                    tx.transaction_id,
                    format!("{:?}", tx.sync_state),
                    record.pending_lines().count(),
                    tx.created_at.to_rfc3339(),
                    attempt
                );
            }
        }
        other => return Err(format!("Unknown format: {other}").into()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_journal_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("absent.jsonl"), None, 10, "text").unwrap_err();
        assert!(err.to_string().contains("Journal not found"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staging.jsonl");
        JournalStagingStore::open(&path)
            .unwrap()
            .upsert(possync_testkit::staged("lapaz", "1", &[1]))
            .unwrap();

        assert!(run(&path, Some("lapaz"), 10, "json").is_ok());
        assert!(run(&path, None, 10, "yaml").is_err());
    }
}

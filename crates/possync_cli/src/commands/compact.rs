//! Compact command implementation.

use possync_staging::{JournalStagingStore, StagingStore};
use std::fs;
use std::path::Path;

/// Rewrites the staging journal to one line per record.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Journal not found: {}", path.display()).into());
    }

    println!("Compacting staging journal at {}", path.display());
    println!();

    let bytes_before = fs::metadata(path)?.len();
    let journal = JournalStagingStore::open(path)?;
    let records = journal.compact()?;
    let bytes_after = fs::metadata(path)?.len();
    let stats = journal.stats();

    println!("  Records:      {records}");
    println!("  Pending:      {}", stats.pending_transactions);
    println!("  Size before:  {bytes_before} bytes");
    println!("  Size after:   {bytes_after} bytes");
    println!(
        "  Space saved:  {} bytes",
        bytes_before.saturating_sub(bytes_after)
    );
    println!();
    println!("✓ Compaction complete");

    Ok(())
}

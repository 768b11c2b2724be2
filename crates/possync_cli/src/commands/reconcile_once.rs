//! Reconcile-once command implementation.

use super::{gateway, open_store, reconcile_config};
use crate::{ReconcileArgs, UpstreamArgs};
use possync_engine::{CycleReport, Reconciler, RecordOutcome};
use std::path::Path;

/// Runs one reconciliation cycle against the upstream and prints the report.
pub fn run(
    journal: Option<&Path>,
    upstream: &UpstreamArgs,
    reconcile: &ReconcileArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(journal)?;
    let reconciler = Reconciler::new(reconcile_config(reconcile, None), gateway(upstream), store);

    println!("Reconciling against {}", upstream.upstream_url);
    println!();

    let report = reconciler.run_cycle();
    print_report(&report);

    if report.failed() > 0 {
        return Err(format!("{} record(s) left pending", report.failed()).into());
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    if report.outcomes.is_empty() {
        println!("Nothing pending");
        return;
    }
    for outcome in &report.outcomes {
        println!("  {:<24} {}", outcome.transaction_id(), describe(outcome));
    }
    println!();
    println!(
        "Attempted: {}  Synced: {}  Failed: {}  ({} ms)",
        report.attempted(),
        report.synced(),
        report.failed(),
        report.duration_ms
    );
}

fn describe(outcome: &RecordOutcome) -> String {
    match outcome {
        RecordOutcome::AlreadySynced { .. } => "already upstream".into(),
        RecordOutcome::Pushed {
            lines_synced,
            lines_failed,
            ..
        } => format!("pushed ({lines_synced} lines, {lines_failed} failed)"),
        RecordOutcome::LinesRetried {
            lines_synced,
            lines_failed,
            ..
        } => format!("lines retried ({lines_synced} synced, {lines_failed} failed)"),
        RecordOutcome::Superseded { .. } => "changed while pushing, left pending".into(),
        RecordOutcome::CheckFailed { error, .. } => format!("check failed: {error}"),
        RecordOutcome::PushFailed { error, .. } => format!("push failed: {error}"),
        RecordOutcome::StagingFailed { error, .. } => format!("staging failed: {error}"),
        RecordOutcome::Skipped { .. } => "skipped (in flight)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_descriptions() {
        let pushed = RecordOutcome::Pushed {
            transaction_id: "LAPAZ1".into(),
            lines_synced: 2,
            lines_failed: 1,
        };
        assert_eq!(describe(&pushed), "pushed (2 lines, 1 failed)");

        let failed = RecordOutcome::CheckFailed {
            transaction_id: "LAPAZ1".into(),
            error: "operation timed out".into(),
        };
        assert_eq!(describe(&failed), "check failed: operation timed out");
    }
}

//! Reconciliation state machine.
//!
//! Each pending record walks through
//! `Pending → Checking → {AlreadySynced, Pushing} → {Synced, Failed}`.
//! Failures are isolated per record and per line: a record that fails stays
//! pending in the store and is picked up again by a later cycle.
//!
//! Only attempts in flight keep state in memory. Settled states are read
//! back from the store, so a resubmission that changes a synced record is
//! reported as pending again.

use crate::clock::{Clock, SystemClock};
use crate::config::ReconcileConfig;
use crate::error::SyncResult;
use crate::gateway::UpstreamGateway;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use possync_protocol::{StagedLineItem, StagedRecord};
use possync_staging::StagingStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Live reconciliation state of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileState {
    /// Waiting for a cycle.
    Pending,
    /// Asking the upstream whether the transaction exists.
    Checking,
    /// Creating the summary or its lines upstream.
    Pushing,
    /// The upstream already had the transaction; marking it synced.
    AlreadySynced,
    /// Summary and every line are confirmed.
    Synced,
    /// Something is still pending after an earlier attempt.
    Failed,
}

impl ReconcileState {
    /// Returns true while an attempt is running.
    pub fn is_active(&self) -> bool {
        matches!(self, ReconcileState::Checking | ReconcileState::Pushing)
    }
}

/// What one attempt did to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RecordOutcome {
    /// The upstream already had the transaction; it was marked synced
    /// without pushing.
    #[serde(rename_all = "camelCase")]
    AlreadySynced {
        /// Transaction id.
        transaction_id: String,
    },
    /// The summary was created upstream and its lines pushed.
    #[serde(rename_all = "camelCase")]
    Pushed {
        /// Transaction id.
        transaction_id: String,
        /// Lines confirmed in this attempt.
        lines_synced: usize,
        /// Lines that failed and stay pending.
        lines_failed: usize,
    },
    /// The summary was already synced; only pending lines were retried.
    #[serde(rename_all = "camelCase")]
    LinesRetried {
        /// Transaction id.
        transaction_id: String,
        /// Lines confirmed in this attempt.
        lines_synced: usize,
        /// Lines that failed and stay pending.
        lines_failed: usize,
    },
    /// The existence check failed.
    #[serde(rename_all = "camelCase")]
    CheckFailed {
        /// Transaction id.
        transaction_id: String,
        /// Failure message.
        error: String,
    },
    /// Creating the summary failed.
    #[serde(rename_all = "camelCase")]
    PushFailed {
        /// Transaction id.
        transaction_id: String,
        /// Failure message.
        error: String,
    },
    /// The record changed while its summary was being pushed. It stays
    /// pending so the next cycle sees the new fields.
    #[serde(rename_all = "camelCase")]
    Superseded {
        /// Transaction id.
        transaction_id: String,
        /// Lines confirmed in this attempt.
        lines_synced: usize,
        /// Lines that failed or changed and stay pending.
        lines_failed: usize,
    },
    /// The staging store could not record progress.
    #[serde(rename_all = "camelCase")]
    StagingFailed {
        /// Transaction id.
        transaction_id: String,
        /// Failure message.
        error: String,
    },
    /// Another attempt for the transaction was already in flight.
    #[serde(rename_all = "camelCase")]
    Skipped {
        /// Transaction id.
        transaction_id: String,
    },
}

impl RecordOutcome {
    /// Returns the transaction id.
    pub fn transaction_id(&self) -> &str {
        match self {
            RecordOutcome::AlreadySynced { transaction_id }
            | RecordOutcome::Pushed { transaction_id, .. }
            | RecordOutcome::LinesRetried { transaction_id, .. }
            | RecordOutcome::CheckFailed { transaction_id, .. }
            | RecordOutcome::PushFailed { transaction_id, .. }
            | RecordOutcome::Superseded { transaction_id, .. }
            | RecordOutcome::StagingFailed { transaction_id, .. }
            | RecordOutcome::Skipped { transaction_id } => transaction_id,
        }
    }

    /// Returns true if the record is fully synced after this attempt.
    pub fn is_synced(&self) -> bool {
        match self {
            RecordOutcome::AlreadySynced { .. } => true,
            RecordOutcome::Pushed { lines_failed, .. }
            | RecordOutcome::LinesRetried { lines_failed, .. } => *lines_failed == 0,
            _ => false,
        }
    }

    /// Returns true if the attempt failed outright or left lines pending.
    pub fn is_failure(&self) -> bool {
        !self.is_synced()
            && !matches!(
                self,
                RecordOutcome::Skipped { .. } | RecordOutcome::Superseded { .. }
            )
    }
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Wall time spent, in milliseconds.
    pub duration_ms: u64,
    /// One outcome per record taken, in batch order.
    pub outcomes: Vec<RecordOutcome>,
}

impl CycleReport {
    /// Returns the number of records taken.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns the number of records fully synced by this cycle.
    pub fn synced(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_synced()).count()
    }

    /// Returns the number of records left pending by a failure.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    /// Returns the outcome for a transaction.
    pub fn outcome_for(&self, transaction_id: &str) -> Option<&RecordOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.transaction_id() == transaction_id)
    }
}

/// Statistics accumulated across cycles and inline attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    /// Completed cycles.
    pub cycles: u64,
    /// Transactions confirmed synced.
    pub transactions_synced: u64,
    /// Lines pushed successfully.
    pub lines_synced: u64,
    /// Failed existence checks.
    pub check_failures: u64,
    /// Failed summary pushes.
    pub push_failures: u64,
    /// Failed line pushes.
    pub line_failures: u64,
    /// Start of the last completed cycle.
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Last failure message.
    pub last_error: Option<String>,
}

/// Drives pending staged records to the upstream.
pub struct Reconciler<G: UpstreamGateway + ?Sized, S: StagingStore + ?Sized> {
    config: ReconcileConfig,
    gateway: Arc<G>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cycle_lock: Mutex<()>,
    in_flight: Mutex<HashMap<String, ReconcileState>>,
    stats: RwLock<ReconcileStats>,
}

/// Removes a transaction from the in-flight map when dropped.
struct InFlight<'a> {
    map: &'a Mutex<HashMap<String, ReconcileState>>,
    transaction_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.lock().remove(&self.transaction_id);
    }
}

impl<G: UpstreamGateway + ?Sized, S: StagingStore + ?Sized> Reconciler<G, S> {
    /// Creates a reconciler on the system clock.
    pub fn new(config: ReconcileConfig, gateway: Arc<G>, store: Arc<S>) -> Self {
        Self::with_clock(config, gateway, store, Arc::new(SystemClock))
    }

    /// Creates a reconciler with an explicit clock.
    pub fn with_clock(
        config: ReconcileConfig,
        gateway: Arc<G>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            gateway,
            store,
            clock,
            cycle_lock: Mutex::new(()),
            in_flight: Mutex::new(HashMap::new()),
            stats: RwLock::new(ReconcileStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Returns the staging store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the gateway.
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Returns the accumulated statistics.
    pub fn stats(&self) -> ReconcileStats {
        self.stats.read().clone()
    }

    /// Returns true while a cycle is running.
    pub fn is_cycle_running(&self) -> bool {
        self.cycle_lock.is_locked()
    }

    /// Returns the state of a transaction.
    ///
    /// An attempt in flight reports its live state. Otherwise the state is
    /// read from the store: `Synced` once everything is confirmed, `Failed`
    /// while something is pending after an earlier attempt, else `Pending`.
    /// Unknown ids report `None`.
    pub fn state_of(&self, transaction_id: &str) -> Option<ReconcileState> {
        if let Some(state) = self.in_flight.lock().get(transaction_id) {
            return Some(*state);
        }
        self.store.get(transaction_id).map(|record| settled_state(&record))
    }

    /// Runs one cycle, waiting for a running cycle to finish first.
    pub fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle_lock.lock();
        self.cycle()
    }

    /// Runs one cycle unless one is already running.
    pub fn try_run_cycle(&self) -> Option<CycleReport> {
        let _cycle = self.cycle_lock.try_lock()?;
        Some(self.cycle())
    }

    /// Attempts a single transaction now.
    ///
    /// Returns `None` if the transaction is not staged. Reports `Skipped`
    /// if an attempt for it is already in flight.
    pub fn reconcile_transaction(&self, transaction_id: &str) -> Option<RecordOutcome> {
        let record = self.store.get(transaction_id)?;
        if record.is_fully_synced() {
            return Some(RecordOutcome::AlreadySynced {
                transaction_id: transaction_id.to_string(),
            });
        }
        Some(self.attempt(record))
    }

    fn cycle(&self) -> CycleReport {
        let started_at = self.clock.now();
        let start = Instant::now();

        let batch = self
            .store
            .list_pending(self.config.store_filter.as_deref(), self.config.batch_size);
        if !batch.is_empty() {
            info!(records = batch.len(), "reconciliation cycle started");
        }

        let outcomes = if self.config.concurrency <= 1 || batch.len() <= 1 {
            batch.into_iter().map(|record| self.attempt(record)).collect()
        } else {
            self.attempt_concurrently(batch)
        };

        let report = CycleReport {
            started_at,
            duration_ms: duration_ms(start.elapsed()),
            outcomes,
        };

        {
            let mut stats = self.stats.write();
            stats.cycles += 1;
            stats.last_cycle_at = Some(started_at);
        }

        if report.attempted() > 0 {
            info!(
                attempted = report.attempted(),
                synced = report.synced(),
                failed = report.failed(),
                duration_ms = report.duration_ms,
                "reconciliation cycle finished"
            );
        } else {
            debug!("reconciliation cycle found nothing pending");
        }
        report
    }

    /// Spreads a batch over scoped worker threads, preserving batch order in
    /// the result.
    fn attempt_concurrently(&self, batch: Vec<StagedRecord>) -> Vec<RecordOutcome> {
        let workers = self.config.concurrency.min(batch.len());
        let next = AtomicUsize::new(0);
        let batch = &batch;

        let mut indexed: Vec<(usize, RecordOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(record) = batch.get(index) else {
                                break;
                            };
                            done.push((index, self.attempt(record.clone())));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn claim(&self, transaction_id: &str) -> Option<InFlight<'_>> {
        let mut map = self.in_flight.lock();
        if map.contains_key(transaction_id) {
            return None;
        }
        map.insert(transaction_id.to_string(), ReconcileState::Pending);
        Some(InFlight {
            map: &self.in_flight,
            transaction_id: transaction_id.to_string(),
        })
    }

    fn attempt(&self, record: StagedRecord) -> RecordOutcome {
        let transaction_id = record.id().to_string();
        let Some(_claim) = self.claim(&transaction_id) else {
            debug!(transaction_id = %transaction_id, "attempt already in flight, skipping");
            return RecordOutcome::Skipped { transaction_id };
        };

        // The batch snapshot may be stale if another attempt finished first.
        let record = match self.store.get(&transaction_id) {
            Some(current) if current.is_fully_synced() => {
                debug!(transaction_id = %transaction_id, "synced by an earlier attempt, skipping");
                return RecordOutcome::Skipped { transaction_id };
            }
            Some(current) => current,
            None => record,
        };

        let outcome = match self.process(&record) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "staging store rejected reconcile progress");
                RecordOutcome::StagingFailed {
                    transaction_id,
                    error: e.to_string(),
                }
            }
        };
        self.account(&outcome);
        outcome
    }

    fn process(&self, record: &StagedRecord) -> SyncResult<RecordOutcome> {
        let id = record.id();
        let now = self.clock.now();

        if !record.transaction.sync_state.is_pending() {
            self.set_state(id, ReconcileState::Pushing);
            let (lines_synced, lines_failed) = self.push_lines(record, now)?;
            self.store.record_attempt(id, now)?;
            return Ok(RecordOutcome::LinesRetried {
                transaction_id: id.to_string(),
                lines_synced,
                lines_failed,
            });
        }

        self.set_state(id, ReconcileState::Checking);
        match self.gateway.exists(id) {
            Ok(true) => {
                self.set_state(id, ReconcileState::AlreadySynced);
                self.store.mark_synced(id, &record.transaction.fields)?;
                for line in record.pending_lines() {
                    self.store.mark_line_synced(id, line.line_num, &line.fields)?;
                }
                self.store.record_attempt(id, now)?;
                info!(transaction_id = %id, "transaction already upstream, marked synced");
                return Ok(RecordOutcome::AlreadySynced {
                    transaction_id: id.to_string(),
                });
            }
            Ok(false) => {}
            Err(e) => {
                warn!(transaction_id = %id, error = %e, retryable = e.is_retryable(), "existence check failed");
                self.store.record_attempt(id, now)?;
                return Ok(RecordOutcome::CheckFailed {
                    transaction_id: id.to_string(),
                    error: e.to_string(),
                });
            }
        }

        self.set_state(id, ReconcileState::Pushing);
        if let Err(e) = self.gateway.create_transaction(&record.transaction.payload()) {
            warn!(transaction_id = %id, error = %e, retryable = e.is_retryable(), "transaction push failed");
            self.store.record_attempt(id, now)?;
            return Ok(RecordOutcome::PushFailed {
                transaction_id: id.to_string(),
                error: e.to_string(),
            });
        }
        let confirmed = self.store.mark_synced(id, &record.transaction.fields)?;
        debug!(transaction_id = %id, confirmed, "transaction summary pushed");

        let (lines_synced, lines_failed) = self.push_lines(record, now)?;
        self.store.record_attempt(id, now)?;
        if !confirmed {
            info!(transaction_id = %id, "transaction changed while pushing, left pending");
            return Ok(RecordOutcome::Superseded {
                transaction_id: id.to_string(),
                lines_synced,
                lines_failed,
            });
        }
        info!(transaction_id = %id, lines_synced, lines_failed, "transaction pushed");
        Ok(RecordOutcome::Pushed {
            transaction_id: id.to_string(),
            lines_synced,
            lines_failed,
        })
    }

    /// Pushes pending lines one by one. A failed line is logged and left
    /// pending; the rest still go out.
    ///
    /// The attempt is recorded before the push, so a line that was sent
    /// but never confirmed is checked upstream before it is sent again.
    fn push_lines(&self, record: &StagedRecord, now: DateTime<Utc>) -> SyncResult<(usize, usize)> {
        let id = record.id();
        let (mut synced, mut failed) = (0, 0);
        for line in record.pending_lines() {
            self.store.record_line_attempt(id, line.line_num, now)?;
            match self.push_line(id, line) {
                Ok(()) => {
                    if self.store.mark_line_synced(id, line.line_num, &line.fields)? {
                        synced += 1;
                    } else {
                        debug!(transaction_id = %id, line_num = line.line_num, "line changed while pushing, left pending");
                        failed += 1;
                    }
                }
                Err(e) => {
                    warn!(transaction_id = %id, line_num = line.line_num, error = %e, "line push failed");
                    self.stats.write().last_error = Some(e.to_string());
                    failed += 1;
                }
            }
        }
        Ok((synced, failed))
    }

    fn push_line(&self, transaction_id: &str, line: &StagedLineItem) -> SyncResult<()> {
        if line.last_sync_attempt.is_some()
            && self.gateway.line_exists(transaction_id, line.line_num)?
        {
            debug!(transaction_id = %transaction_id, line_num = line.line_num, "line already upstream");
            return Ok(());
        }
        self.gateway.create_line(&line.payload())?;
        Ok(())
    }

    fn set_state(&self, transaction_id: &str, state: ReconcileState) {
        debug!(transaction_id = %transaction_id, state = ?state, "reconcile state");
        if let Some(current) = self.in_flight.lock().get_mut(transaction_id) {
            *current = state;
        }
    }

    fn account(&self, outcome: &RecordOutcome) {
        let mut stats = self.stats.write();
        match outcome {
            RecordOutcome::AlreadySynced { .. } => stats.transactions_synced += 1,
            RecordOutcome::Superseded {
                lines_synced,
                lines_failed,
                ..
            } => {
                stats.lines_synced += *lines_synced as u64;
                stats.line_failures += *lines_failed as u64;
            }
            RecordOutcome::Pushed {
                lines_synced,
                lines_failed,
                ..
            }
            | RecordOutcome::LinesRetried {
                lines_synced,
                lines_failed,
                ..
            } => {
                stats.lines_synced += *lines_synced as u64;
                stats.line_failures += *lines_failed as u64;
                if *lines_failed == 0 {
                    stats.transactions_synced += 1;
                }
            }
            RecordOutcome::CheckFailed { error, .. } => {
                stats.check_failures += 1;
                stats.last_error = Some(error.clone());
            }
            RecordOutcome::PushFailed { error, .. } | RecordOutcome::StagingFailed { error, .. } => {
                stats.push_failures += 1;
                stats.last_error = Some(error.clone());
            }
            RecordOutcome::Skipped { .. } => {}
        }
    }
}

fn settled_state(record: &StagedRecord) -> ReconcileState {
    if record.is_fully_synced() {
        ReconcileState::Synced
    } else if record.transaction.last_sync_attempt.is_some() {
        ReconcileState::Failed
    } else {
        ReconcileState::Pending
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::{GatewayCall, MockGateway};
    use chrono::TimeZone;
    use possync_protocol::{Submission, SyncState};
    use possync_staging::MemoryStagingStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(id: &str, lines: &[i64]) -> StagedRecord {
        let lines: Vec<_> = lines.iter().map(|n| json!({ "linenum": n })).collect();
        let body = json!({
            "transactionSummary": { "store": "lapaz", "transactionid": id, "receiptid": id },
            "transactionRecords": lines
        });
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        StagedRecord::from_submission(Submission::from_value(&body).unwrap(), at).unwrap()
    }

    fn setup(
        records: &[StagedRecord],
    ) -> (
        Reconciler<MockGateway, MemoryStagingStore>,
        Arc<MockGateway>,
        Arc<MemoryStagingStore>,
    ) {
        let gateway = Arc::new(MockGateway::new());
        let store = Arc::new(MemoryStagingStore::new());
        for r in records {
            store.upsert(r.clone()).unwrap();
        }
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap(),
        ));
        let reconciler = Reconciler::with_clock(
            ReconcileConfig::default(),
            Arc::clone(&gateway),
            Arc::clone(&store),
            clock,
        );
        (reconciler, gateway, store)
    }

    #[test]
    fn state_checks() {
        assert!(ReconcileState::Checking.is_active());
        assert!(ReconcileState::Pushing.is_active());
        assert!(!ReconcileState::Synced.is_active());
    }

    #[test]
    fn pushes_summary_then_lines() {
        let (reconciler, gateway, store) = setup(&[record("1", &[1, 2])]);

        let report = reconciler.run_cycle();

        assert_eq!(
            report.outcomes,
            vec![RecordOutcome::Pushed {
                transaction_id: "LAPAZ1".into(),
                lines_synced: 2,
                lines_failed: 0,
            }]
        );
        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::Exists("LAPAZ1".into()),
                GatewayCall::CreateTransaction("LAPAZ1".into()),
                GatewayCall::CreateLine("LAPAZ1".into(), 1),
                GatewayCall::CreateLine("LAPAZ1".into(), 2),
            ]
        );
        let staged = store.get("LAPAZ1").unwrap();
        assert!(staged.is_fully_synced());
        assert!(staged.transaction.last_sync_attempt.is_some());
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Synced));
    }

    #[test]
    fn check_failure_leaves_record_pending() {
        let (reconciler, gateway, store) = setup(&[record("1", &[1])]);
        gateway.fail_check("LAPAZ1");

        let report = reconciler.run_cycle();

        assert!(matches!(report.outcomes[0], RecordOutcome::CheckFailed { .. }));
        assert_eq!(gateway.count(&GatewayCall::CreateTransaction("LAPAZ1".into())), 0);
        let staged = store.get("LAPAZ1").unwrap();
        assert_eq!(staged.transaction.sync_state, SyncState::Pending);
        assert!(staged.transaction.last_sync_attempt.is_some());
        assert_eq!(reconciler.stats().check_failures, 1);
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Failed));
    }

    #[test]
    fn changed_resubmission_is_no_longer_synced() {
        let (reconciler, _gateway, store) = setup(&[record("1", &[1])]);
        reconciler.run_cycle();
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Synced));
        assert!(reconciler.in_flight.lock().is_empty());

        let mut changed = record("1", &[1]);
        changed
            .transaction
            .fields
            .insert("netamount".to_string(), json!("99.00"));
        store.upsert(changed).unwrap();

        // Pending again, with an attempt already on record.
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Failed));
        assert_eq!(reconciler.state_of("NOPE"), None);
    }

    #[test]
    fn live_state_only_while_in_flight() {
        let (reconciler, _gateway, _store) = setup(&[record("1", &[1])]);
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Pending));

        let claim = reconciler.claim("LAPAZ1").unwrap();
        reconciler.set_state("LAPAZ1", ReconcileState::Checking);
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Checking));

        drop(claim);
        assert_eq!(reconciler.state_of("LAPAZ1"), Some(ReconcileState::Pending));
    }

    #[test]
    fn push_failure_isolated_from_batch() {
        let (reconciler, gateway, store) = setup(&[record("1", &[1]), record("2", &[1])]);
        gateway.fail_transaction("LAPAZ1");

        let report = reconciler.run_cycle();

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.synced(), 1);
        assert!(store.get("LAPAZ1").unwrap().has_pending());
        assert!(store.get("LAPAZ2").unwrap().is_fully_synced());
    }

    #[test]
    fn skipped_while_in_flight() {
        let (reconciler, _gateway, _store) = setup(&[record("1", &[1])]);
        let _claim = reconciler.claim("LAPAZ1").unwrap();

        assert_eq!(
            reconciler.reconcile_transaction("LAPAZ1"),
            Some(RecordOutcome::Skipped {
                transaction_id: "LAPAZ1".into()
            })
        );
        assert_eq!(reconciler.reconcile_transaction("NOPE"), None);
    }

    #[test]
    fn overlapping_cycle_refused() {
        let (reconciler, _gateway, _store) = setup(&[]);
        let _running = reconciler.cycle_lock.lock();
        assert!(reconciler.is_cycle_running());
        assert!(reconciler.try_run_cycle().is_none());
    }

    #[test]
    fn outcome_serializes_tagged() {
        let outcome = RecordOutcome::Pushed {
            transaction_id: "T".into(),
            lines_synced: 1,
            lines_failed: 0,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({ "outcome": "pushed", "transactionId": "T", "linesSynced": 1, "linesFailed": 0 })
        );
    }

    proptest! {
        #[test]
        fn failed_lines_are_pushed_again_and_only_they(
            failing in prop::collection::btree_set(1i64..6, 0..5),
        ) {
            let (reconciler, gateway, store) = setup(&[record("1", &[1, 2, 3, 4, 5])]);
            for line in &failing {
                gateway.fail_line("LAPAZ1", *line);
            }

            reconciler.run_cycle();
            gateway.heal();
            reconciler.run_cycle();

            prop_assert!(store.get("LAPAZ1").unwrap().is_fully_synced());
            for line in 1..=5 {
                let pushes = gateway.count(&GatewayCall::CreateLine("LAPAZ1".into(), line));
                let expected = if failing.contains(&line) { 2 } else { 1 };
                prop_assert_eq!(pushes, expected);
            }
            prop_assert_eq!(
                gateway.count(&GatewayCall::CreateTransaction("LAPAZ1".into())),
                1
            );
        }
    }
}

//! Request handlers for terminal endpoints.
//!
//! Handlers are synchronous: they may block on the staging store and on
//! upstream calls. The HTTP layer runs them on the blocking pool.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, SecondsFormat, Utc};
use possync_engine::{
    Clock, CycleReport, ReconcileState, Reconciler, RecordOutcome, SystemClock, UpstreamGateway,
};
use possync_protocol::{RefundRequest, StagedRecord, Submission, SyncState};
use possync_staging::{StagingStats, StagingStore, UpsertOutcome};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The reconciler shape the server works with.
pub type SharedReconciler = Reconciler<dyn UpstreamGateway, dyn StagingStore>;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Reconciler shared with the scheduler; also owns the store and gateway.
    pub reconciler: Arc<SharedReconciler>,
    clock: Arc<dyn Clock>,
}

impl HandlerContext {
    /// Creates a new handler context on the system clock.
    pub fn new(config: ServerConfig, reconciler: Arc<SharedReconciler>) -> Self {
        Self::with_clock(config, reconciler, Arc::new(SystemClock))
    }

    /// Creates a handler context with an explicit clock.
    pub fn with_clock(
        config: ServerConfig,
        reconciler: Arc<SharedReconciler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            reconciler,
            clock,
        }
    }

    /// Returns the staging store.
    pub fn store(&self) -> &Arc<dyn StagingStore> {
        self.reconciler.store()
    }

    /// Returns the upstream gateway.
    pub fn gateway(&self) -> &Arc<dyn UpstreamGateway> {
        self.reconciler.gateway()
    }
}

/// Answer to a staged submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Human-readable result.
    pub message: String,
    /// Upper-cased store code.
    pub store: String,
    /// Store-prefixed transaction id.
    pub transaction_id: String,
    /// Store-prefixed receipt id.
    pub receipt_id: String,
    /// Lines staged after deduplication.
    pub lines: usize,
    /// What the upsert did.
    pub outcome: UpsertOutcome,
    /// Summary state after staging.
    pub sync_state: SyncState,
}

/// Sync state of one staged line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineStatus {
    /// Line number.
    pub line_num: i64,
    /// Upstream state.
    pub sync_state: SyncState,
    /// Last push attempt.
    pub last_sync_attempt: Option<DateTime<Utc>>,
}

/// Sync state of a staged transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Store-prefixed transaction id.
    pub transaction_id: String,
    /// Store-prefixed receipt id.
    pub receipt_id: String,
    /// Upper-cased store code.
    pub store: String,
    /// Summary state.
    pub sync_state: SyncState,
    /// True once the summary and every line are synced.
    pub fully_synced: bool,
    /// Last attempt on the summary.
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// When the transaction was first staged.
    pub created_at: DateTime<Utc>,
    /// Live reconciler state.
    pub reconcile_state: Option<ReconcileState>,
    /// Per-line states.
    pub lines: Vec<LineStatus>,
}

impl StatusResponse {
    fn new(record: &StagedRecord, reconcile_state: Option<ReconcileState>) -> Self {
        let tx = &record.transaction;
        Self {
            transaction_id: tx.transaction_id.clone(),
            receipt_id: tx.receipt_id.clone(),
            store: tx.store.clone(),
            sync_state: tx.sync_state,
            fully_synced: record.is_fully_synced(),
            last_sync_attempt: tx.last_sync_attempt,
            created_at: tx.created_at,
            reconcile_state,
            lines: record
                .lines
                .iter()
                .map(|line| LineStatus {
                    line_num: line.line_num,
                    sync_state: line.sync_state,
                    last_sync_attempt: line.last_sync_attempt,
                })
                .collect(),
        }
    }
}

/// One entry of the pending listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Store-prefixed transaction id.
    pub transaction_id: String,
    /// Store-prefixed receipt id.
    pub receipt_id: String,
    /// Upper-cased store code.
    pub store: String,
    /// Summary state.
    pub sync_state: SyncState,
    /// Lines still pending.
    pub pending_lines: usize,
    /// When the transaction was first staged.
    pub created_at: DateTime<Utc>,
    /// Last attempt on the summary.
    pub last_sync_attempt: Option<DateTime<Utc>>,
}

/// Pending records, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResponse {
    /// Entries returned.
    pub count: usize,
    /// Store-wide counters.
    pub stats: StagingStats,
    /// The pending records.
    pub transactions: Vec<PendingTransaction>,
}

/// Answer to a forwarded refund.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    /// Human-readable result.
    pub message: String,
    /// Upper-cased store code.
    pub store: String,
    /// Generated refund receipt id.
    pub refund_receipt_id: String,
    /// Amended transaction.
    pub transaction_id: String,
    /// Refund totals as fixed-point strings.
    pub summary: Value,
    /// Upstream echo of the summary amendment.
    pub transaction_response: Value,
    /// Upstream echo per amended line.
    pub items_response: Vec<Value>,
}

/// Answer to a Z-report assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZReportResponse {
    /// Always true; upstream failures degrade to a local-only assignment.
    pub success: bool,
    /// Human-readable result.
    pub message: String,
    /// Upper-cased store code.
    pub store_id: String,
    /// Assigned Z-report id.
    pub z_report_id: String,
    /// Staged transactions that received the id.
    pub updated_locally: usize,
    /// True when the upstream could not be updated.
    pub local_only: bool,
    /// Upstream echo, when the upstream accepted the assignment.
    pub upstream: Option<Value>,
    /// When the assignment was made.
    pub timestamp: DateTime<Utc>,
}

/// Handler for terminal requests.
#[derive(Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Returns the welcome body for `GET /`.
    pub fn welcome(&self) -> Value {
        json!({ "message": "Welcome to the POS sync middleware" })
    }

    /// Returns the server clock.
    pub fn server_time(&self) -> Value {
        let now = self.context.clock.now();
        json!({
            "datetime": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "timezone": "UTC",
        })
    }

    /// Canonicalizes, validates and stages a terminal submission.
    ///
    /// Never talks to the upstream.
    pub fn handle_submit(&self, body: &Value) -> ServerResult<SubmitResponse> {
        let submission = Submission::from_value(body)?;
        let record = StagedRecord::from_submission(submission, self.context.clock.now())?;

        let store = record.transaction.store.clone();
        let transaction_id = record.transaction.transaction_id.clone();
        let receipt_id = record.transaction.receipt_id.clone();
        let lines = record.lines.len();

        let outcome = self.context.store().upsert(record)?;
        let sync_state = self
            .context
            .store()
            .get(&transaction_id)
            .map(|r| r.transaction.sync_state)
            .unwrap_or(SyncState::Pending);

        info!(
            transaction_id = %transaction_id,
            lines,
            outcome = ?outcome,
            "transaction staged"
        );

        Ok(SubmitResponse {
            message: "Transaction staged for sync".into(),
            store,
            transaction_id,
            receipt_id,
            lines,
            outcome,
            sync_state,
        })
    }

    /// Attempts one staged transaction right away.
    ///
    /// Used after a submission when inline sync is on. Failures stay in the
    /// store for the next cycle.
    pub fn reconcile_inline(&self, transaction_id: &str) -> Option<RecordOutcome> {
        let outcome = self.context.reconciler.reconcile_transaction(transaction_id);
        debug!(transaction_id = %transaction_id, outcome = ?outcome, "inline reconcile finished");
        outcome
    }

    /// Reports the sync state of a staged transaction.
    pub fn handle_status(&self, transaction_id: &str) -> ServerResult<StatusResponse> {
        let record = self
            .context
            .store()
            .get(transaction_id)
            .ok_or_else(|| ServerError::NotFound(format!("transaction {transaction_id}")))?;
        let state = self.context.reconciler.state_of(transaction_id);
        Ok(StatusResponse::new(&record, state))
    }

    /// Lists pending records, oldest first.
    ///
    /// `limit` is clamped to the configured listing bound.
    pub fn handle_pending(
        &self,
        store: Option<&str>,
        limit: Option<usize>,
    ) -> ServerResult<PendingResponse> {
        let bound = self.context.config.pending_list_limit.max(1);
        let limit = limit.unwrap_or(bound).clamp(1, bound);
        let store = store.map(str::trim).filter(|s| !s.is_empty());

        let transactions: Vec<PendingTransaction> = self
            .context
            .store()
            .list_pending(store, limit)
            .into_iter()
            .map(|record| PendingTransaction {
                pending_lines: record.pending_lines().count(),
                transaction_id: record.transaction.transaction_id,
                receipt_id: record.transaction.receipt_id,
                store: record.transaction.store,
                sync_state: record.transaction.sync_state,
                created_at: record.transaction.created_at,
                last_sync_attempt: record.transaction.last_sync_attempt,
            })
            .collect();

        Ok(PendingResponse {
            count: transactions.len(),
            stats: self.context.store().stats(),
            transactions,
        })
    }

    /// Runs one reconciliation cycle now.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Conflict`] if a cycle is already running.
    pub fn handle_reconcile(&self) -> ServerResult<CycleReport> {
        let report = self
            .context
            .reconciler
            .try_run_cycle()
            .ok_or_else(|| ServerError::Conflict("a reconciliation cycle is already running".into()))?;
        info!(
            attempted = report.attempted(),
            synced = report.synced(),
            failed = report.failed(),
            "manual reconciliation finished"
        );
        Ok(report)
    }

    /// Amends an upstream transaction and its lines for a refund.
    ///
    /// Refunds are forwarded, not staged: the summary is amended first, then
    /// each refunded line in request order. The first upstream failure aborts
    /// the remaining writes.
    pub fn handle_refund(
        &self,
        store_id: &str,
        count: &str,
        body: &Value,
    ) -> ServerResult<RefundResponse> {
        let request = RefundRequest::from_value(body)?;
        let plan = request.plan(store_id, count, self.context.clock.now())?;
        let gateway = self.context.gateway();

        let transaction_response = gateway
            .update_transaction(&plan.transaction_id, &Value::Object(plan.transaction_patch.clone()))
            .inspect_err(|e| {
                warn!(transaction_id = %plan.transaction_id, error = %e, "refund summary update failed");
            })?;

        let mut items_response = Vec::with_capacity(plan.line_patches.len());
        for (line_num, patch) in &plan.line_patches {
            let echo = gateway
                .update_line(&plan.transaction_id, *line_num, &Value::Object(patch.clone()))
                .inspect_err(|e| {
                    warn!(
                        transaction_id = %plan.transaction_id,
                        line_num,
                        error = %e,
                        "refund line update failed"
                    );
                })?;
            items_response.push(echo);
        }

        info!(
            transaction_id = %plan.transaction_id,
            receipt_id = %plan.receipt_id,
            lines = items_response.len(),
            "refund processed"
        );

        Ok(RefundResponse {
            message: "Refund processed successfully".into(),
            store: plan.store,
            refund_receipt_id: plan.receipt_id,
            transaction_id: plan.transaction_id,
            summary: plan.totals.to_value(),
            transaction_response,
            items_response,
        })
    }

    /// Assigns a Z-report id to a store's unassigned transactions.
    ///
    /// The staging store is updated first; the upstream is then told on a
    /// best-effort basis. An upstream failure is reported as `localOnly`.
    pub fn handle_z_report(&self, store_id: &str, z_report_id: &str) -> ServerResult<ZReportResponse> {
        let store = store_id.trim().to_uppercase();
        let z_report_id = z_report_id.trim();
        if store.is_empty() {
            return Err(ServerError::InvalidRequest("storeId is required".into()));
        }
        if z_report_id.is_empty() {
            return Err(ServerError::InvalidRequest("zReportId is required".into()));
        }

        let updated_locally = self.context.store().assign_z_report(&store, z_report_id)?;
        let upstream = match self.context.gateway().assign_z_report(&store, z_report_id) {
            Ok(echo) => Some(echo),
            Err(e) => {
                warn!(store = %store, z_report_id, error = %e, "upstream z-report update failed");
                None
            }
        };
        let local_only = upstream.is_none();

        info!(store = %store, z_report_id, updated_locally, local_only, "z-report assigned");

        Ok(ZReportResponse {
            success: true,
            message: if local_only {
                "Transactions updated locally with Z-Report ID, will sync to server later".into()
            } else {
                "Transactions updated with Z-Report ID successfully".into()
            },
            store_id: store,
            z_report_id: z_report_id.to_string(),
            updated_locally,
            local_only,
            upstream,
            timestamp: self.context.clock.now(),
        })
    }
}

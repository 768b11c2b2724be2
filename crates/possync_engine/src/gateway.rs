//! Upstream gateway abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

/// The upstream record API.
///
/// This trait abstracts the network layer so the reconciler can run
/// against HTTP in production and a scripted mock in tests. Every method
/// blocks until the upstream answers or the call times out.
pub trait UpstreamGateway: Send + Sync {
    /// Asks whether a transaction is already recorded upstream.
    ///
    /// A 404 is an expected answer and yields `Ok(false)`.
    fn exists(&self, transaction_id: &str) -> SyncResult<bool>;

    /// Asks whether one line item is already recorded upstream.
    ///
    /// Same answers as [`UpstreamGateway::exists`].
    fn line_exists(&self, transaction_id: &str, line_num: i64) -> SyncResult<bool>;

    /// Creates a transaction summary. Returns the upstream's echo.
    fn create_transaction(&self, payload: &Value) -> SyncResult<Value>;

    /// Creates one line item. Returns the upstream's echo.
    fn create_line(&self, payload: &Value) -> SyncResult<Value>;

    /// Amends an existing transaction summary.
    fn update_transaction(&self, transaction_id: &str, patch: &Value) -> SyncResult<Value>;

    /// Amends an existing line item.
    fn update_line(&self, transaction_id: &str, line_num: i64, patch: &Value) -> SyncResult<Value>;

    /// Assigns a Z-report id to the store's unassigned upstream transactions.
    fn assign_z_report(&self, store: &str, z_report_id: &str) -> SyncResult<Value>;
}

/// A call observed by [`MockGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GatewayCall {
    /// `exists(id)`.
    Exists(String),
    /// `line_exists(id, line)`.
    LineExists(String, i64),
    /// `create_transaction` for the given id.
    CreateTransaction(String),
    /// `create_line` for the given id and line.
    CreateLine(String, i64),
    /// `update_transaction(id)`.
    UpdateTransaction(String),
    /// `update_line(id, line)`.
    UpdateLine(String, i64),
    /// `assign_z_report(store, z)`.
    AssignZReport(String, String),
}

/// A scripted upstream for testing.
///
/// Behaves like a real upstream by default: created transactions and lines
/// are reported as existing afterwards. Failures are scripted per
/// transaction or per line, and every call is recorded.
#[derive(Debug, Default)]
pub struct MockGateway {
    existing: Mutex<HashSet<String>>,
    failing_checks: Mutex<HashSet<String>>,
    failing_transactions: Mutex<HashSet<String>>,
    failing_lines: Mutex<HashSet<(String, i64)>>,
    lines: Mutex<HashSet<(String, i64)>>,
    unacknowledged_lines: Mutex<HashSet<(String, i64)>>,
    offline: Mutex<bool>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MockGateway {
    /// Creates a mock upstream with no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a transaction as already present upstream.
    pub fn set_existing(&self, transaction_id: &str) {
        self.existing.lock().insert(transaction_id.to_string());
    }

    /// Makes `exists` fail for a transaction.
    pub fn fail_check(&self, transaction_id: &str) {
        self.failing_checks.lock().insert(transaction_id.to_string());
    }

    /// Makes `create_transaction` fail for a transaction.
    pub fn fail_transaction(&self, transaction_id: &str) {
        self.failing_transactions
            .lock()
            .insert(transaction_id.to_string());
    }

    /// Makes `create_line` fail for one line.
    pub fn fail_line(&self, transaction_id: &str, line_num: i64) {
        self.failing_lines
            .lock()
            .insert((transaction_id.to_string(), line_num));
    }

    /// Makes `create_line` store the line but time out before answering.
    pub fn drop_line_ack(&self, transaction_id: &str, line_num: i64) {
        self.unacknowledged_lines
            .lock()
            .insert((transaction_id.to_string(), line_num));
    }

    /// Clears every scripted failure.
    pub fn heal(&self) {
        self.failing_checks.lock().clear();
        self.failing_transactions.lock().clear();
        self.failing_lines.lock().clear();
        self.unacknowledged_lines.lock().clear();
        *self.offline.lock() = false;
    }

    /// Makes every call fail with a retryable transport error.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    /// Delays every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Counts calls equal to `call`.
    pub fn count(&self, call: &GatewayCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn enter(&self, call: GatewayCall) -> SyncResult<()> {
        self.calls.lock().push(call);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if *self.offline.lock() {
            return Err(SyncError::transport_retryable("connection refused"));
        }
        Ok(())
    }
}

fn payload_id(payload: &Value) -> String {
    payload
        .get("transactionid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn payload_line(payload: &Value) -> i64 {
    payload.get("linenum").and_then(Value::as_i64).unwrap_or_default()
}

impl UpstreamGateway for MockGateway {
    fn exists(&self, transaction_id: &str) -> SyncResult<bool> {
        self.enter(GatewayCall::Exists(transaction_id.to_string()))?;
        if self.failing_checks.lock().contains(transaction_id) {
            return Err(SyncError::transport_retryable("mock check failure"));
        }
        Ok(self.existing.lock().contains(transaction_id))
    }

    fn line_exists(&self, transaction_id: &str, line_num: i64) -> SyncResult<bool> {
        self.enter(GatewayCall::LineExists(transaction_id.to_string(), line_num))?;
        Ok(self
            .lines
            .lock()
            .contains(&(transaction_id.to_string(), line_num)))
    }

    fn create_transaction(&self, payload: &Value) -> SyncResult<Value> {
        let id = payload_id(payload);
        self.enter(GatewayCall::CreateTransaction(id.clone()))?;
        if self.failing_transactions.lock().contains(&id) {
            return Err(SyncError::upstream(500, "mock transaction failure"));
        }
        self.existing.lock().insert(id);
        Ok(payload.clone())
    }

    fn create_line(&self, payload: &Value) -> SyncResult<Value> {
        let key = (payload_id(payload), payload_line(payload));
        self.enter(GatewayCall::CreateLine(key.0.clone(), key.1))?;
        if self.failing_lines.lock().contains(&key) {
            return Err(SyncError::upstream(500, "mock line failure"));
        }
        self.lines.lock().insert(key.clone());
        if self.unacknowledged_lines.lock().contains(&key) {
            return Err(SyncError::Timeout);
        }
        Ok(payload.clone())
    }

    fn update_transaction(&self, transaction_id: &str, patch: &Value) -> SyncResult<Value> {
        self.enter(GatewayCall::UpdateTransaction(transaction_id.to_string()))?;
        if !self.existing.lock().contains(transaction_id) {
            return Err(SyncError::upstream(404, "transaction not found"));
        }
        Ok(patch.clone())
    }

    fn update_line(&self, transaction_id: &str, line_num: i64, patch: &Value) -> SyncResult<Value> {
        self.enter(GatewayCall::UpdateLine(transaction_id.to_string(), line_num))?;
        if self
            .failing_lines
            .lock()
            .contains(&(transaction_id.to_string(), line_num))
        {
            return Err(SyncError::upstream(500, "mock line failure"));
        }
        Ok(patch.clone())
    }

    fn assign_z_report(&self, store: &str, z_report_id: &str) -> SyncResult<Value> {
        self.enter(GatewayCall::AssignZReport(
            store.to_string(),
            z_report_id.to_string(),
        ))?;
        Ok(json!({ "message": "Z-report assigned", "store": store, "zReportId": z_report_id }))
    }
}

//! Canonical staged records.

use crate::decimal::{is_empty, value_to_text};
use crate::error::{ValidationError, ValidationResult};
use crate::filter::{self, line_number};
use crate::schema::{Projection, LINE_SCHEMA, SUMMARY_SCHEMA};
use crate::submission::{Fields, Submission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream synchronization state of a staged summary or line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// Not yet confirmed upstream.
    Pending,
    /// Confirmed upstream.
    Synced,
}

impl SyncState {
    /// Returns true for [`SyncState::Pending`].
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncState::Pending)
    }
}

/// A transaction summary staged locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedTransaction {
    /// Store prefix + terminal-local transaction id.
    pub transaction_id: String,
    /// Store prefix + terminal-local receipt id.
    pub receipt_id: String,
    /// Upper-cased store code.
    pub store: String,
    /// Canonical summary fields, identity fields included.
    pub fields: Fields,
    /// Summary sync state.
    pub sync_state: SyncState,
    /// Last time the reconciler touched this record.
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// First staging time.
    pub created_at: DateTime<Utc>,
    /// Insertion sequence, assigned by the store.
    #[serde(default)]
    pub seq: u64,
}

impl StagedTransaction {
    /// Returns the upstream request body for this summary.
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Returns the Z-report id, if one is assigned.
    pub fn z_report_id(&self) -> Option<&str> {
        self.fields
            .get("zReportid")
            .filter(|v| !is_empty(Some(*v)))
            .and_then(Value::as_str)
    }
}

/// A line item staged locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedLineItem {
    /// Owning transaction.
    pub transaction_id: String,
    /// Line number, unique within the transaction.
    pub line_num: i64,
    /// Canonical line fields, identity fields included.
    pub fields: Fields,
    /// Line sync state.
    pub sync_state: SyncState,
    /// Last time the reconciler tried to push this line.
    pub last_sync_attempt: Option<DateTime<Utc>>,
}

impl StagedLineItem {
    /// Returns the upstream request body for this line.
    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// A staged transaction together with its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRecord {
    /// The summary.
    pub transaction: StagedTransaction,
    /// Lines in first-submission order.
    pub lines: Vec<StagedLineItem>,
}

impl StagedRecord {
    /// Canonicalizes and validates a terminal submission.
    ///
    /// Runs the deduplication filter, checks the identity fields, projects
    /// the summary and every line onto their canonical schemas and prefixes
    /// ids with the upper-cased store code. The result is Pending with no
    /// sync attempts.
    pub fn from_submission(submission: Submission, now: DateTime<Utc>) -> ValidationResult<Self> {
        let submission = filter::canonicalize(submission);
        let raw = &submission.summary;

        let store = required_text(raw, "store")?.to_uppercase();
        let transaction_id = format!("{store}{}", required_text(raw, "transactionid")?);
        let receipt_id = format!("{store}{}", required_text(raw, "receiptid")?);

        if submission.lines.is_empty() {
            return Err(ValidationError::EmptyRecords);
        }

        let mut summary = Projection {
            now,
            parent: None,
            path: "transactionSummary",
        }
        .apply(raw, SUMMARY_SCHEMA)?;
        insert_identity(&mut summary, &transaction_id, &receipt_id, &store);

        let mut lines = Vec::with_capacity(submission.lines.len());
        for (index, raw_line) in submission.lines.iter().enumerate() {
            let line_num = line_number(raw_line)
                .ok_or(ValidationError::InvalidLineNumber { index })?;
            let path = format!("transactionRecords[{index}]");
            let mut fields = Projection {
                now,
                parent: Some(&summary),
                path: &path,
            }
            .apply(raw_line, LINE_SCHEMA)?;
            insert_identity(&mut fields, &transaction_id, &receipt_id, &store);
            fields.insert(filter::LINE_NUMBER_FIELD.into(), Value::from(line_num));

            lines.push(StagedLineItem {
                transaction_id: transaction_id.clone(),
                line_num,
                fields,
                sync_state: SyncState::Pending,
                last_sync_attempt: None,
            });
        }

        Ok(Self {
            transaction: StagedTransaction {
                transaction_id,
                receipt_id,
                store,
                fields: summary,
                sync_state: SyncState::Pending,
                last_sync_attempt: None,
                created_at: now,
                seq: 0,
            },
            lines,
        })
    }

    /// Returns the transaction id.
    pub fn id(&self) -> &str {
        &self.transaction.transaction_id
    }

    /// Returns the line with the given number.
    pub fn line(&self, line_num: i64) -> Option<&StagedLineItem> {
        self.lines.iter().find(|l| l.line_num == line_num)
    }

    /// Returns the lines still waiting for upstream confirmation.
    pub fn pending_lines(&self) -> impl Iterator<Item = &StagedLineItem> {
        self.lines.iter().filter(|l| l.sync_state.is_pending())
    }

    /// Returns true if the summary or any line is still pending.
    pub fn has_pending(&self) -> bool {
        self.transaction.sync_state.is_pending() || self.pending_lines().next().is_some()
    }

    /// Returns true once the summary and every line are synced.
    pub fn is_fully_synced(&self) -> bool {
        !self.has_pending()
    }
}

fn required_text(fields: &Fields, key: &str) -> ValidationResult<String> {
    fields
        .get(key)
        .filter(|v| !is_empty(Some(*v)))
        .map(|v| value_to_text(v).trim().to_string())
        .ok_or_else(|| ValidationError::missing(format!("transactionSummary.{key}")))
}

fn insert_identity(fields: &mut Fields, transaction_id: &str, receipt_id: &str, store: &str) {
    fields.insert("transactionid".into(), Value::from(transaction_id));
    fields.insert("receiptid".into(), Value::from(receipt_id));
    fields.insert("store".into(), Value::from(store));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    fn submission(body: Value) -> Submission {
        Submission::from_value(&body).unwrap()
    }

    #[test]
    fn stages_prefixed_ids() {
        let record = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": {
                    "store": "lapaz", "transactionid": "1001", "receiptid": "R-77",
                    "netamount": "150.5", "Zreportid": "A", "zreportid": "B"
                },
                "transactionRecords": [
                    { "linenum": 1, "itemid": "SKU-1", "price": 100 },
                    { "linenum": 2, "itemid": "SKU-2", "price": "50.5" },
                    { "linenum": 1, "itemid": "SKU-DUP" }
                ]
            })),
            now(),
        )
        .unwrap();

        assert_eq!(record.id(), "LAPAZ1001");
        assert_eq!(record.transaction.receipt_id, "LAPAZR-77");
        assert_eq!(record.transaction.store, "LAPAZ");
        assert_eq!(record.transaction.fields["netamount"], "150.50");
        assert_eq!(record.transaction.z_report_id(), Some("A"));
        assert!(!record.transaction.fields.contains_key("Zreportid"));

        assert_eq!(record.lines.len(), 2);
        assert_eq!(record.lines[0].fields["itemid"], "SKU-1");
        assert_eq!(record.lines[0].fields["transactionid"], "LAPAZ1001");
        assert_eq!(record.lines[1].fields["linenum"], 2);
        assert!(record.has_pending());
        assert_eq!(record.transaction.created_at, now());
    }

    #[test]
    fn missing_identity_rejected() {
        let err = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": { "transactionid": "1", "receiptid": "1" },
                "transactionRecords": [{ "linenum": 1 }]
            })),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::missing("transactionSummary.store"));

        let err = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": { "store": "s", "transactionid": "", "receiptid": "1" },
                "transactionRecords": [{ "linenum": 1 }]
            })),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::missing("transactionSummary.transactionid"));
    }

    #[test]
    fn empty_records_rejected() {
        let err = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": { "store": "s", "transactionid": "1", "receiptid": "1" },
                "transactionRecords": []
            })),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyRecords);
    }

    #[test]
    fn unnumbered_line_rejected() {
        let err = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": { "store": "s", "transactionid": "1", "receiptid": "1" },
                "transactionRecords": [{ "linenum": 1 }, { "itemid": "no-number" }]
            })),
            now(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidLineNumber { index: 1 });
    }

    #[test]
    fn sync_state_serializes_uppercase() {
        assert_eq!(serde_json::to_value(SyncState::Pending).unwrap(), json!("PENDING"));
        assert_eq!(serde_json::to_value(SyncState::Synced).unwrap(), json!("SYNCED"));
    }

    #[test]
    fn pending_tracking() {
        let mut record = StagedRecord::from_submission(
            submission(json!({
                "transactionSummary": { "store": "s", "transactionid": "1", "receiptid": "1" },
                "transactionRecords": [{ "linenum": 1 }, { "linenum": 2 }]
            })),
            now(),
        )
        .unwrap();

        record.transaction.sync_state = SyncState::Synced;
        record.lines[0].sync_state = SyncState::Synced;
        assert!(record.has_pending());
        assert_eq!(record.pending_lines().count(), 1);

        record.lines[1].sync_state = SyncState::Synced;
        assert!(record.is_fully_synced());
    }
}

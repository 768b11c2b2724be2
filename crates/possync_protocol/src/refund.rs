//! Refund amendments.
//!
//! A refund rewrites an already-synced transaction upstream: the summary is
//! patched with negated totals and a refund receipt id, and every refunded
//! line is patched individually. Refund items go through the same line
//! filter as submissions, so duplicate line numbers collapse first-seen-wins.

use crate::decimal::{format_decimal, is_empty, parse_number, value_to_text};
use crate::error::{ValidationError, ValidationResult};
use crate::filter::{self, line_number};
use crate::schema::{decimal, integer, optional, text, FieldDefault, FieldSpec, Projection, TEXT};
use crate::submission::Fields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// A refund request as sent by a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRequest {
    /// Upstream transaction id being refunded.
    pub transaction_id: String,
    /// Summary-level fields of the request.
    pub fields: Fields,
    /// Refunded items.
    pub items: Vec<Fields>,
}

/// Summed refund amounts, as positive values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundTotals {
    /// Sum of item net amounts.
    pub amount: f64,
    /// Sum of item cost amounts.
    pub cost: f64,
    /// Sum of item tax amounts.
    pub tax: f64,
    /// Sum of item discounts.
    pub discount: f64,
}

impl RefundTotals {
    /// Renders the totals as fixed-point strings.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "totalRefundAmount": format_decimal(self.amount),
            "totalRefundCost": format_decimal(self.cost),
            "totalRefundTax": format_decimal(self.tax),
            "totalRefundDisc": format_decimal(self.discount),
        })
    }
}

/// Upstream writes that carry out a refund.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundPlan {
    /// Transaction being amended.
    pub transaction_id: String,
    /// Upper-cased store code.
    pub store: String,
    /// Generated refund receipt id.
    pub receipt_id: String,
    /// Patch for the transaction summary.
    pub transaction_patch: Fields,
    /// Patch per refunded line, in request order.
    pub line_patches: Vec<(i64, Fields)>,
    /// Summed amounts.
    pub totals: RefundTotals,
}

const PAYMENT_BUCKETS: &[&str] = &[
    "cashamount",
    "partialpayment",
    "custdiscamount",
    "totaldiscamount",
    "markupamount",
    "taxinclinprice",
    "netamountnotincltax",
    "charge",
    "gcash",
    "paymaya",
    "cash",
    "card",
    "loyaltycard",
    "foodpanda",
    "grabfood",
    "representation",
];

const PASSTHROUGH: &[&str] = &[
    "custaccount",
    "numberofitems",
    "zreportid",
    "comment",
    "receiptemail",
    "markupdescription",
];

const ITEM_SCHEMA: &[FieldSpec] = &[
    text("itemid", ""),
    FieldSpec {
        name: "itemname",
        kind: TEXT,
        fallbacks: &["description"],
        default: FieldDefault::Const(""),
    },
    text("itemgroup", ""),
    decimal("price"),
    decimal("netprice"),
    integer("qty", "0"),
    integer("returnqty", "0"),
    decimal("discamount"),
    decimal("costamount"),
    text("custaccount", "WALK-IN"),
    integer("priceoverride", "0"),
    text("paymentmethod", "REFUND"),
    decimal("linedscamount"),
    decimal("linediscpct"),
    decimal("custdiscamount"),
    text("unit", "PCS"),
    decimal("unitqty"),
    decimal("unitprice"),
    decimal("taxamount"),
    text("remarks", "Refund"),
    text("description", ""),
    decimal("priceunit"),
    decimal("netamountnotincltax"),
    text("currency", "PHP"),
    decimal("taxexempt"),
    optional("inventbatchid", TEXT),
    optional("inventbatchexpdate", TEXT),
    optional("giftcard", TEXT),
    optional("storetaxgroup", TEXT),
    optional("wintransid", TEXT),
];

impl RefundRequest {
    /// Reads a refund request from a request body.
    pub fn from_value(value: &Value) -> ValidationResult<Self> {
        let body = value
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject("request body".into()))?;

        let transaction_id = body
            .get("transactionid")
            .filter(|v| !is_empty(Some(*v)))
            .map(value_to_text)
            .ok_or_else(|| ValidationError::missing("transactionid"))?;

        let items = match body.get("items") {
            None | Some(Value::Null) => return Err(ValidationError::missing("items")),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| ValidationError::NotAnObject(format!("items[{index}]")))
                })
                .collect::<ValidationResult<Vec<_>>>()?,
            Some(_) => return Err(ValidationError::NotAnArray("items".into())),
        };

        let mut fields = body.clone();
        fields.remove("transactionid");
        fields.remove("items");

        Ok(Self {
            transaction_id,
            fields,
            items,
        })
    }

    /// Builds the upstream writes for this refund.
    ///
    /// `count` is the terminal's refund counter; together with the store and
    /// the date it forms the receipt id `RF{count}-{STORE}-{YYYYMMDD}`.
    pub fn plan(&self, store_id: &str, count: &str, now: DateTime<Utc>) -> ValidationResult<RefundPlan> {
        let store = store_id.trim().to_uppercase();
        if store.is_empty() {
            return Err(ValidationError::missing("storeid"));
        }
        let receipt_id = format!("RF{count}-{store}-{}", now.format("%Y%m%d"));
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let refund_by = self.fields.get("refundby").cloned().unwrap_or(Value::Null);

        let items = filter::canonicalize_lines(self.items.clone());

        let mut totals = RefundTotals::default();
        let mut line_patches = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let path = format!("items[{index}]");
            let line_num = line_number(item).ok_or(ValidationError::InvalidLineNumber { index })?;

            let net = amount(item, "netamount", &path)?;
            let gross = amount(item, "grossamount", &path)?;
            totals.amount += net;
            totals.cost += amount(item, "costamount", &path)?;
            totals.tax += amount(item, "taxamount", &path)?;
            totals.discount += amount(item, "discamount", &path)?;

            let mut patch = Projection {
                now,
                parent: None,
                path: &path,
            }
            .apply(item, ITEM_SCHEMA)?;
            patch.insert("transactionid".into(), Value::from(self.transaction_id.as_str()));
            patch.insert("linenum".into(), Value::from(line_num));
            patch.insert("receiptid".into(), Value::from(receipt_id.as_str()));
            patch.insert("store".into(), Value::from(store.as_str()));
            patch.insert("netamount".into(), Value::from(format_decimal(-net)));
            patch.insert("grossamount".into(), Value::from(format_decimal(-gross)));
            patch.insert("staff".into(), refund_by.clone());
            patch.insert("refundby".into(), refund_by.clone());
            patch.insert("createddate".into(), Value::from(timestamp.as_str()));
            patch.insert("refunddate".into(), Value::from(timestamp.as_str()));
            patch.insert(
                "returntransactionid".into(),
                Value::from(self.transaction_id.as_str()),
            );
            patch.insert("creditmemonumber".into(), Value::from(receipt_id.as_str()));
            patch.insert("returnlineid".into(), Value::from(line_num));
            line_patches.push((line_num, patch));
        }

        let mut transaction_patch = Fields::new();
        transaction_patch.insert("refundreceiptid".into(), Value::from(receipt_id.as_str()));
        transaction_patch.insert("refunddate".into(), Value::from(timestamp.as_str()));
        transaction_patch.insert("refundby".into(), refund_by);
        transaction_patch.insert("netamount".into(), Value::from(format_decimal(-totals.amount)));
        transaction_patch.insert("costamount".into(), Value::from(format_decimal(-totals.cost)));
        transaction_patch.insert("grossamount".into(), Value::from(format_decimal(-totals.amount)));
        transaction_patch.insert("discamount".into(), Value::from(format_decimal(-totals.discount)));
        transaction_patch.insert(
            "transactionstatus".into(),
            self.fields
                .get("transactionstatus")
                .filter(|v| !is_empty(Some(*v)))
                .cloned()
                .unwrap_or(Value::from(2)),
        );
        transaction_patch.insert(
            "type".into(),
            self.fields
                .get("type")
                .filter(|v| !is_empty(Some(*v)))
                .cloned()
                .unwrap_or(Value::from("REFUND")),
        );
        transaction_patch.insert(
            "currency".into(),
            self.fields
                .get("currency")
                .filter(|v| !is_empty(Some(*v)))
                .cloned()
                .unwrap_or(Value::from("PHP")),
        );
        transaction_patch.insert(
            "window_number".into(),
            self.fields.get("window_number").cloned().unwrap_or(Value::from(0)),
        );
        for key in PAYMENT_BUCKETS {
            let value = match self.fields.get(*key).filter(|v| !is_empty(Some(*v))) {
                Some(v) => parse_number(v).ok_or_else(|| ValidationError::NotNumeric {
                    field: (*key).to_string(),
                    value: v.to_string(),
                })?,
                None => 0.0,
            };
            transaction_patch.insert((*key).to_string(), Value::from(format_decimal(value)));
        }
        for key in PASSTHROUGH {
            if let Some(value) = self.fields.get(*key) {
                transaction_patch.insert((*key).to_string(), value.clone());
            }
        }

        Ok(RefundPlan {
            transaction_id: self.transaction_id.clone(),
            store,
            receipt_id,
            transaction_patch,
            line_patches,
            totals,
        })
    }
}

fn amount(item: &Fields, key: &str, path: &str) -> ValidationResult<f64> {
    match item.get(key).filter(|v| !is_empty(Some(*v))) {
        None => Ok(0.0),
        Some(v) => parse_number(v).ok_or_else(|| ValidationError::NotNumeric {
            field: format!("{path}.{key}"),
            value: v.to_string(),
        }),
    }
}

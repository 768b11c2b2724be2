//! Canonical field sets.
//!
//! A canonical record carries exactly the fields listed in its schema; any
//! other key a terminal sends is dropped at projection time. Each field has a
//! kind that decides how the raw value is coerced and a default used when
//! the terminal left it empty.

use crate::decimal::{
    format_decimal, is_empty, parse_integer, parse_number, truncate_chars, value_to_text,
};
use crate::error::{ValidationError, ValidationResult};
use crate::submission::Fields;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// How a raw value is coerced into its canonical representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Two-place fixed-point string.
    Decimal,
    /// JSON integer.
    Integer,
    /// String, optionally truncated to a number of characters.
    Text {
        /// Maximum length in characters.
        max_chars: Option<usize>,
    },
    /// Copied through unchanged.
    Raw,
}

/// Value used when the terminal left a field empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    /// Leave the field out of the canonical record.
    Omit,
    /// A constant, coerced through the field's kind.
    Const(&'static str),
    /// The staging timestamp (RFC 3339).
    Now,
    /// A field of the already-projected parent summary.
    Parent(&'static str),
}

/// One canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Canonical name.
    pub name: &'static str,
    /// Coercion applied to the raw value.
    pub kind: FieldKind,
    /// Other raw fields consulted, in order, when `name` is empty.
    pub fallbacks: &'static [&'static str],
    /// Default when the name and every fallback are empty.
    pub default: FieldDefault,
}

pub(crate) const fn decimal(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Decimal,
        fallbacks: &[],
        default: FieldDefault::Const("0"),
    }
}

pub(crate) const fn text(name: &'static str, default: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text { max_chars: None },
        fallbacks: &[],
        default: FieldDefault::Const(default),
    }
}

pub(crate) const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        fallbacks: &[],
        default: FieldDefault::Omit,
    }
}

pub(crate) const fn integer(name: &'static str, default: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Integer,
        fallbacks: &[],
        default: FieldDefault::Const(default),
    }
}

pub(crate) const TEXT: FieldKind = FieldKind::Text { max_chars: None };
const COMMENT: FieldKind = FieldKind::Text { max_chars: Some(50) };

/// Canonical transaction summary fields (identity fields are added separately).
pub const SUMMARY_SCHEMA: &[FieldSpec] = &[
    text("type", "0"),
    optional("staff", TEXT),
    text("custaccount", ""),
    decimal("cashamount"),
    decimal("netamount"),
    decimal("costamount"),
    decimal("grossamount"),
    decimal("partialpayment"),
    integer("transactionstatus", "1"),
    decimal("discamount"),
    decimal("custdiscamount"),
    decimal("totaldiscamount"),
    integer("numberofitems", "0"),
    text("currency", "PHP"),
    FieldSpec {
        name: "createddate",
        kind: TEXT,
        fallbacks: &[],
        default: FieldDefault::Now,
    },
    integer("window_number", "0"),
    decimal("taxinclinprice"),
    decimal("netamountnotincltax"),
    decimal("priceoverride"),
    optional("vatableSales", FieldKind::Decimal),
    FieldSpec {
        name: "comment",
        kind: COMMENT,
        fallbacks: &[],
        default: FieldDefault::Const(""),
    },
    decimal("charge"),
    decimal("gcash"),
    decimal("paymaya"),
    decimal("cash"),
    decimal("card"),
    decimal("loyaltycard"),
    decimal("foodpanda"),
    decimal("grabfood"),
    decimal("representation"),
    optional("zReportid", TEXT),
];

/// Canonical line fields (identity fields and `linenum` are added separately).
pub const LINE_SCHEMA: &[FieldSpec] = &[
    text("itemid", ""),
    FieldSpec {
        name: "itemname",
        kind: TEXT,
        fallbacks: &["description"],
        default: FieldDefault::Const(""),
    },
    text("itemgroup", ""),
    decimal("price"),
    FieldSpec {
        name: "netprice",
        kind: FieldKind::Decimal,
        fallbacks: &["price"],
        default: FieldDefault::Const("0"),
    },
    FieldSpec {
        name: "qty",
        kind: FieldKind::Decimal,
        fallbacks: &[],
        default: FieldDefault::Const("1"),
    },
    decimal("discamount"),
    decimal("costamount"),
    decimal("netamount"),
    decimal("grossamount"),
    text("custaccount", "WALK-IN"),
    decimal("priceoverride"),
    text("paymentmethod", "Cash"),
    text("staff", "Unknown"),
    decimal("linedscamount"),
    decimal("linediscpct"),
    decimal("custdiscamount"),
    text("unit", "PCS"),
    FieldSpec {
        name: "unitqty",
        kind: FieldKind::Decimal,
        fallbacks: &["qty"],
        default: FieldDefault::Const("1"),
    },
    FieldSpec {
        name: "unitprice",
        kind: FieldKind::Decimal,
        fallbacks: &["price"],
        default: FieldDefault::Const("0"),
    },
    decimal("taxamount"),
    FieldSpec {
        name: "createddate",
        kind: TEXT,
        fallbacks: &[],
        default: FieldDefault::Now,
    },
    FieldSpec {
        name: "remarks",
        kind: COMMENT,
        fallbacks: &[],
        default: FieldDefault::Parent("comment"),
    },
    FieldSpec {
        name: "comment",
        kind: COMMENT,
        fallbacks: &["remarks"],
        default: FieldDefault::Parent("comment"),
    },
    FieldSpec {
        name: "taxinclinprice",
        kind: FieldKind::Decimal,
        fallbacks: &["taxamount"],
        default: FieldDefault::Const("0"),
    },
    text("description", ""),
    decimal("netamountnotincltax"),
    text("currency", "PHP"),
    text("discofferid", ""),
    optional("inventbatchid", TEXT),
    optional("inventbatchexpdate", TEXT),
    optional("giftcard", TEXT),
    optional("returntransactionid", TEXT),
    optional("returnqty", FieldKind::Integer),
    optional("creditmemonumber", TEXT),
    optional("returnlineid", FieldKind::Raw),
    optional("priceunit", FieldKind::Raw),
    optional("storetaxgroup", TEXT),
    optional("taxexempt", FieldKind::Raw),
];

/// Inputs a projection may draw defaults from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Projection<'a> {
    /// Staging timestamp.
    pub now: DateTime<Utc>,
    /// Projected parent summary, for line defaults.
    pub parent: Option<&'a Fields>,
    /// Prefix used in error paths, e.g. `transactionRecords[2]`.
    pub path: &'a str,
}

impl Projection<'_> {
    /// Projects `raw` onto `schema`.
    pub(crate) fn apply(&self, raw: &Fields, schema: &[FieldSpec]) -> ValidationResult<Fields> {
        let mut out = Fields::new();
        for spec in schema {
            let supplied = std::iter::once(spec.name)
                .chain(spec.fallbacks.iter().copied())
                .find_map(|key| raw.get(key).filter(|v| !is_empty(Some(*v))));

            let value = match supplied {
                Some(value) => Some(value.clone()),
                None => self.default_for(spec),
            };

            if let Some(value) = value {
                let coerced = coerce(spec, &value)
                    .ok_or_else(|| ValidationError::NotNumeric {
                        field: format!("{}.{}", self.path, spec.name),
                        value: value.to_string(),
                    })?;
                out.insert(spec.name.to_string(), coerced);
            }
        }
        Ok(out)
    }

    fn default_for(&self, spec: &FieldSpec) -> Option<Value> {
        match spec.default {
            FieldDefault::Omit => None,
            FieldDefault::Const(c) => Some(Value::String(c.to_string())),
            FieldDefault::Now => Some(Value::String(
                self.now.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            FieldDefault::Parent(key) => self
                .parent
                .and_then(|p| p.get(key))
                .cloned()
                .or_else(|| Some(Value::String(String::new()))),
        }
    }
}

/// Coerces a value through a field kind. `None` means the value is not numeric.
pub(crate) fn coerce(spec: &FieldSpec, value: &Value) -> Option<Value> {
    match spec.kind {
        FieldKind::Decimal => parse_number(value).map(|n| Value::String(format_decimal(n))),
        FieldKind::Integer => parse_integer(value).map(Value::from),
        FieldKind::Text { max_chars } => {
            let text = value_to_text(value);
            Some(Value::String(match max_chars {
                Some(max) => truncate_chars(&text, max),
                None => text,
            }))
        }
        FieldKind::Raw => Some(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn summary_defaults_applied() {
        let projection = Projection {
            now: now(),
            parent: None,
            path: "transactionSummary",
        };
        let out = projection
            .apply(&fields(json!({ "netamount": 100, "gcash": "40.5" })), SUMMARY_SCHEMA)
            .unwrap();

        assert_eq!(out["netamount"], "100.00");
        assert_eq!(out["gcash"], "40.50");
        assert_eq!(out["cash"], "0.00");
        assert_eq!(out["currency"], "PHP");
        assert_eq!(out["type"], "0");
        assert_eq!(out["transactionstatus"], 1);
        assert_eq!(out["createddate"], "2024-03-01T08:30:00.000Z");
        assert!(!out.contains_key("zReportid"));
        assert!(!out.contains_key("staff"));
    }

    #[test]
    fn unknown_keys_dropped() {
        let projection = Projection {
            now: now(),
            parent: None,
            path: "transactionSummary",
        };
        let out = projection
            .apply(&fields(json!({ "debugBlob": "x", "staff": "ana" })), SUMMARY_SCHEMA)
            .unwrap();
        assert!(!out.contains_key("debugBlob"));
        assert_eq!(out["staff"], "ana");
    }

    #[test]
    fn line_fallbacks_and_parent_defaults() {
        let parent = fields(json!({ "comment": "birthday order" }));
        let projection = Projection {
            now: now(),
            parent: Some(&parent),
            path: "transactionRecords[0]",
        };
        let out = projection
            .apply(
                &fields(json!({ "price": "25", "qty": 2, "description": "Ube roll", "taxamount": 3 })),
                LINE_SCHEMA,
            )
            .unwrap();

        assert_eq!(out["itemname"], "Ube roll");
        assert_eq!(out["netprice"], "25.00");
        assert_eq!(out["unitprice"], "25.00");
        assert_eq!(out["unitqty"], "2.00");
        assert_eq!(out["taxinclinprice"], "3.00");
        assert_eq!(out["remarks"], "birthday order");
        assert_eq!(out["comment"], "birthday order");
        assert_eq!(out["custaccount"], "WALK-IN");
        assert_eq!(out["paymentmethod"], "Cash");
        assert!(!out.contains_key("giftcard"));
    }

    #[test]
    fn comments_truncated_to_fifty_chars() {
        let projection = Projection {
            now: now(),
            parent: None,
            path: "transactionSummary",
        };
        let long = "x".repeat(80);
        let out = projection
            .apply(&fields(json!({ "comment": long })), SUMMARY_SCHEMA)
            .unwrap();
        assert_eq!(out["comment"].as_str().unwrap().len(), 50);
    }

    #[test]
    fn non_numeric_rejected_with_path() {
        let projection = Projection {
            now: now(),
            parent: None,
            path: "transactionRecords[1]",
        };
        let err = projection
            .apply(&fields(json!({ "qty": "two" })), LINE_SCHEMA)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotNumeric {
                field: "transactionRecords[1].qty".into(),
                value: "\"two\"".into(),
            }
        );
    }
}

//! Alias groups for historical field-name spellings.
//!
//! Terminal builds shipped over several years spell the same logical field in
//! different ways. Each [`AliasGroup`] pins the order in which spellings are
//! consulted; the first non-empty value wins and every other spelling is
//! removed.

use crate::decimal::is_empty;
use crate::submission::Fields;

/// A canonical field and the spellings that may carry its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasGroup {
    /// Name the value is written back under.
    pub canonical: &'static str,
    /// Spellings consulted in order. May include the canonical name itself.
    pub precedence: &'static [&'static str],
}

/// Alias groups applied to transaction summaries.
pub const SUMMARY_ALIASES: &[AliasGroup] = &[
    AliasGroup {
        canonical: "zReportid",
        precedence: &["zReportid", "Zreportid", "ZReportid", "zreportid", "zReportId"],
    },
    AliasGroup {
        canonical: "taxinclinprice",
        precedence: &["taxinclinprice", "vatamount", "vatAmount"],
    },
    AliasGroup {
        canonical: "vatableSales",
        precedence: &["vatableSales", "vatablesales"],
    },
    AliasGroup {
        canonical: "comment",
        precedence: &["comment", "remarks", "remark"],
    },
];

/// Alias groups applied to each line record.
pub const LINE_ALIASES: &[AliasGroup] = &[
    AliasGroup {
        canonical: "linenum",
        precedence: &["linenum", "lineNum", "line_num"],
    },
    AliasGroup {
        canonical: "paymentmethod",
        precedence: &["paymentMethod", "paymentmethod", "payment_method"],
    },
    AliasGroup {
        canonical: "taxamount",
        precedence: &["taxamount", "vatamount", "vatAmount"],
    },
    AliasGroup {
        canonical: "discofferid",
        precedence: &["discofferid", "discountOfferId"],
    },
    AliasGroup {
        canonical: "remarks",
        precedence: &["remarks", "remark", "comment"],
    },
];

impl AliasGroup {
    /// Resolves this group in place.
    ///
    /// Returns true if a value was written under the canonical name.
    pub fn resolve(&self, fields: &mut Fields) -> bool {
        let winner = self
            .precedence
            .iter()
            .find_map(|key| fields.get(*key).filter(|v| !is_empty(Some(*v))).cloned());

        for key in self.precedence {
            fields.remove(*key);
        }
        fields.remove(self.canonical);

        match winner {
            Some(value) => {
                fields.insert(self.canonical.to_string(), value);
                true
            }
            None => false,
        }
    }
}

/// Resolves every group in `groups` against `fields`.
pub fn resolve_aliases(fields: &mut Fields, groups: &[AliasGroup]) {
    for group in groups {
        group.resolve(fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn first_non_empty_spelling_wins() {
        let mut summary = fields(json!({ "Zreportid": "A", "zreportid": "B" }));
        resolve_aliases(&mut summary, SUMMARY_ALIASES);

        assert_eq!(summary.get("zReportid"), Some(&json!("A")));
        assert!(!summary.contains_key("Zreportid"));
        assert!(!summary.contains_key("zreportid"));
    }

    #[test]
    fn empty_canonical_does_not_shadow_alias() {
        let mut summary = fields(json!({ "zReportid": "", "ZReportid": "Z-9" }));
        resolve_aliases(&mut summary, SUMMARY_ALIASES);
        assert_eq!(summary.get("zReportid"), Some(&json!("Z-9")));
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn all_empty_removes_every_spelling() {
        let mut summary = fields(json!({ "zreportid": null, "Zreportid": "" }));
        resolve_aliases(&mut summary, SUMMARY_ALIASES);
        assert!(summary.is_empty());
    }

    #[test]
    fn payment_method_prefers_camel_case() {
        let mut line = fields(json!({ "paymentmethod": "Cash", "paymentMethod": "GCash" }));
        resolve_aliases(&mut line, LINE_ALIASES);
        assert_eq!(line.get("paymentmethod"), Some(&json!("GCash")));
        assert!(!line.contains_key("paymentMethod"));
    }

    #[test]
    fn tax_mirror_folds_into_canonical() {
        let mut summary = fields(json!({ "vatAmount": "12.00", "vatamount": "" }));
        resolve_aliases(&mut summary, SUMMARY_ALIASES);
        assert_eq!(summary.get("taxinclinprice"), Some(&json!("12.00")));
        assert!(!summary.contains_key("vatAmount"));
        assert!(!summary.contains_key("vatamount"));
    }

    #[test]
    fn unrelated_fields_untouched() {
        let mut line = fields(json!({ "itemid": "SKU-1", "lineNum": 3 }));
        resolve_aliases(&mut line, LINE_ALIASES);
        assert_eq!(line.get("itemid"), Some(&json!("SKU-1")));
        assert_eq!(line.get("linenum"), Some(&json!(3)));
    }
}

//! Property-based test generators using proptest.
//!
//! Strategies produce terminal payloads with the irregularities real
//! terminals send: repeated line numbers, alternate field spellings and
//! amounts as either strings or numbers.

use possync_protocol::Fields;
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for line-number sequences that contain duplicates.
pub fn line_numbers_with_duplicates() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..6, 1..16)
}

/// Strategy for store codes in mixed case.
pub fn store_code_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z]{3,8}").expect("Invalid regex")
}

/// Strategy for an amount, sent either as a JSON number or as a string.
pub fn amount_strategy() -> impl Strategy<Value = Value> {
    (0u32..100_000).prop_flat_map(|cents| {
        let amount = f64::from(cents) / 100.0;
        prop_oneof![Just(json!(amount)), Just(json!(format!("{amount:.2}")))]
    })
}

/// Strategy for one raw line with the given number, using a random
/// spelling of the aliased fields.
pub fn raw_line_strategy(line_num: i64) -> impl Strategy<Value = Fields> {
    (
        prop::sample::select(vec!["linenum", "lineNum", "line_num"]),
        prop::sample::select(vec!["paymentMethod", "paymentmethod", "payment_method"]),
        prop::sample::select(vec!["Cash", "GCash", "Card"]),
        amount_strategy(),
    )
        .prop_map(move |(num_key, pay_key, method, price)| {
            let mut line = Fields::new();
            line.insert(num_key.to_string(), json!(line_num));
            line.insert(pay_key.to_string(), json!(method));
            line.insert("itemid".to_string(), json!(format!("SKU-{line_num}")));
            line.insert("price".to_string(), price);
            line
        })
}

/// Strategy for a complete submission body whose lines repeat numbers.
pub fn submission_strategy() -> impl Strategy<Value = Value> {
    (
        store_code_strategy(),
        1u32..100_000,
        line_numbers_with_duplicates(),
    )
        .prop_flat_map(|(store, id, nums)| {
            let lines: Vec<_> = nums.into_iter().map(raw_line_strategy).collect();
            (Just(store), Just(id), lines)
        })
        .prop_map(|(store, id, lines)| {
            json!({
                "transactionSummary": {
                    "store": store,
                    "transactionid": id.to_string(),
                    "receiptid": format!("R{id}"),
                },
                "transactionRecords": lines,
            })
        })
}

//! Numeric and text coercion for loosely typed terminal fields.
//!
//! Terminals send amounts as JSON numbers or as strings, sometimes with
//! surrounding whitespace. Everything numeric ends up as a two-place
//! fixed-point string so that upstream records compare byte-for-byte.

use serde_json::Value;

/// Returns true if a field value counts as absent.
///
/// Missing keys, `null` and the empty string are all empty. `0` and `false`
/// are values.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Reads a value as a finite floating-point number.
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Reads a value as an integer, truncating any fractional part.
pub fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Formats a number as a two-place fixed-point string.
pub fn format_decimal(value: f64) -> String {
    let formatted = format!("{value:.2}");
    // Rounding small negatives yields "-0.00".
    if formatted == "-0.00" {
        "0.00".to_string()
    } else {
        formatted
    }
}

/// Truncates a string to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Renders a scalar JSON value as text.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

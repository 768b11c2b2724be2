//! Raw terminal submissions.

use crate::error::{ValidationError, ValidationResult};
use serde_json::{Map, Value};

/// A loosely typed field bag as sent by a terminal.
pub type Fields = Map<String, Value>;

/// A transaction submitted by a store terminal.
///
/// Wire shape: `{ "transactionSummary": {...}, "transactionRecords": [{...}] }`.
/// Field names inside the summary and the records are not yet canonical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    /// Transaction summary fields.
    pub summary: Fields,
    /// Line records in the order the terminal sent them.
    pub lines: Vec<Fields>,
}

impl Submission {
    /// Creates a submission from already-split parts.
    pub fn new(summary: Fields, lines: Vec<Fields>) -> Self {
        Self { summary, lines }
    }

    /// Reads a submission from a request body.
    pub fn from_value(value: &Value) -> ValidationResult<Self> {
        let body = value
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject("request body".into()))?;

        let summary = match body.get("transactionSummary") {
            None | Some(Value::Null) => {
                return Err(ValidationError::missing("transactionSummary"))
            }
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ValidationError::NotAnObject("transactionSummary".into())),
        };

        let records = match body.get("transactionRecords") {
            None | Some(Value::Null) => {
                return Err(ValidationError::missing("transactionRecords"))
            }
            Some(Value::Array(records)) => records,
            Some(_) => return Err(ValidationError::NotAnArray("transactionRecords".into())),
        };

        let lines = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record.as_object().cloned().ok_or_else(|| {
                    ValidationError::NotAnObject(format!("transactionRecords[{index}]"))
                })
            })
            .collect::<ValidationResult<Vec<_>>>()?;

        Ok(Self { summary, lines })
    }

    /// Renders the submission back to its wire shape.
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "transactionSummary".into(),
            Value::Object(self.summary.clone()),
        );
        body.insert(
            "transactionRecords".into(),
            Value::Array(self.lines.iter().cloned().map(Value::Object).collect()),
        );
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wire_shape() {
        let body = json!({
            "transactionSummary": { "store": "lapaz", "transactionid": "1001" },
            "transactionRecords": [{ "linenum": 1 }, { "linenum": 2 }]
        });

        let submission = Submission::from_value(&body).unwrap();
        assert_eq!(submission.summary["store"], "lapaz");
        assert_eq!(submission.lines.len(), 2);
        assert_eq!(submission.to_value(), body);
    }

    #[test]
    fn rejects_missing_parts() {
        let err = Submission::from_value(&json!({ "transactionRecords": [] })).unwrap_err();
        assert_eq!(err, ValidationError::missing("transactionSummary"));

        let err = Submission::from_value(&json!({ "transactionSummary": {} })).unwrap_err();
        assert_eq!(err, ValidationError::missing("transactionRecords"));

        let err = Submission::from_value(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject(_)));
    }

    #[test]
    fn rejects_non_object_lines() {
        let body = json!({
            "transactionSummary": {},
            "transactionRecords": [{ "linenum": 1 }, "oops"]
        });
        let err = Submission::from_value(&body).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NotAnObject("transactionRecords[1]".into())
        );
    }
}

//! # Row Accessor
//!
//! Flashlist rows arrive as loosely typed JSON: the monitoring system renders
//! most numeric columns as strings, booleans as `"true"`/`"false"`, and nested
//! tables as `{"rows": [...]}` objects. Every access goes through the [`Row`]
//! trait, which converts on read and reports failures per field. A failure is
//! always confined to one row: the dispatcher logs it, counts it, and moves on.

use serde_json::Value;
use thiserror::Error;

/// Failure to read one field of one row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// The row has no such column.
    #[error("field '{0}' is missing from the row")]
    Missing(String),

    /// The column exists but cannot be read as the requested kind.
    #[error("field '{field}' is not a valid {expected} (found {found})")]
    WrongKind {
        /// Column name.
        field: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Rendering of the offending value.
        found: String,
    },

    /// The column was readable but its content violates an invariant.
    #[error("field '{field}' is malformed: {reason}")]
    Malformed {
        /// Column name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl RowError {
    fn wrong_kind(field: &str, expected: &'static str, found: &Value) -> Self {
        RowError::WrongKind {
            field: field.to_string(),
            expected,
            found: found.to_string(),
        }
    }

    /// Builds a [`RowError::Malformed`] for `field`.
    pub fn malformed(field: &str, reason: impl Into<String>) -> Self {
        RowError::Malformed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Typed access to the named fields of one flashlist row.
pub trait Row {
    /// Whether the row carries the column at all.
    fn has(&self, key: &str) -> bool;

    /// Reads a column as text. Numbers and booleans are rendered.
    fn text(&self, key: &str) -> Result<String, RowError>;

    /// Reads a column as a signed integer.
    fn int(&self, key: &str) -> Result<i64, RowError>;

    /// Reads a column as floating point.
    fn float(&self, key: &str) -> Result<f64, RowError>;

    /// Reads a column as a boolean.
    fn boolean(&self, key: &str) -> Result<bool, RowError>;

    /// Reads a list-valued column of integers.
    fn int_list(&self, key: &str) -> Result<Vec<i64>, RowError>;

    /// Reads a list-valued column of floating point values.
    fn float_list(&self, key: &str) -> Result<Vec<f64>, RowError>;

    /// Reads a nested table column as its rows.
    fn table(&self, key: &str) -> Result<Vec<&dyn Row>, RowError>;

    /// Reads a timestamp column. Timestamps are compared, never interpreted.
    fn timestamp(&self, key: &str) -> Result<String, RowError> {
        self.text(key)
    }

    /// Reads an unsigned integer column.
    fn uint(&self, key: &str) -> Result<u64, RowError> {
        let value = self.int(key)?;
        u64::try_from(value).map_err(|_| RowError::malformed(key, format!("negative value {value}")))
    }
}

impl Row for Value {
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn text(&self, key: &str) -> Result<String, RowError> {
        match field(self, key)? {
            Value::String(s) => Ok(s.clone()),
            v @ (Value::Number(_) | Value::Bool(_)) => Ok(v.to_string()),
            other => Err(RowError::wrong_kind(key, "text", other)),
        }
    }

    fn int(&self, key: &str) -> Result<i64, RowError> {
        let v = field(self, key)?;
        as_i64(v).ok_or_else(|| RowError::wrong_kind(key, "integer", v))
    }

    fn float(&self, key: &str) -> Result<f64, RowError> {
        let v = field(self, key)?;
        as_f64(v).ok_or_else(|| RowError::wrong_kind(key, "floating point", v))
    }

    fn boolean(&self, key: &str) -> Result<bool, RowError> {
        let v = field(self, key)?;
        as_bool(v).ok_or_else(|| RowError::wrong_kind(key, "boolean", v))
    }

    fn int_list(&self, key: &str) -> Result<Vec<i64>, RowError> {
        let v = field(self, key)?;
        let items = v.as_array().ok_or_else(|| RowError::wrong_kind(key, "list", v))?;
        items
            .iter()
            .map(|item| as_i64(item).ok_or_else(|| RowError::wrong_kind(key, "integer list", item)))
            .collect()
    }

    fn float_list(&self, key: &str) -> Result<Vec<f64>, RowError> {
        let v = field(self, key)?;
        let items = v.as_array().ok_or_else(|| RowError::wrong_kind(key, "list", v))?;
        items
            .iter()
            .map(|item| as_f64(item).ok_or_else(|| RowError::wrong_kind(key, "floating point list", item)))
            .collect()
    }

    fn table(&self, key: &str) -> Result<Vec<&dyn Row>, RowError> {
        let v = field(self, key)?;
        let rows = match v {
            Value::Array(rows) => rows,
            Value::Object(map) => match map.get("rows") {
                Some(Value::Array(rows)) => rows,
                _ => return Err(RowError::wrong_kind(key, "table", v)),
            },
            _ => return Err(RowError::wrong_kind(key, "table", v)),
        };
        Ok(rows.iter().map(|r| r as &dyn Row).collect())
    }
}

fn field<'a>(row: &'a Value, key: &str) -> Result<&'a Value, RowError> {
    match row.get(key) {
        Some(Value::Null) | None => Err(RowError::Missing(key.to_string())),
        Some(v) => Ok(v),
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_converted() {
        let row = json!({"eventRate": "1200", "fraction": "0.25", "flag": "TRUE"});
        assert_eq!(row.int("eventRate"), Ok(1200));
        assert_eq!(row.float("fraction"), Ok(0.25));
        assert_eq!(row.boolean("flag"), Ok(true));
    }

    #[test]
    fn missing_and_null_fields_are_reported() {
        let row = json!({"context": null});
        assert_eq!(row.text("context"), Err(RowError::Missing("context".into())));
        assert_eq!(row.int("nope"), Err(RowError::Missing("nope".into())));
    }

    #[test]
    fn wrong_kind_names_the_field() {
        let row = json!({"instance": "abc"});
        match row.int("instance") {
            Err(RowError::WrongKind { field, expected, .. }) => {
                assert_eq!(field, "instance");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lists_and_nested_tables() {
        let row = json!({
            "ids": [1, "2", 3],
            "jobTable": {"rows": [{"status": "alive"}, {"status": "dead"}]}
        });
        assert_eq!(row.int_list("ids"), Ok(vec![1, 2, 3]));
        let jobs = row.table("jobTable").unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].text("status"), Ok("dead".to_string()));
    }

    #[test]
    fn negative_value_is_not_unsigned() {
        let row = json!({"counter": -4});
        assert!(matches!(row.uint("counter"), Err(RowError::Malformed { .. })));
    }
}

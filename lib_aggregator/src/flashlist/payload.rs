use serde_json::Value;
use thiserror::Error;

use super::types::FlashlistType;

/// Errors raised while turning a retrieved payload into a [`Flashlist`].
#[derive(Debug, Error)]
pub enum FlashlistError {
    /// The payload is not valid JSON.
    #[error("flashlist {name} is not valid JSON: {source}")]
    Json {
        /// Flashlist name.
        name: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload parsed but has no `table.rows` array.
    #[error("flashlist {0} has no table.rows array")]
    MissingRows(String),
}

/// One flashlist as retrieved for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Flashlist {
    /// The name the flashlist was published under.
    pub name: String,
    /// Resolved type, `None` for flashlists the aggregator does not know.
    pub flashlist_type: Option<FlashlistType>,
    /// False when retrieval failed; such flashlists are skipped.
    pub available: bool,
    /// Table rows.
    pub rows: Vec<Value>,
}

impl Flashlist {
    /// Builds a flashlist of a known type from already parsed rows.
    pub fn new(flashlist_type: FlashlistType, rows: Vec<Value>) -> Self {
        Self {
            name: flashlist_type.flashlist_name().to_string(),
            flashlist_type: Some(flashlist_type),
            available: true,
            rows,
        }
    }

    /// Marks a flashlist whose retrieval failed this cycle.
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flashlist_type: FlashlistType::from_name(name),
            available: false,
            rows: Vec::new(),
        }
    }

    /// Parses a LAS payload: `{"table": {"definition": [...], "rows": [...]}}`.
    ///
    /// A bare `{"rows": [...]}` object or a top-level array of rows is also
    /// accepted, which is what recorded snapshots usually contain.
    pub fn from_las_json(name: &str, payload: &str) -> Result<Self, FlashlistError> {
        let json: Value = serde_json::from_str(payload).map_err(|source| FlashlistError::Json {
            name: name.to_string(),
            source,
        })?;

        let rows = match json {
            Value::Array(rows) => rows,
            Value::Object(mut map) => {
                let table = match map.remove("table") {
                    Some(Value::Object(table)) => table,
                    _ => map,
                };
                match table.get("rows") {
                    Some(Value::Array(rows)) => rows.clone(),
                    _ => return Err(FlashlistError::MissingRows(name.to_string())),
                }
            }
            _ => return Err(FlashlistError::MissingRows(name.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            flashlist_type: FlashlistType::from_name(name),
            available: true,
            rows,
        })
    }

    /// True when the flashlist was retrieved but has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_las_table_format() {
        let payload = r#"{"table":{"definition":[{"key":"context","type":"string"}],
            "rows":[{"context":"http://ru-1.cms:11100"}]}}"#;
        let fl = Flashlist::from_las_json("urn:xdaq-flashlist:RU", payload).unwrap();
        assert_eq!(fl.flashlist_type, Some(FlashlistType::Ru));
        assert_eq!(fl.rows.len(), 1);
        assert!(fl.available);
    }

    #[test]
    fn unknown_names_parse_without_a_type() {
        let fl = Flashlist::from_las_json("urn:xdaq-flashlist:brandNew", "[]").unwrap();
        assert_eq!(fl.flashlist_type, None);
        assert!(fl.is_empty());
    }

    #[test]
    fn missing_rows_is_an_error() {
        let err = Flashlist::from_las_json("RU", r#"{"table":{}}"#).unwrap_err();
        assert!(matches!(err, FlashlistError::MissingRows(_)));
    }
}

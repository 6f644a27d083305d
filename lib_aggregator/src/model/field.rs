//! # Field Update Plans
//!
//! Entity updates are written as small declarative plans: each periodically
//! refreshed field names its source column and how the column value is turned
//! into the field value. Direct columns use a [`FieldSpec`]; columns that the
//! source accumulates over the whole run use an [`AccumulatedCounter`], which
//! turns the running total into a per-cycle delta.

use serde::{Deserialize, Serialize};

use crate::flashlist::{Row, RowError};

/// How a column value becomes a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Copy as is.
    Direct,
    /// Fraction in `[0, 1]` scaled to a percentage.
    Percent,
    /// Boolean negated (e.g. `isActive` feeding a `masked` flag).
    Inverted,
}

/// One column read with its conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Source column.
    pub column: &'static str,
    /// Conversion applied on read.
    pub conversion: Conversion,
}

impl FieldSpec {
    /// A column copied as is.
    pub const fn direct(column: &'static str) -> Self {
        Self { column, conversion: Conversion::Direct }
    }

    /// A fraction column stored as a percentage.
    pub const fn percent(column: &'static str) -> Self {
        Self { column, conversion: Conversion::Percent }
    }

    /// A boolean column stored negated.
    pub const fn inverted(column: &'static str) -> Self {
        Self { column, conversion: Conversion::Inverted }
    }

    /// Reads a floating point field. `Inverted` makes no sense here and reads directly.
    pub fn read_float(&self, row: &dyn Row) -> Result<f64, RowError> {
        let value = row.float(self.column)?;
        Ok(match self.conversion {
            Conversion::Percent => value * 100.0,
            Conversion::Direct | Conversion::Inverted => value,
        })
    }

    /// Reads a boolean field.
    pub fn read_flag(&self, row: &dyn Row) -> Result<bool, RowError> {
        let value = row.boolean(self.column)?;
        Ok(match self.conversion {
            Conversion::Inverted => !value,
            Conversion::Direct | Conversion::Percent => value,
        })
    }

    /// Reads an unsigned counter.
    pub fn read_uint(&self, row: &dyn Row) -> Result<u64, RowError> {
        row.uint(self.column)
    }

    /// Reads a text field.
    pub fn read_text(&self, row: &dyn Row) -> Result<String, RowError> {
        row.text(self.column)
    }
}

/// Converts a running total published by the source into a per-cycle delta.
///
/// The delta only moves when the row timestamp differs from the one seen last,
/// so a stale duplicate delivery of the same row never double-counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedCounter {
    #[serde(skip)]
    last_timestamp: Option<String>,
    #[serde(skip)]
    last_raw: f64,
    delta: f64,
}

impl AccumulatedCounter {
    /// Records an observation. Returns true when the delta was recomputed.
    pub fn observe(&mut self, timestamp: &str, raw: f64) -> bool {
        if self.last_timestamp.as_deref() == Some(timestamp) {
            return false;
        }
        self.delta = raw - self.last_raw;
        self.last_raw = raw;
        self.last_timestamp = Some(timestamp.to_string());
        true
    }

    /// Delta computed at the last distinct observation.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Timestamp of the last distinct observation.
    pub fn last_timestamp(&self) -> Option<&str> {
        self.last_timestamp.as_deref()
    }

    /// Raw running total stored at the last distinct observation.
    pub fn last_raw(&self) -> f64 {
        self.last_raw
    }

    /// Forgets everything, as if the counter had never been observed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_timestamp_leaves_delta_alone() {
        let mut counter = AccumulatedCounter::default();
        counter.observe("T0", 100.0);
        let before = counter.delta();

        assert!(!counter.observe("T0", 150.0));
        assert_eq!(counter.delta(), before);
        assert_eq!(counter.last_raw(), 100.0);

        assert!(counter.observe("T1", 150.0));
        assert_eq!(counter.delta(), 50.0);
        assert_eq!(counter.last_raw(), 150.0);
        assert_eq!(counter.last_timestamp(), Some("T1"));
    }

    #[test]
    fn conversions() {
        let row = json!({"fractionBusy": 0.5, "isActive": false});
        assert_eq!(FieldSpec::percent("fractionBusy").read_float(&row), Ok(50.0));
        assert_eq!(FieldSpec::inverted("isActive").read_flag(&row), Ok(true));
        assert_eq!(FieldSpec::direct("isActive").read_flag(&row), Ok(false));
    }
}

//! Required-field and shape gate.
//!
//! Runs before the (more expensive) transformer. A failing row is dropped
//! with a typed reason; rows are never mutated here.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use ridecal_common::RawRow;

use crate::transform::schedule::parse_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationErrorKind {
    MissingName,
    MissingDate,
    MissingLocation,
    BadDateFormat,
    ShapeError,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::MissingName => "missing_name",
            ValidationErrorKind::MissingDate => "missing_date",
            ValidationErrorKind::MissingLocation => "missing_location",
            ValidationErrorKind::BadDateFormat => "bad_date_format",
            ValidationErrorKind::ShapeError => "shape_error",
        }
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    pub errors_by_kind: BTreeMap<ValidationErrorKind, u32>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only rows satisfying the required-field invariants, in order.
    pub fn validate(&mut self, rows: Vec<RawRow>) -> Vec<RawRow> {
        rows.into_iter()
            .filter(|row| match self.check(row) {
                Ok(()) => true,
                Err(kind) => {
                    warn!(
                        reason = %kind,
                        name = row.get_str("name").unwrap_or("<unnamed>"),
                        "Dropping invalid row"
                    );
                    *self.errors_by_kind.entry(kind).or_insert(0) += 1;
                    false
                }
            })
            .collect()
    }

    pub fn dropped(&self) -> u32 {
        self.errors_by_kind.values().sum()
    }

    /// String-keyed view for the metrics document.
    pub fn errors_by_name(&self) -> BTreeMap<String, u32> {
        self.errors_by_kind
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), *v))
            .collect()
    }

    fn check(&self, row: &RawRow) -> std::result::Result<(), ValidationErrorKind> {
        if row.get_str("name").is_none() {
            return Err(ValidationErrorKind::MissingName);
        }

        let date = row.get_str("date_start").or_else(|| row.get_str("date"));
        let Some(date) = date else {
            return Err(ValidationErrorKind::MissingDate);
        };

        if row.get_str("location").is_none() {
            return Err(ValidationErrorKind::MissingLocation);
        }

        if parse_date(date).is_none() {
            // The transformer falls back to the row's `date` field; only a
            // row with no parseable date at all is dropped.
            let fallback_ok = row
                .get_str("date")
                .is_some_and(|alt| parse_date(alt).is_some());
            if !fallback_ok {
                return Err(ValidationErrorKind::BadDateFormat);
            }
        }

        // Shape invariants: structured fields must have their expected form.
        if row
            .get("distances")
            .is_some_and(|v| !matches!(v, Value::Array(_)))
        {
            return Err(ValidationErrorKind::ShapeError);
        }
        if row
            .get("ride_manager_contact")
            .is_some_and(|v| !matches!(v, Value::Object(_) | Value::Null))
        {
            return Err(ValidationErrorKind::ShapeError);
        }
        if row
            .get("control_judges")
            .is_some_and(|v| !matches!(v, Value::Array(_) | Value::Null))
        {
            return Err(ValidationErrorKind::ShapeError);
        }

        Ok(())
    }
}

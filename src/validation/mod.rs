//! Validation Module
//!
//! Batch validation of record input against an entity's declared fields.
//! Every violation is collected; validation never stops at the first bad
//! field.

use std::fmt;

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::store::{EntityMeta, FieldDef, FieldKind};


// == Field Violation ==
/// A single problem with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// == Validation Errors ==
/// The full batch of violations found in one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations reported for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldViolation> {
        self.violations.iter().filter(move |v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

// == Validator ==
/// Checks input against one entity's closed field table.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    meta: &'static EntityMeta,
}

impl Validator {
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self { meta }
    }

    /// Validates `input`, returning every violation found.
    ///
    /// Required fields that are absent or null are reported once each. Kind
    /// and length are checked only on present, non-null values. Keys that
    /// are not declared are ignored.
    pub fn validate(&self, input: &Map<String, Value>) -> Result<(), ValidationErrors> {
        let mut violations = Vec::new();

        for field in self.meta.fields {
            match input.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        violations.push(FieldViolation::new(field.name, "is required"));
                    }
                }
                Some(value) => check_value(field, value, &mut violations),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors::new(violations))
        }
    }
}

fn check_value(field: &FieldDef, value: &Value, violations: &mut Vec<FieldViolation>) {
    let kind_ok = match field.kind {
        FieldKind::String => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Date => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
    };
    if !kind_ok {
        violations.push(FieldViolation::new(
            field.name,
            format!("must be a {}", field.kind.as_str()),
        ));
        return;
    }

    if let (FieldKind::String, Some(max), Some(s)) = (field.kind, field.max_length, value.as_str())
    {
        let len = s.chars().count();
        if len > max {
            violations.push(FieldViolation::new(
                field.name,
                format!("must be at most {} characters (got {})", max, len),
            ));
        }
    }
}

//! Query Options Module
//!
//! Store-agnostic description of a list query. Options serialize to a
//! canonical JSON form that the repository hashes into list cache keys.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Filter ==
/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Gt,
    Lt,
}

/// A single `field <op> value` predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Tests the predicate against a serialized record.
    ///
    /// A missing field never matches.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match (self.op, compare_values(actual, &self.value)) {
            (FilterOp::Eq, Some(Ordering::Equal)) => true,
            (FilterOp::Gt, Some(Ordering::Greater)) => true,
            (FilterOp::Lt, Some(Ordering::Less)) => true,
            _ => false,
        }
    }
}

/// Sort key for a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

// == Find Options ==
/// Filters, ordering and paging for `EntityStore::find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality filter.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    /// Adds a greater-than filter.
    pub fn where_gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Gt, value)
    }

    /// Adds a less-than filter.
    pub fn where_lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Lt, value)
    }

    fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Sorts ascending by `field`.
    pub fn order_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Sorts descending by `field`.
    pub fn order_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Canonical serialization used to derive deterministic cache keys.
    pub fn canonical_json(&self) -> String {
        // Struct field order is fixed and filters keep insertion order.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Applies filters, ordering and paging to serialized records.
    pub fn apply(&self, records: Vec<Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = records
            .into_iter()
            .filter(|r| self.filters.iter().all(|f| f.matches(r)))
            .collect();

        if let Some(order) = &self.order_by {
            matched.sort_by(|a, b| {
                let ord = match (a.get(&order.field), b.get(&order.field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        matched.into_iter().skip(offset).take(limit).collect()
    }
}

// == Value Comparison ==
/// Orders two JSON scalars.
///
/// Strings that both parse as RFC 3339 timestamps compare chronologically.
/// Mismatched kinds are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.with_timezone(&Utc).cmp(&dy.with_timezone(&Utc))),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

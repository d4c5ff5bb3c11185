//! Record filtering
//!
//! Attribute predicates are evaluated strictly: all predicates must match
//! (AND semantics), there is no type coercion, and a missing or unset field
//! never matches. Spatial filtering is an envelope intersection test.

use serde_json::Value;

use crate::feature::{Envelope, Feature, Geometry};
use crate::schema::LayerSchema;

/// Filter operation types
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equality: field = value
    Eq(Value),
    /// Greater than or equal: field >= value
    Gte(Value),
    /// Greater than: field > value
    Gt(Value),
    /// Less than or equal: field <= value
    Lte(Value),
    /// Less than: field < value
    Lt(Value),
}

/// A single predicate (display field name + operation)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field display name
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value),
        }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte(value),
        }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt(value),
        }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte(value),
        }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt(value),
        }
    }
}

/// Evaluates predicates against output records
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a feature matches all predicates
    pub fn matches(feature: &Feature, schema: &LayerSchema, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|pred| Self::matches_predicate(feature, schema, pred))
    }

    fn matches_predicate(feature: &Feature, schema: &LayerSchema, predicate: &Predicate) -> bool {
        let Some(index) = schema.display_index(&predicate.field) else {
            return false; // Unknown field = no match
        };
        let Some(value) = feature.field(index) else {
            return false; // Unset field = no match
        };
        let actual = value.to_json();

        match &predicate.op {
            FilterOp::Eq(expected) => actual == *expected,
            FilterOp::Gte(bound) => Self::compare(&actual, bound, |o| o >= 0.0, |a, b| a >= b),
            FilterOp::Gt(bound) => Self::compare(&actual, bound, |o| o > 0.0, |a, b| a > b),
            FilterOp::Lte(bound) => Self::compare(&actual, bound, |o| o <= 0.0, |a, b| a <= b),
            FilterOp::Lt(bound) => Self::compare(&actual, bound, |o| o < 0.0, |a, b| a < b),
        }
    }

    /// Numeric comparison for numbers, lexicographic for strings, no
    /// cross-type coercion
    fn compare(
        actual: &Value,
        bound: &Value,
        num_ok: impl Fn(f64) -> bool,
        str_ok: impl Fn(&str, &str) -> bool,
    ) -> bool {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(af), Some(bf)) = (a.as_f64(), b.as_f64()) {
                    return num_ok(af - bf);
                }
                false
            }
            (Value::String(a), Value::String(b)) => str_ok(a, b),
            _ => false,
        }
    }
}

/// Envelope test for the spatial filter
///
/// No filter passes everything; a set filter rejects records without a
/// geometry or with an empty one.
pub fn passes_spatial_filter(geometry: Option<&Geometry>, filter: Option<&Envelope>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let Some(envelope) = geometry.and_then(Geometry::envelope) else {
        return false;
    };
    envelope.intersects(filter)
}

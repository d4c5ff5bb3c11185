//! Output records
//!
//! A `Feature` is one output row: typed, nullable field slots sized to the
//! layer schema, an optional geometry and a numeric id (the entity's id, or
//! the way's id for a way-derived record). A feature is owned by its layer
//! buffer until delivered to the consumer.

mod geometry;

pub use geometry::{Envelope, Geometry};

use std::borrow::Cow;

use chrono::NaiveDateTime;

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i32),
    Integer64(i64),
    Real(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Integer view with the usual lossy conversions; text parses its
    /// leading digits, anything unparseable is 0
    pub fn as_i64(&self) -> i64 {
        match self {
            FieldValue::Integer(v) => i64::from(*v),
            FieldValue::Integer64(v) => *v,
            FieldValue::Real(v) => *v as i64,
            FieldValue::Text(s) => i64::from(crate::computed::leading_int(s)),
            FieldValue::DateTime(_) => 0,
        }
    }

    /// Floating-point view
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Integer(v) => f64::from(*v),
            FieldValue::Integer64(v) => *v as f64,
            FieldValue::Real(v) => *v,
            FieldValue::Text(s) => s.parse().unwrap_or(0.0),
            FieldValue::DateTime(_) => 0.0,
        }
    }

    /// Text view; numeric values are formatted, timestamps rendered as
    /// `YYYY/MM/DD HH:MM:SS`
    pub fn as_string(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Integer(v) => Cow::Owned(v.to_string()),
            FieldValue::Integer64(v) => Cow::Owned(v.to_string()),
            FieldValue::Real(v) => Cow::Owned(v.to_string()),
            FieldValue::DateTime(dt) => Cow::Owned(dt.format("%Y/%m/%d %H:%M:%S").to_string()),
        }
    }

    /// JSON view, used by attribute-filter evaluation
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Integer(v) => serde_json::Value::from(*v),
            FieldValue::Integer64(v) => serde_json::Value::from(*v),
            FieldValue::Real(v) => serde_json::Value::from(*v),
            FieldValue::Text(s) => serde_json::Value::from(s.as_str()),
            FieldValue::DateTime(dt) => {
                serde_json::Value::from(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

/// One output row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    /// Record id: the entity id, or the way id for a way-derived record
    pub fid: i64,
    fields: Vec<Option<FieldValue>>,
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// Creates a feature with `field_count` unset slots
    pub fn new(field_count: usize) -> Self {
        Self {
            fid: 0,
            fields: vec![None; field_count],
            geometry: None,
        }
    }

    /// Number of field slots
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Sets a field slot; out-of-range indexes are ignored
    pub fn set_field(&mut self, index: usize, value: FieldValue) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Clears a field slot
    pub fn unset_field(&mut self, index: usize) {
        if let Some(slot) = self.fields.get_mut(index) {
            *slot = None;
        }
    }

    /// Returns the field value if the slot is set
    pub fn field(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn is_field_set(&self, index: usize) -> bool {
        self.field(index).is_some()
    }

    /// Text view of a set field
    pub fn field_as_string(&self, index: usize) -> Option<Cow<'_, str>> {
        self.field(index).map(FieldValue::as_string)
    }
}

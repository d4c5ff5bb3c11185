//! Per-layer field schema
//!
//! An ordered sequence of named, typed field declarations. The field set is
//! append-only during setup and immutable during streaming. Display names
//! may be laundered (`:` replaced by `_`) but tag lookup always resolves
//! against the original key.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Integer64,
    /// 64-bit floating point
    Real,
    /// UTF-8 string
    Text,
    /// Calendar date and time
    DateTime,
}

impl FieldType {
    /// Returns the type name for log and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Integer64 => "integer64",
            FieldType::Real => "real",
            FieldType::Text => "text",
            FieldType::DateTime => "datetime",
        }
    }
}

/// Field subtype refinement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSubType {
    None,
    /// An integer field carrying a yes/no flag
    Boolean,
}

/// One field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefn {
    /// Display name, possibly laundered
    pub name: String,
    /// Original tag key, used for all tag-lookup matching
    pub tag_name: String,
    pub field_type: FieldType,
    pub sub_type: FieldSubType,
}

/// Replaces every `:` with `_`
pub fn launder_field_name(name: &str) -> String {
    name.replace(':', "_")
}

/// Ordered, index-addressable field schema for one layer
///
/// Invariant: a field name maps to exactly one index. The indexes of the
/// identifier and aggregate fields are captured at declaration time so the
/// projection hot path never does a name lookup for them.
#[derive(Debug, Clone, Default)]
pub struct LayerSchema {
    fields: Vec<FieldDefn>,
    index_by_tag: HashMap<String, usize>,
    osm_id_index: Option<usize>,
    osm_way_id_index: Option<usize>,
    other_tags_index: Option<usize>,
    all_tags_index: Option<usize>,
}

impl LayerSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field and returns its index
    ///
    /// `launder` applies only to the display name; the original name keeps
    /// feeding the lookup map.
    pub fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        sub_type: FieldSubType,
        launder: bool,
    ) -> usize {
        let display = if launder && name.contains(':') {
            launder_field_name(name)
        } else {
            name.to_string()
        };

        let index = self.fields.len();
        self.fields.push(FieldDefn {
            name: display,
            tag_name: name.to_string(),
            field_type,
            sub_type,
        });
        self.index_by_tag.entry(name.to_string()).or_insert(index);

        match name {
            "osm_id" => self.osm_id_index = Some(index),
            "osm_way_id" => self.osm_way_id_index = Some(index),
            "other_tags" => self.other_tags_index = Some(index),
            "all_tags" => self.all_tags_index = Some(index),
            _ => {}
        }

        index
    }

    /// Index of the field whose original tag name matches exactly
    pub fn field_index(&self, tag_name: &str) -> Option<usize> {
        self.index_by_tag.get(tag_name).copied()
    }

    /// Index of the field whose display name matches (setup and filter
    /// paths only, linear scan)
    pub fn display_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, index: usize) -> Option<&FieldDefn> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[FieldDefn] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn osm_id_index(&self) -> Option<usize> {
        self.osm_id_index
    }

    pub fn osm_way_id_index(&self) -> Option<usize> {
        self.osm_way_id_index
    }

    pub fn other_tags_index(&self) -> Option<usize> {
        self.other_tags_index
    }

    pub fn all_tags_index(&self) -> Option<usize> {
        self.all_tags_index
    }

    /// Aggregate target: `all_tags` when declared, else `other_tags`
    pub fn aggregate_index(&self) -> Option<usize> {
        self.all_tags_index.or(self.other_tags_index)
    }
}

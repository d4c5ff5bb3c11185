//! Tag-to-field projection
//!
//! Maps one entity's tag list onto a layer's fixed field schema: identifier
//! and metadata fields first, then one pass over the tags setting matching
//! fields and aggregating the leftovers into the `all_tags`/`other_tags`
//! field in the configured encoding.

mod escape;

pub use escape::{escape_hstore, escape_json};

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};

use crate::config::TagsFormat;
use crate::entity::{EntityInfo, Tag, TimestampValue};
use crate::feature::{Feature, FieldValue};
use crate::schema::LayerSchema;

/// Which metadata fields the layer materializes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataFlags {
    pub version: bool,
    pub timestamp: bool,
    pub uid: bool,
    pub user: bool,
    pub changeset: bool,
}

impl MetadataFlags {
    /// All metadata fields enabled
    pub fn all() -> Self {
        Self {
            version: true,
            timestamp: true,
            uid: true,
            user: true,
            changeset: true,
        }
    }
}

/// Projects entity tags and metadata onto a feature's field slots
///
/// One projector per layer; the aggregate buffer is reused across entities
/// so steady-state projection does not allocate for typical tag lists.
#[derive(Debug, Default)]
pub struct TagProjector {
    pub metadata: MetadataFlags,
    ignore_keys: HashSet<String>,
    insignificant_keys: HashSet<String>,
    aggregate: String,
}

impl TagProjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes a key (or a `ns:` prefix) from the leftover-tag aggregate
    pub fn add_ignore_key(&mut self, key: impl Into<String>) {
        self.ignore_keys.insert(key.into());
    }

    /// Marks a key as not significant enough to drive field creation;
    /// consulted by producers during schema setup, not by projection
    pub fn add_insignificant_key(&mut self, key: impl Into<String>) {
        self.insignificant_keys.insert(key.into());
    }

    pub fn is_significant(&self, key: &str) -> bool {
        !self.insignificant_keys.contains(key)
    }

    /// Whether a leftover tag belongs in the aggregate
    ///
    /// A key is excluded when it is in the ignore set, or when its namespace
    /// prefix up to and including the `:` is in the ignore set.
    pub fn belongs_in_aggregate(&self, key: &str) -> bool {
        if self.ignore_keys.contains(key) {
            return false;
        }
        match key.find(':') {
            Some(pos) => !self.ignore_keys.contains(&key[..=pos]),
            None => true,
        }
    }

    /// Populates a feature's fields from an entity
    ///
    /// `is_way_id` selects the identifier target: `osm_id` for primary
    /// entities, `osm_way_id` for way-derived records.
    #[allow(clippy::too_many_arguments)]
    pub fn project(
        &mut self,
        schema: &LayerSchema,
        format: TagsFormat,
        feature: &mut Feature,
        id: i64,
        is_way_id: bool,
        tags: &[Tag],
        info: &EntityInfo,
    ) {
        feature.fid = id;

        let id_index = if is_way_id {
            schema.osm_way_id_index()
        } else {
            schema.osm_id_index()
        };
        if let Some(index) = id_index {
            feature.set_field(index, FieldValue::Text(id.to_string()));
        }

        self.set_metadata_fields(schema, feature, info);

        self.aggregate.clear();
        let aggregate_index = schema.aggregate_index();

        for tag in tags {
            if let Some(index) = schema.field_index(&tag.key) {
                if Some(index) != schema.osm_id_index() {
                    feature.set_field(index, FieldValue::Text(tag.value.clone()));
                    // With only `other_tags` declared, mapped tags stay out
                    // of the aggregate; `all_tags` collects everything.
                    if schema.all_tags_index().is_none() {
                        continue;
                    }
                }
            }
            if aggregate_index.is_some() && self.belongs_in_aggregate(&tag.key) {
                append_aggregate_entry(&mut self.aggregate, format, &tag.key, &tag.value);
            }
        }

        if !self.aggregate.is_empty() {
            if format == TagsFormat::Json {
                self.aggregate.push('}');
            }
            if let Some(index) = aggregate_index {
                feature.set_field(index, FieldValue::Text(self.aggregate.clone()));
            }
        }
    }

    fn set_metadata_fields(&self, schema: &LayerSchema, feature: &mut Feature, info: &EntityInfo) {
        if self.metadata.version {
            if let Some(index) = schema.field_index("osm_version") {
                feature.set_field(index, FieldValue::Integer(info.version));
            }
        }
        if self.metadata.timestamp {
            if let (Some(index), Some(ts)) =
                (schema.field_index("osm_timestamp"), info.timestamp.as_ref())
            {
                if let Some(dt) = decode_timestamp(ts) {
                    feature.set_field(index, FieldValue::DateTime(dt));
                }
            }
        }
        if self.metadata.uid {
            if let Some(index) = schema.field_index("osm_uid") {
                feature.set_field(index, FieldValue::Integer64(info.uid));
            }
        }
        if self.metadata.user {
            if let Some(index) = schema.field_index("osm_user") {
                feature.set_field(index, FieldValue::Text(info.user.clone()));
            }
        }
        if self.metadata.changeset {
            if let Some(index) = schema.field_index("osm_changeset") {
                feature.set_field(index, FieldValue::Integer64(info.changeset));
            }
        }
    }
}

fn append_aggregate_entry(out: &mut String, format: TagsFormat, key: &str, value: &str) {
    match format {
        TagsFormat::HStore => {
            if !out.is_empty() {
                out.push(',');
            }
            escape_hstore(key, out);
            out.push_str("=>");
            escape_hstore(value, out);
        }
        TagsFormat::Json => {
            if out.is_empty() {
                out.push('{');
            } else {
                out.push(',');
            }
            escape_json(key, out);
            out.push(':');
            escape_json(value, out);
        }
    }
}

/// Decodes either timestamp encoding into calendar form; `None` when the
/// string form does not parse
fn decode_timestamp(ts: &TimestampValue) -> Option<NaiveDateTime> {
    match ts {
        TimestampValue::Raw(epoch) => DateTime::from_timestamp(*epoch, 0).map(|dt| dt.naive_utc()),
        TimestampValue::Parsed(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSubType, FieldType};

    fn schema_with(fields: &[&str]) -> LayerSchema {
        let mut schema = LayerSchema::new();
        for name in fields {
            schema.add_field(name, FieldType::Text, FieldSubType::None, false);
        }
        schema
    }

    #[test]
    fn test_id_targets_osm_id_or_osm_way_id() {
        let schema = schema_with(&["osm_id", "osm_way_id"]);
        let mut projector = TagProjector::new();

        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            42,
            false,
            &[],
            &EntityInfo::default(),
        );
        assert_eq!(feature.fid, 42);
        assert_eq!(feature.field_as_string(0).unwrap(), "42");
        assert!(!feature.is_field_set(1));

        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            7,
            true,
            &[],
            &EntityInfo::default(),
        );
        assert_eq!(feature.fid, 7);
        assert!(!feature.is_field_set(0));
        assert_eq!(feature.field_as_string(1).unwrap(), "7");
    }

    #[test]
    fn test_tag_matching_field_is_set() {
        let schema = schema_with(&["highway", "name"]);
        let mut projector = TagProjector::new();
        let tags = vec![
            Tag::new("highway", "residential"),
            Tag::new("name", "Main St"),
        ];
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            42,
            false,
            &tags,
            &EntityInfo::default(),
        );
        assert_eq!(feature.field_as_string(0).unwrap(), "residential");
        assert_eq!(feature.field_as_string(1).unwrap(), "Main St");
    }

    #[test]
    fn test_other_tags_excludes_mapped_fields() {
        let schema = schema_with(&["highway", "other_tags"]);
        let mut projector = TagProjector::new();
        let tags = vec![
            Tag::new("highway", "residential"),
            Tag::new("surface", "asphalt"),
        ];
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            1,
            false,
            &tags,
            &EntityInfo::default(),
        );
        assert_eq!(
            feature.field_as_string(1).unwrap(),
            "\"surface\"=>\"asphalt\""
        );
    }

    #[test]
    fn test_all_tags_includes_mapped_fields() {
        let schema = schema_with(&["highway", "all_tags"]);
        let mut projector = TagProjector::new();
        let tags = vec![Tag::new("highway", "residential")];
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            1,
            false,
            &tags,
            &EntityInfo::default(),
        );
        assert_eq!(feature.field_as_string(0).unwrap(), "residential");
        assert_eq!(
            feature.field_as_string(1).unwrap(),
            "\"highway\"=>\"residential\""
        );
    }

    #[test]
    fn test_json_aggregate_encoding() {
        let schema = schema_with(&["other_tags"]);
        let mut projector = TagProjector::new();
        let tags = vec![Tag::new("name", "Main\nSt"), Tag::new("ref", "A1")];
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::Json,
            &mut feature,
            1,
            false,
            &tags,
            &EntityInfo::default(),
        );
        assert_eq!(
            feature.field_as_string(0).unwrap(),
            "{\"name\":\"Main\\nSt\",\"ref\":\"A1\"}"
        );
    }

    #[test]
    fn test_ignore_key_and_namespace_prefix() {
        let mut projector = TagProjector::new();
        projector.add_ignore_key("created_by");
        projector.add_ignore_key("note:");
        assert!(!projector.belongs_in_aggregate("created_by"));
        assert!(!projector.belongs_in_aggregate("note:city"));
        assert!(projector.belongs_in_aggregate("note")); // exact key not ignored
        assert!(projector.belongs_in_aggregate("name:en"));
    }

    #[test]
    fn test_no_aggregate_field_skips_aggregation() {
        let schema = schema_with(&["highway"]);
        let mut projector = TagProjector::new();
        let tags = vec![Tag::new("surface", "asphalt")];
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            1,
            false,
            &tags,
            &EntityInfo::default(),
        );
        assert!(!feature.is_field_set(0));
    }

    #[test]
    fn test_metadata_fields_follow_flags() {
        let mut schema = LayerSchema::new();
        schema.add_field("osm_version", FieldType::Integer, FieldSubType::None, false);
        schema.add_field("osm_uid", FieldType::Integer64, FieldSubType::None, false);
        schema.add_field("osm_user", FieldType::Text, FieldSubType::None, false);

        let mut projector = TagProjector::new();
        projector.metadata.version = true;
        projector.metadata.user = true;
        // uid intentionally left off

        let info = EntityInfo {
            version: 3,
            uid: 99,
            user: "mapper".into(),
            ..Default::default()
        };
        let mut feature = Feature::new(schema.len());
        projector.project(
            &schema,
            TagsFormat::HStore,
            &mut feature,
            1,
            false,
            &[],
            &info,
        );
        assert_eq!(feature.field(0), Some(&FieldValue::Integer(3)));
        assert!(!feature.is_field_set(1));
        assert_eq!(feature.field_as_string(2).unwrap(), "mapper");
    }

    #[test]
    fn test_timestamp_both_encodings() {
        let raw = decode_timestamp(&TimestampValue::Raw(0)).unwrap();
        assert_eq!(raw.format("%Y-%m-%d %H:%M:%S").to_string(), "1970-01-01 00:00:00");

        let parsed =
            decode_timestamp(&TimestampValue::Parsed("2024-06-01T12:30:00Z".into())).unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-06-01 12:30:00");

        assert!(decode_timestamp(&TimestampValue::Parsed("not a date".into())).is_none());
    }
}

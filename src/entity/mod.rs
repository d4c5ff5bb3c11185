//! Entity stream model
//!
//! A tagged geographic entity as delivered by the upstream chunked parser:
//! a numeric id, an ordered key/value tag list (keys are not guaranteed
//! unique within one entity) and optional authorship metadata. The parser
//! owns the wire format; this crate only consumes the decoded shape.

use crate::feature::Geometry;

/// A single key/value tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag key (may repeat within one entity)
    pub key: String,
    /// Tag value
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Returns the value of the first tag whose key matches exactly
pub fn first_tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Entity timestamp, in whichever encoding the parser delivered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampValue {
    /// Epoch seconds, to be decoded into calendar components
    Raw(i64),
    /// Pre-decoded string, expected to be ISO 8601
    Parsed(String),
}

/// Optional authorship metadata attached to an entity
///
/// All fields are carried when the parser provides them; whether each one
/// reaches the output record is governed by the layer's metadata flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityInfo {
    pub version: i32,
    pub timestamp: Option<TimestampValue>,
    pub uid: i64,
    pub user: String,
    pub changeset: i64,
}

/// Kind of source entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

/// One decoded entity from the stream
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Entity id within its kind's id space
    pub id: i64,
    pub kind: EntityKind,
    pub tags: Vec<Tag>,
    pub info: EntityInfo,
    /// Geometry assembled by the parser, if any
    pub geometry: Option<Geometry>,
}

impl Entity {
    /// Creates an entity with no tags, metadata or geometry
    pub fn new(id: i64, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            tags: Vec::new(),
            info: EntityInfo::default(),
            geometry: None,
        }
    }

    /// Adds a tag, preserving declaration order
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(key, value));
        self
    }

    pub fn with_info(mut self, info: EntityInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

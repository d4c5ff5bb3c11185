//! One output layer
//!
//! A layer owns its field schema, tag projector, computed attributes,
//! filters and the bounded buffer of completed records. The field set and
//! attribute list are fixed after schema setup.

use crate::buffer::{FeatureBuffer, PushError};
use crate::computed::{self, ComputedAttribute, ComputedResult, ExpressionEngine};
use crate::config::TagsFormat;
use crate::entity::Entity;
use crate::feature::{Envelope, Feature};
use crate::filters::{passes_spatial_filter, Predicate, PredicateFilter};
use crate::observability::Logger;
use crate::schema::{FieldSubType, FieldType, LayerSchema};
use crate::tags::TagProjector;

/// Result of offering a record to a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Buffered, awaiting delivery
    Added,
    /// Dropped by a filter or by consumer disinterest; not an error
    Filtered,
    /// Refused: buffer over the hard threshold or allocation failure
    Rejected,
}

pub struct Layer {
    name: String,
    schema: LayerSchema,
    projector: TagProjector,
    computed: Vec<ComputedAttribute>,
    buffer: FeatureBuffer,
    user_interested: bool,
    spatial_filter: Option<Envelope>,
    attribute_filter: Option<Vec<Predicate>>,
    has_warned_overflow: bool,
    reset_allowed: bool,
}

impl Layer {
    pub(super) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: LayerSchema::new(),
            projector: TagProjector::new(),
            computed: Vec::new(),
            buffer: FeatureBuffer::new(),
            user_interested: true,
            spatial_filter: None,
            attribute_filter: None,
            has_warned_overflow: false,
            reset_allowed: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &LayerSchema {
        &self.schema
    }

    pub fn projector(&self) -> &TagProjector {
        &self.projector
    }

    /// Mutable projector access for schema-setup configuration (ignore
    /// keys, metadata flags)
    pub fn projector_mut(&mut self) -> &mut TagProjector {
        &mut self.projector
    }

    pub fn computed_attributes(&self) -> &[ComputedAttribute] {
        &self.computed
    }

    /// Whether the consumer wants this layer's records at all
    pub fn set_user_interested(&mut self, interested: bool) {
        self.user_interested = interested;
    }

    pub fn is_user_interested(&self) -> bool {
        self.user_interested
    }

    /// Appends a field; declaring a metadata field enables the matching
    /// projection flag
    pub(super) fn add_field(
        &mut self,
        name: &str,
        field_type: FieldType,
        sub_type: FieldSubType,
        launder: bool,
    ) -> usize {
        match name {
            "osm_version" => self.projector.metadata.version = true,
            "osm_timestamp" => self.projector.metadata.timestamp = true,
            "osm_uid" => self.projector.metadata.uid = true,
            "osm_user" => self.projector.metadata.user = true,
            "osm_changeset" => self.projector.metadata.changeset = true,
            _ => {}
        }
        self.schema.add_field(name, field_type, sub_type, launder)
    }

    pub(super) fn add_computed_attribute(
        &mut self,
        engine: &mut dyn ExpressionEngine,
        name: &str,
        field_type: FieldType,
        expr: &str,
    ) -> ComputedResult<()> {
        let attr = computed::declare(&mut self.schema, engine, name, field_type, expr)?;
        self.computed.push(attr);
        Ok(())
    }

    pub fn set_spatial_filter(&mut self, filter: Option<Envelope>) {
        self.spatial_filter = filter;
    }

    pub fn spatial_filter(&self) -> Option<&Envelope> {
        self.spatial_filter.as_ref()
    }

    pub(super) fn set_attribute_filter(&mut self, predicates: Option<Vec<Predicate>>) {
        self.attribute_filter = predicates;
    }

    pub fn attribute_filter(&self) -> Option<&[Predicate]> {
        self.attribute_filter.as_deref()
    }

    /// Evaluates only the attribute filter (no filter passes)
    pub fn evaluate_attribute_filter(&self, feature: &Feature) -> bool {
        match &self.attribute_filter {
            Some(predicates) => PredicateFilter::matches(feature, &self.schema, predicates),
            None => true,
        }
    }

    /// Projects one entity into a record, evaluates computed attributes and
    /// offers the record to the buffer
    pub(super) fn process_entity(
        &mut self,
        entity: &Entity,
        is_way_id: bool,
        format: TagsFormat,
        engine: Option<&mut dyn ExpressionEngine>,
    ) -> AddOutcome {
        let mut feature = Feature::new(self.schema.len());
        feature.geometry = entity.geometry.clone();

        self.projector.project(
            &self.schema,
            format,
            &mut feature,
            entity.id,
            is_way_id,
            &entity.tags,
            &entity.info,
        );

        if !self.computed.is_empty() {
            if let Some(engine) = engine {
                computed::evaluate_all(
                    &self.computed,
                    &self.schema,
                    &mut feature,
                    &entity.tags,
                    engine,
                );
            }
        }

        self.add_feature(feature, false, true)
    }

    /// Offers a completed record to the buffer
    ///
    /// Filter evaluation runs here unless the caller already did it. A
    /// record failing a filter, or arriving while the consumer is not
    /// interested, is dropped silently.
    pub fn add_feature(
        &mut self,
        feature: Feature,
        attr_filter_already_evaluated: bool,
        check_threshold: bool,
    ) -> AddOutcome {
        if !self.user_interested {
            return AddOutcome::Filtered;
        }

        let passes = passes_spatial_filter(feature.geometry.as_ref(), self.spatial_filter.as_ref())
            && (attr_filter_already_evaluated || self.evaluate_attribute_filter(&feature));
        if !passes {
            return AddOutcome::Filtered;
        }

        match self.buffer.try_push(feature, check_threshold) {
            Ok(()) => AddOutcome::Added,
            Err(PushError::Overflow) => {
                if !self.has_warned_overflow {
                    Logger::warn(
                        "buffer_overflow",
                        &[
                            ("layer", self.name.as_str()),
                            ("hint", "switch to interleaved reading to bound memory"),
                        ],
                    );
                    self.has_warned_overflow = true;
                }
                AddOutcome::Rejected
            }
            Err(PushError::OutOfMemory) => {
                Logger::error("buffer_allocation_failed", &[("layer", self.name.as_str())]);
                AddOutcome::Rejected
            }
        }
    }

    pub fn take_next(&mut self) -> Option<Feature> {
        self.buffer.take_next()
    }

    pub fn buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffered record count (scheduler fill-level input)
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub(super) fn delivery_started(&self) -> bool {
        self.buffer.delivery_started()
    }

    pub(super) fn allow_reset(&mut self) {
        self.reset_allowed = true;
    }

    pub(super) fn reset_allowed(&self) -> bool {
        self.reset_allowed
    }

    /// Drops buffered records and forbids further resets until the next
    /// delivery attempt
    pub(super) fn force_reset_reading(&mut self) {
        self.buffer.clear();
        self.reset_allowed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityKind};
    use crate::feature::Geometry;
    use serde_json::json;

    fn layer_with_fields(fields: &[&str]) -> Layer {
        let mut layer = Layer::new("points");
        for name in fields {
            layer.add_field(name, FieldType::Text, FieldSubType::None, false);
        }
        layer
    }

    #[test]
    fn test_process_entity_end_to_end() {
        let mut layer = layer_with_fields(&["highway", "name"]);
        let entity = Entity::new(42, EntityKind::Node)
            .with_tag("highway", "residential")
            .with_tag("name", "Main St");

        let outcome = layer.process_entity(&entity, false, TagsFormat::HStore, None);
        assert_eq!(outcome, AddOutcome::Added);

        let feature = layer.take_next().unwrap();
        assert_eq!(feature.fid, 42);
        assert_eq!(feature.field_as_string(0).unwrap(), "residential");
        assert_eq!(feature.field_as_string(1).unwrap(), "Main St");
    }

    #[test]
    fn test_uninterested_layer_filters_everything() {
        let mut layer = layer_with_fields(&["name"]);
        layer.set_user_interested(false);
        let entity = Entity::new(1, EntityKind::Node).with_tag("name", "x");
        assert_eq!(
            layer.process_entity(&entity, false, TagsFormat::HStore, None),
            AddOutcome::Filtered
        );
        assert!(layer.buffer_is_empty());
    }

    #[test]
    fn test_attribute_filter_drops_silently() {
        let mut layer = layer_with_fields(&["highway"]);
        layer.set_attribute_filter(Some(vec![Predicate::eq("highway", json!("motorway"))]));

        let residential = Entity::new(1, EntityKind::Way).with_tag("highway", "residential");
        let motorway = Entity::new(2, EntityKind::Way).with_tag("highway", "motorway");

        assert_eq!(
            layer.process_entity(&residential, false, TagsFormat::HStore, None),
            AddOutcome::Filtered
        );
        assert_eq!(
            layer.process_entity(&motorway, false, TagsFormat::HStore, None),
            AddOutcome::Added
        );
        assert_eq!(layer.take_next().unwrap().fid, 2);
    }

    #[test]
    fn test_spatial_filter_envelope() {
        let mut layer = layer_with_fields(&["name"]);
        layer.set_spatial_filter(Some(Envelope::new(0.0, 0.0, 1.0, 1.0)));

        let inside = Entity::new(1, EntityKind::Node).with_geometry(Geometry::Point(0.5, 0.5));
        let outside = Entity::new(2, EntityKind::Node).with_geometry(Geometry::Point(5.0, 5.0));
        let bare = Entity::new(3, EntityKind::Node);

        assert_eq!(
            layer.process_entity(&inside, false, TagsFormat::HStore, None),
            AddOutcome::Added
        );
        assert_eq!(
            layer.process_entity(&outside, false, TagsFormat::HStore, None),
            AddOutcome::Filtered
        );
        assert_eq!(
            layer.process_entity(&bare, false, TagsFormat::HStore, None),
            AddOutcome::Filtered
        );
    }

    #[test]
    fn test_metadata_field_declaration_enables_flag() {
        let mut layer = Layer::new("points");
        assert!(!layer.projector().metadata.version);
        layer.add_field("osm_version", FieldType::Integer, FieldSubType::None, false);
        assert!(layer.projector().metadata.version);
    }
}

//! Streaming data source
//!
//! Owns the layer set, the upstream chunk driver and the cross-layer
//! delivery schedule. In normal mode each layer pulls chunks until its own
//! buffer has something; in interleaved mode a single pass over the stream
//! feeds every layer and consumers are redirected so no buffer grows past
//! the switch threshold.

mod layer;

pub use layer::{AddOutcome, Layer};

use crate::buffer::SWITCH_THRESHOLD;
use crate::computed::{ComputedResult, ExpressionEngine, SqliteEngine};
use crate::config::{OsmSourceConfig, TagsFormat};
use crate::entity::Entity;
use crate::feature::{Envelope, Feature};
use crate::filters::Predicate;
use crate::observability::Logger;
use crate::schema::{FieldSubType, FieldType};

/// Result of one delivery attempt on a layer
#[derive(Debug, PartialEq)]
pub enum NextFeature {
    /// The layer's oldest pending record
    Feature(Feature),
    /// Another layer holds the stream position; drain it first (its index
    /// is given) and come back
    Redirect(usize),
    /// The stream is exhausted for this layer
    EndOfStream,
}

/// Upstream chunk supplier
///
/// One call parses the next chunk of the input and pushes the entities it
/// produced through the sink; it returns `false` once the input is
/// exhausted. `target_layer` is the layer whose consumer asked, so a driver
/// that indexes its input may skip irrelevant sections; streaming drivers
/// ignore it.
pub trait ChunkDriver {
    fn pull_next_chunk(&mut self, target_layer: usize, sink: &mut dyn EntitySink) -> bool;

    /// Rewinds the input to the beginning
    fn reset_stream_position(&mut self);
}

/// Where a driver's parsed entities go
pub trait EntitySink {
    /// Offers one entity to a layer; `is_way_id` marks way-derived records
    /// so the identifier lands in `osm_way_id` instead of `osm_id`
    fn push_entity(&mut self, layer_index: usize, entity: &Entity, is_way_id: bool) -> AddOutcome;
}

struct SourceSink<'a> {
    layers: &'a mut [Layer],
    tags_format: TagsFormat,
    engine: Option<&'a mut (dyn ExpressionEngine + 'a)>,
}

impl EntitySink for SourceSink<'_> {
    fn push_entity(&mut self, layer_index: usize, entity: &Entity, is_way_id: bool) -> AddOutcome {
        let Some(layer) = self.layers.get_mut(layer_index) else {
            return AddOutcome::Filtered;
        };
        let engine = self
            .engine
            .as_deref_mut()
            .map(|e| e as &mut dyn ExpressionEngine);
        layer.process_entity(entity, is_way_id, self.tags_format, engine)
    }
}

/// The data source: layers, driver and delivery schedule
pub struct OsmSource {
    config: OsmSourceConfig,
    layers: Vec<Layer>,
    driver: Box<dyn ChunkDriver>,
    /// Layer currently owning the stream position (interleaved mode only)
    current_layer: Option<usize>,
    engine: Option<Box<dyn ExpressionEngine>>,
    native_extent: Option<Envelope>,
}

impl OsmSource {
    pub fn new(config: OsmSourceConfig, driver: Box<dyn ChunkDriver>) -> Self {
        Self {
            config,
            layers: Vec::new(),
            driver,
            current_layer: None,
            engine: None,
            native_extent: None,
        }
    }

    pub fn config(&self) -> &OsmSourceConfig {
        &self.config
    }

    /// Appends a layer during schema setup; returns its index
    pub fn add_layer(&mut self, name: impl Into<String>) -> usize {
        self.layers.push(Layer::new(name));
        self.layers.len() - 1
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Appends a field to a layer, laundering the name per configuration
    pub fn add_field(
        &mut self,
        layer_index: usize,
        name: &str,
        field_type: FieldType,
        sub_type: FieldSubType,
    ) -> Option<usize> {
        let launder = self.config.attribute_name_laundering;
        self.layers
            .get_mut(layer_index)
            .map(|layer| layer.add_field(name, field_type, sub_type, launder))
    }

    /// Replaces the expression engine backing computed attributes
    ///
    /// Must happen before the first attribute declaration; afterwards the
    /// engine holds prepared state and is not replaceable.
    pub fn set_expression_engine(&mut self, engine: Box<dyn ExpressionEngine>) {
        self.engine = Some(engine);
    }

    /// Declares a computed attribute on a layer, opening the default
    /// engine on first use
    pub fn add_computed_attribute(
        &mut self,
        layer_index: usize,
        name: &str,
        field_type: FieldType,
        expr: &str,
    ) -> ComputedResult<()> {
        if self.engine.is_none() {
            self.engine = Some(Box::new(SqliteEngine::open_in_memory()?));
        }
        let (Some(engine), Some(layer)) = (
            self.engine.as_deref_mut(),
            self.layers.get_mut(layer_index),
        ) else {
            return Ok(());
        };
        let result = layer.add_computed_attribute(engine, name, field_type, expr);
        if let Err(err) = &result {
            Logger::warn(
                "computed_attribute_rejected",
                &[("name", name), ("error", &err.to_string())],
            );
        }
        result
    }

    /// Delivers the next record of a layer, or says where to look instead
    pub fn get_next(&mut self, layer_index: usize) -> NextFeature {
        if layer_index >= self.layers.len() {
            return NextFeature::EndOfStream;
        }
        self.layers[layer_index].allow_reset();

        if self.layers[layer_index].buffer_is_empty() {
            if self.config.is_interleaved() {
                match self.current_layer {
                    None => self.current_layer = Some(layer_index),
                    Some(current) if current != layer_index => {
                        return NextFeature::Redirect(current);
                    }
                    _ => {}
                }

                // A sibling layer sitting over the switch threshold must
                // drain before the stream advances.
                if let Some(other) = self.layer_over_switch_threshold(layer_index) {
                    self.switch_current(layer_index, other, "backpressure");
                    return NextFeature::Redirect(other);
                }

                self.pull_chunk(layer_index);

                if self.layers[layer_index].buffer_is_empty() {
                    if let Some(other) = self.non_empty_layer(layer_index) {
                        self.switch_current(layer_index, other, "exhausted");
                        return NextFeature::Redirect(other);
                    }
                    self.current_layer = None;
                    return NextFeature::EndOfStream;
                }
            } else {
                loop {
                    let more = self.pull_chunk(layer_index);
                    if !self.layers[layer_index].buffer_is_empty() {
                        break;
                    }
                    if !more {
                        return NextFeature::EndOfStream;
                    }
                }
            }
        }

        match self.layers[layer_index].take_next() {
            Some(feature) => NextFeature::Feature(feature),
            None => NextFeature::EndOfStream,
        }
    }

    /// Rewinds delivery for a layer (normal mode only)
    ///
    /// Interleaved mode makes exactly one pass over the input; rewinding a
    /// single layer there is not possible. Repeated calls with no delivery
    /// in between are no-ops.
    pub fn reset_reading(&mut self, layer_index: usize) {
        if self.config.is_interleaved() {
            return;
        }
        let allowed = self
            .layers
            .get(layer_index)
            .is_some_and(Layer::reset_allowed);
        if allowed {
            self.force_reset_reading();
        }
    }

    fn force_reset_reading(&mut self) {
        self.driver.reset_stream_position();
        for layer in &mut self.layers {
            layer.force_reset_reading();
        }
        self.current_layer = None;
    }

    /// Installs (or clears) a layer's attribute filter
    ///
    /// Setting the same filter again is a no-op. In normal mode an early
    /// change rewinds the stream so already-buffered records get
    /// re-filtered; once delivery has started the new filter only applies
    /// to records not yet buffered.
    pub fn set_attribute_filter(&mut self, layer_index: usize, predicates: Option<Vec<Predicate>>) {
        let interleaved = self.config.is_interleaved();
        let Some(layer) = self.layers.get_mut(layer_index) else {
            return;
        };
        if layer.attribute_filter() == predicates.as_deref() {
            return;
        }
        let deferred = layer.delivery_started();
        layer.set_attribute_filter(predicates);
        if deferred {
            Logger::warn(
                "attribute_filter_deferred",
                &[
                    ("layer", self.layers[layer_index].name()),
                    ("hint", "filter not taken into account on already buffered records"),
                ],
            );
        } else if !interleaved {
            self.force_reset_reading();
        }
    }

    pub fn set_spatial_filter(&mut self, layer_index: usize, filter: Option<Envelope>) {
        if let Some(layer) = self.layers.get_mut(layer_index) {
            layer.set_spatial_filter(filter);
        }
    }

    /// Extent advertised by the input's header, when it carries one
    pub fn extent(&self) -> Option<Envelope> {
        self.native_extent
    }

    pub fn set_native_extent(&mut self, extent: Option<Envelope>) {
        self.native_extent = extent;
    }

    /// Layer currently owning the stream position (interleaved mode)
    pub fn current_layer(&self) -> Option<usize> {
        self.current_layer
    }

    fn pull_chunk(&mut self, target_layer: usize) -> bool {
        let mut sink = SourceSink {
            layers: &mut self.layers,
            tags_format: self.config.tags_format,
            engine: self
                .engine
                .as_deref_mut()
                .map(|e| e as &mut (dyn ExpressionEngine + '_)),
        };
        self.driver.pull_next_chunk(target_layer, &mut sink)
    }

    fn layer_over_switch_threshold(&self, except: usize) -> Option<usize> {
        self.layers
            .iter()
            .enumerate()
            .find(|(i, layer)| *i != except && layer.pending() > SWITCH_THRESHOLD)
            .map(|(i, _)| i)
    }

    fn non_empty_layer(&self, except: usize) -> Option<usize> {
        self.layers
            .iter()
            .enumerate()
            .find(|(i, layer)| *i != except && !layer.buffer_is_empty())
            .map(|(i, _)| i)
    }

    fn switch_current(&mut self, from: usize, to: usize, reason: &str) {
        Logger::trace(
            "interleave_switch",
            &[
                ("from", self.layers[from].name()),
                ("to", self.layers[to].name()),
                ("reason", reason),
            ],
        );
        self.current_layer = Some(to);
    }
}

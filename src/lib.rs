//! osmstream - a bounded-memory converter from tagged OSM entity streams
//! to typed per-layer records
//!
//! The entity stream is arbitrarily large and consumed incrementally from a
//! chunked parser; this crate owns the per-layer buffering, the tag-to-field
//! projection, the computed-attribute evaluation and the cross-layer
//! interleaving schedule. It does not decode any wire format and does not
//! build spatial indexes.

pub mod buffer;
pub mod computed;
pub mod config;
pub mod entity;
pub mod feature;
pub mod filters;
pub mod observability;
pub mod schema;
pub mod source;
pub mod tags;

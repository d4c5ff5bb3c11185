//! Hardcoded z-order fast path
//!
//! The rendering-order formula is frequent enough that matching it by exact
//! text at declaration time and computing it directly pays off; evaluation
//! bypasses the expression engine entirely.

use std::borrow::Cow;

use crate::entity::{first_tag_value, Tag};
use crate::feature::Feature;

use super::{leading_int, BoundParameter};

/// Canonical z-order expression; an attribute declared with exactly this
/// text (and integer type) takes the fast path
pub const Z_ORDER_SQL: &str =
    "SELECT (CASE [highway] WHEN 'minor' THEN 3 WHEN 'road' THEN 3 \
     WHEN 'unclassified' THEN 3 WHEN 'residential' THEN 3 WHEN \
     'tertiary_link' THEN 4 WHEN 'tertiary' THEN 4 WHEN 'secondary_link' \
     THEN 6 WHEN 'secondary' THEN 6 WHEN 'primary_link' THEN 7 WHEN \
     'primary' THEN 7 WHEN 'trunk_link' THEN 8 WHEN 'trunk' THEN 8 \
     WHEN 'motorway_link' THEN 9 WHEN 'motorway' THEN 9 ELSE 0 END) + \
     (CASE WHEN [bridge] IN ('yes', 'true', '1') THEN 10 ELSE 0 END) + \
     (CASE WHEN [tunnel] IN ('yes', 'true', '1') THEN -10 ELSE 0 END) + \
     (CASE WHEN [railway] IS NOT NULL THEN 5 ELSE 0 END) + \
     (CASE WHEN [layer] IS NOT NULL THEN 10 * CAST([layer] AS INTEGER) \
     ELSE 0 END)";

/// Resolves one input: the projected field when the layer declared it
/// (unset field stays absent, no tag fallback), else a raw first-match tag
/// lookup
fn resolve<'a>(
    param: Option<&BoundParameter>,
    key: &str,
    feature: &'a Feature,
    tags: &'a [Tag],
) -> Option<Cow<'a, str>> {
    match param {
        Some(BoundParameter::Field(index)) => feature.field_as_string(*index),
        _ => first_tag_value(tags, key).map(Cow::Borrowed),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "yes" | "true" | "1")
}

/// Computes the z-order score directly
///
/// `params` is the bound-parameter list extracted from the canonical
/// expression: highway, bridge, tunnel, railway, layer (in that order).
pub fn compute_z_order(params: &[BoundParameter], feature: &Feature, tags: &[Tag]) -> i32 {
    let mut z_order = 0;

    if let Some(highway) = resolve(params.first(), "highway", feature, tags) {
        z_order += match highway.as_ref() {
            "minor" | "road" | "unclassified" | "residential" => 3,
            "tertiary_link" | "tertiary" => 4,
            "secondary_link" | "secondary" => 6,
            "primary_link" | "primary" => 7,
            "trunk_link" | "trunk" => 8,
            "motorway_link" | "motorway" => 9,
            _ => 0,
        };
    }

    if let Some(bridge) = resolve(params.get(1), "bridge", feature, tags) {
        if is_truthy(&bridge) {
            z_order += 10;
        }
    }

    if let Some(tunnel) = resolve(params.get(2), "tunnel", feature, tags) {
        if is_truthy(&tunnel) {
            z_order -= 10;
        }
    }

    if resolve(params.get(3), "railway", feature, tags).is_some() {
        z_order += 5;
    }

    if let Some(layer) = resolve(params.get(4), "layer", feature, tags) {
        z_order += 10 * leading_int(&layer);
    }

    z_order
}

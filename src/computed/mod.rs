//! Computed attributes
//!
//! A layer may declare synthetic fields whose values derive from
//! already-projected fields or raw tag values through a small parametrized
//! expression. Expressions are compiled once at declaration time against an
//! embedded engine; one specific rendering-order formula is recognized by
//! exact text and evaluated directly instead.

mod engine;
mod errors;
mod zorder;

pub use engine::{BindValue, ExprHandle, ExpressionEngine, OutputValue, SqliteEngine};
pub use errors::{ComputedError, ComputedResult};
pub use zorder::Z_ORDER_SQL;

use crate::entity::{first_tag_value, Tag};
use crate::feature::{Feature, FieldValue};
use crate::observability::Logger;
use crate::schema::{FieldSubType, FieldType, LayerSchema};

/// What a positional placeholder was resolved to at declaration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundParameter {
    /// A layer field, bound per its declared type
    Field(usize),
    /// A raw tag key, bound as text by first exact match
    Tag(String),
}

/// One declared computed attribute
#[derive(Debug)]
pub struct ComputedAttribute {
    pub name: String,
    pub field_type: FieldType,
    /// Source expression as declared, before placeholder rewriting
    pub expression: String,
    /// Target field index in the layer schema
    pub field_index: usize,
    /// Placeholders in left-to-right extraction order
    pub params: Vec<BoundParameter>,
    pub handle: ExprHandle,
    pub hardcoded_z_order: bool,
}

/// Parses an integer from the leading digits of a string (optional sign);
/// anything unparseable is 0
pub fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits: &str = {
        let end = rest
            .as_bytes()
            .iter()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(rest.len());
        &rest[..end]
    };
    match digits.parse::<i32>() {
        Ok(v) if negative => -v,
        Ok(v) => v,
        Err(_) => 0,
    }
}

/// Rewrites `[name]` placeholders into positional `?` parameters
///
/// Returns the rewritten expression and the extracted names in order. A
/// `[` preceded by a backslash is literal; a `[` with no closing `]` stops
/// extraction and leaves the remainder as literal text. Escaping
/// backslashes are removed afterwards.
pub fn rewrite_expression(expr: &str) -> (String, Vec<String>) {
    let mut sql = expr.to_string();
    let mut names = Vec::new();
    let mut search_from = 0;

    loop {
        let Some(rel) = sql[search_from..].find('[') else {
            break;
        };
        let pos = search_from + rel;
        search_from = pos + 1;
        if pos > 0 && sql.as_bytes()[pos - 1] != b'\\' {
            let rest = &sql[pos + 1..];
            let Some(end) = rest.find(']') else {
                break;
            };
            let name = rest[..end].to_string();
            sql = format!("{}?{}", &sql[..pos], &sql[pos + 1 + end + 1..]);
            names.push(name);
        }
    }

    // Unescape literal brackets.
    let mut unescape_from = 0;
    loop {
        let Some(rel) = sql[unescape_from..].find('\\') else {
            break;
        };
        let pos = unescape_from + rel;
        if pos == sql.len() - 1 {
            break;
        }
        sql.remove(pos);
        unescape_from = pos;
    }

    (sql, names)
}

/// Declares a computed attribute against the given layer schema
///
/// On success the attribute's target field has been appended to the schema.
/// On failure nothing is modified and the error is recoverable.
pub fn declare(
    schema: &mut LayerSchema,
    engine: &mut dyn ExpressionEngine,
    name: &str,
    field_type: FieldType,
    expr: &str,
) -> ComputedResult<ComputedAttribute> {
    if schema.field_index(name).is_some() || schema.display_index(name).is_some() {
        return Err(ComputedError::NameCollision(name.to_string()));
    }

    let hardcoded_z_order = field_type == FieldType::Integer && expr == Z_ORDER_SQL;

    let (sql, names) = rewrite_expression(expr);
    let params = names
        .into_iter()
        .map(|n| match schema.field_index(&n).or_else(|| schema.display_index(&n)) {
            Some(index) => BoundParameter::Field(index),
            None => BoundParameter::Tag(n),
        })
        .collect();

    Logger::trace("computed_attribute_sql", &[("name", name), ("sql", &sql)]);

    let handle = engine.prepare(&sql)?;
    let field_index = schema.add_field(name, field_type, FieldSubType::None, false);

    Ok(ComputedAttribute {
        name: name.to_string(),
        field_type,
        expression: expr.to_string(),
        field_index,
        params,
        handle,
        hardcoded_z_order,
    })
}

/// Evaluates every computed attribute, in declaration order
///
/// Failures never propagate: a parameter that binds badly or an expression
/// that yields no usable result simply leaves the target field unset.
pub fn evaluate_all(
    attributes: &[ComputedAttribute],
    schema: &LayerSchema,
    feature: &mut Feature,
    tags: &[Tag],
    engine: &mut dyn ExpressionEngine,
) {
    for attr in attributes {
        if attr.hardcoded_z_order {
            let z = zorder::compute_z_order(&attr.params, feature, tags);
            feature.set_field(attr.field_index, FieldValue::Integer(z));
            continue;
        }
        evaluate_one(attr, schema, feature, tags, engine);
        engine.reset(attr.handle);
    }
}

fn evaluate_one(
    attr: &ComputedAttribute,
    schema: &LayerSchema,
    feature: &mut Feature,
    tags: &[Tag],
    engine: &mut dyn ExpressionEngine,
) {
    for (position, param) in attr.params.iter().enumerate() {
        let bound = match param {
            BoundParameter::Field(index) => match feature.field(*index) {
                None => engine.bind(attr.handle, position, BindValue::Null),
                Some(value) => {
                    let field_type = schema
                        .field(*index)
                        .map(|f| f.field_type)
                        .unwrap_or(FieldType::Text);
                    match field_type {
                        FieldType::Integer => engine.bind(
                            attr.handle,
                            position,
                            BindValue::Integer(value.as_i64() as i32),
                        ),
                        FieldType::Integer64 => engine.bind(
                            attr.handle,
                            position,
                            BindValue::Integer64(value.as_i64()),
                        ),
                        FieldType::Real => {
                            engine.bind(attr.handle, position, BindValue::Real(value.as_f64()))
                        }
                        FieldType::Text | FieldType::DateTime => {
                            let text = value.as_string();
                            engine.bind(attr.handle, position, BindValue::Text(&text))
                        }
                    }
                }
            },
            BoundParameter::Tag(key) => match first_tag_value(tags, key) {
                Some(value) => engine.bind(attr.handle, position, BindValue::Text(value)),
                None => engine.bind(attr.handle, position, BindValue::Null),
            },
        };
        if bound.is_err() {
            return;
        }
    }

    if let Ok(Some(output)) = engine.step(attr.handle) {
        let value = match output {
            OutputValue::Integer(v) => FieldValue::Integer64(v),
            OutputValue::Real(v) => FieldValue::Real(v),
            OutputValue::Text(s) => FieldValue::Text(s),
        };
        feature.set_field(attr.field_index, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_simple_placeholders() {
        let (sql, names) = rewrite_expression("SELECT [a] + [b]");
        assert_eq!(sql, "SELECT ? + ?");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_rewrite_escaped_bracket_is_literal() {
        let (sql, names) = rewrite_expression("SELECT '\\[not me]' || [x]");
        assert_eq!(sql, "SELECT '[not me]' || ?");
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_rewrite_unmatched_bracket_stops_extraction() {
        let (sql, names) = rewrite_expression("SELECT [a] + [oops");
        assert_eq!(sql, "SELECT ? + [oops");
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_rewrite_z_order_extracts_six_names() {
        let (sql, names) = rewrite_expression(Z_ORDER_SQL);
        assert!(!sql.contains('['));
        assert_eq!(
            names,
            vec!["highway", "bridge", "tunnel", "railway", "layer", "layer"]
        );
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("2"), 2);
        assert_eq!(leading_int("-3"), -3);
        assert_eq!(leading_int("+4"), 4);
        assert_eq!(leading_int("2a"), 2);
        assert_eq!(leading_int("  5"), 5);
        assert_eq!(leading_int("a2"), 0);
        assert_eq!(leading_int(""), 0);
    }

    #[test]
    fn test_declare_rejects_name_collision() {
        let mut schema = LayerSchema::new();
        schema.add_field("z_order", FieldType::Integer, FieldSubType::None, false);
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let err = declare(
            &mut schema,
            &mut engine,
            "z_order",
            FieldType::Integer,
            "SELECT 1",
        )
        .unwrap_err();
        assert!(matches!(err, ComputedError::NameCollision(_)));
        // Schema unchanged on rejection
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_declare_rejects_bad_expression() {
        let mut schema = LayerSchema::new();
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let err = declare(
            &mut schema,
            &mut engine,
            "broken",
            FieldType::Integer,
            "SELEKT oops",
        )
        .unwrap_err();
        assert!(matches!(err, ComputedError::Prepare(_)));
        assert_eq!(schema.len(), 0);
    }

    #[test]
    fn test_declare_detects_fast_path_only_for_integer() {
        let mut schema = LayerSchema::new();
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let attr = declare(
            &mut schema,
            &mut engine,
            "z_order",
            FieldType::Integer,
            Z_ORDER_SQL,
        )
        .unwrap();
        assert!(attr.hardcoded_z_order);

        let mut schema = LayerSchema::new();
        let attr = declare(
            &mut schema,
            &mut engine,
            "z_order",
            FieldType::Real,
            Z_ORDER_SQL,
        )
        .unwrap();
        assert!(!attr.hardcoded_z_order);
    }

    #[test]
    fn test_field_sum_evaluation() {
        let mut schema = LayerSchema::new();
        schema.add_field("a", FieldType::Integer, FieldSubType::None, false);
        schema.add_field("b", FieldType::Integer, FieldSubType::None, false);
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let attr = declare(
            &mut schema,
            &mut engine,
            "sum",
            FieldType::Integer,
            "SELECT [a] + [b]",
        )
        .unwrap();
        assert_eq!(
            attr.params,
            vec![BoundParameter::Field(0), BoundParameter::Field(1)]
        );

        let mut feature = Feature::new(schema.len());
        feature.set_field(0, FieldValue::Integer(3));
        feature.set_field(1, FieldValue::Integer(4));
        evaluate_all(
            std::slice::from_ref(&attr),
            &schema,
            &mut feature,
            &[],
            &mut engine,
        );
        assert_eq!(feature.field(attr.field_index).unwrap().as_i64(), 7);
    }

    #[test]
    fn test_unknown_placeholder_binds_null() {
        let mut schema = LayerSchema::new();
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let attr = declare(
            &mut schema,
            &mut engine,
            "maybe",
            FieldType::Text,
            "SELECT [nosuch]",
        )
        .unwrap();
        assert_eq!(attr.params, vec![BoundParameter::Tag("nosuch".into())]);

        let mut feature = Feature::new(schema.len());
        evaluate_all(
            std::slice::from_ref(&attr),
            &schema,
            &mut feature,
            &[],
            &mut engine,
        );
        // NULL result leaves the field unset
        assert!(!feature.is_field_set(attr.field_index));
    }

    #[test]
    fn test_tag_binding_first_match_wins() {
        let mut schema = LayerSchema::new();
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let attr = declare(
            &mut schema,
            &mut engine,
            "echo",
            FieldType::Text,
            "SELECT [name]",
        )
        .unwrap();

        let tags = vec![Tag::new("name", "first"), Tag::new("name", "second")];
        let mut feature = Feature::new(schema.len());
        evaluate_all(
            std::slice::from_ref(&attr),
            &schema,
            &mut feature,
            &tags,
            &mut engine,
        );
        assert_eq!(
            feature.field_as_string(attr.field_index).unwrap(),
            "first"
        );
    }

    #[test]
    fn test_reuse_across_entities_without_recompile() {
        let mut schema = LayerSchema::new();
        let mut engine = SqliteEngine::open_in_memory().unwrap();
        let attr = declare(
            &mut schema,
            &mut engine,
            "double",
            FieldType::Integer64,
            "SELECT 2 * [n]",
        )
        .unwrap();

        for n in 1..=3i64 {
            let tags = vec![Tag::new("n", n.to_string())];
            let mut feature = Feature::new(schema.len());
            evaluate_all(
                std::slice::from_ref(&attr),
                &schema,
                &mut feature,
                &tags,
                &mut engine,
            );
            assert_eq!(feature.field(attr.field_index).unwrap().as_i64(), 2 * n);
        }
    }
}

//! Type and default-value normalization
//!
//! Turns raw catalog descriptors (internal type name plus `atttypmod`) into
//! the canonical store-type strings of the schema model, and cleans up the
//! catalog's default expressions and sequence bounds.

use super::filter::split_qualified;
use crate::schema::SequenceBounds;

/// Size of the varlena header PostgreSQL folds into character typmods
const VARHDRSZ: i64 = 4;

/// Length / precision / scale declared on a column type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeModifiers {
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
}

impl TypeModifiers {
    /// Decode a raw `atttypmod` for the given internal type name.
    /// Array types decode against their element type.
    pub fn from_typmod(type_name: &str, typmod: i64) -> Self {
        let element = type_name.strip_prefix('_').unwrap_or(type_name);
        let mut mods = TypeModifiers::default();
        if typmod < 0 {
            return mods;
        }
        match element {
            "bpchar" | "varchar" if typmod >= VARHDRSZ => {
                mods.length = Some(typmod - VARHDRSZ);
            }
            "bit" | "varbit" => mods.length = Some(typmod),
            "numeric" if typmod >= VARHDRSZ => {
                let packed = typmod - VARHDRSZ;
                mods.precision = Some((packed >> 16) & 0xffff);
                // Scale is an 11-bit signed field
                mods.scale = Some(((packed & 0x7ff) ^ 1024) - 1024);
            }
            "timestamp" | "timestamptz" | "time" | "timetz" => mods.precision = Some(typmod),
            "interval" => {
                let precision = typmod & 0xffff;
                if precision != 0xffff {
                    mods.precision = Some(precision);
                }
            }
            _ => {}
        }
        mods
    }
}

/// SQL display name of an internal type name; unknown names pass through
pub fn display_name(type_name: &str) -> &str {
    match type_name {
        "bool" => "boolean",
        "int2" => "smallint",
        "int4" => "integer",
        "int8" => "bigint",
        "float4" => "real",
        "float8" => "double precision",
        "varchar" => "character varying",
        "bpchar" => "character",
        "varbit" => "bit varying",
        "timestamp" => "timestamp without time zone",
        "timestamptz" => "timestamp with time zone",
        "time" => "time without time zone",
        "timetz" => "time with time zone",
        other => other,
    }
}

fn is_temporal(display: &str) -> bool {
    display.starts_with("timestamp") || display.starts_with("time ") || display == "interval"
}

/// Render a canonical store type from an internal type name and modifiers.
///
/// ```
/// use pgreflect::introspect::normalize::{normalize_store_type, TypeModifiers};
///
/// let mods = TypeModifiers { precision: Some(5), scale: Some(2), ..Default::default() };
/// assert_eq!(normalize_store_type("numeric", &mods), "numeric(5, 2)");
/// ```
pub fn normalize_store_type(type_name: &str, modifiers: &TypeModifiers) -> String {
    if let Some(element) = type_name.strip_prefix('_') {
        return format!("{}[]", normalize_store_type(element, modifiers));
    }

    let display = display_name(type_name);
    match (modifiers.length, modifiers.precision, modifiers.scale) {
        (Some(length), _, _) => format!("{display}({length})"),
        (None, Some(precision), scale) if display == "numeric" => match scale {
            Some(scale) if scale != 0 => format!("{display}({precision}, {scale})"),
            _ => format!("{display}({precision})"),
        },
        (None, Some(precision), _) if is_temporal(display) => match display.split_once(' ') {
            Some((head, tail)) => format!("{head}({precision}) {tail}"),
            None => format!("{display}({precision})"),
        },
        _ => display.to_string(),
    }
}

/// Sequence named by a `nextval(...)` default expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextvalTarget {
    pub schema: Option<String>,
    pub name: String,
}

impl NextvalTarget {
    /// Whether this target names the given sequence. An unqualified target
    /// resolves against the default schema.
    pub fn refers_to(&self, schema: &str, name: &str, default_schema: &str) -> bool {
        self.name == name && self.schema.as_deref().unwrap_or(default_schema) == schema
    }
}

/// Split a `nextval('...')` call into its string literal and whether it
/// already carries the `::regclass` cast
fn split_nextval(expr: &str) -> Option<(&str, bool)> {
    let rest = expr.trim().strip_prefix("nextval('")?;
    let (literal, cast) = match rest.strip_suffix("'::regclass)") {
        Some(literal) => (literal, true),
        None => (rest.strip_suffix("')")?, false),
    };
    if literal.is_empty() || literal.contains('\'') {
        return None;
    }
    Some((literal, cast))
}

/// Parse the sequence a default expression advances, if it is a plain
/// `nextval` call. Unquoted identifiers fold to lower case like `regclass`
/// input does.
pub fn parse_nextval_target(expr: &str) -> Option<NextvalTarget> {
    let (literal, _) = split_nextval(expr)?;
    let mut parts: Vec<String> = split_qualified(literal)?
        .into_iter()
        .map(|(part, quoted)| if quoted { part } else { part.to_lowercase() })
        .collect();
    let name = parts.pop()?;
    match parts.len() {
        0 => Some(NextvalTarget { schema: None, name }),
        1 => Some(NextvalTarget {
            schema: parts.pop(),
            name,
        }),
        _ => None,
    }
}

/// Normalize a column default expression. Text is kept verbatim except a
/// bare `nextval('seq')`, which gains its `::regclass` cast.
pub fn normalize_default(expr: &str) -> String {
    match split_nextval(expr) {
        Some((literal, false)) => format!("nextval('{literal}'::regclass)"),
        _ => expr.to_string(),
    }
}

/// Value range of a sequence data type
fn sequence_type_range(type_name: &str) -> (i64, i64) {
    match type_name {
        "int2" | "smallint" => (i64::from(i16::MIN), i64::from(i16::MAX)),
        "int4" | "integer" => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => (i64::MIN, i64::MAX),
    }
}

/// Clear sequence parameters that equal PostgreSQL's defaults for the
/// sequence type and direction
pub fn normalize_sequence_bounds(
    type_name: &str,
    start: i64,
    increment: i64,
    min: i64,
    max: i64,
    is_cyclic: bool,
) -> SequenceBounds {
    let (type_min, type_max) = sequence_type_range(type_name);
    let ascending = increment > 0;
    let (default_min, default_max) = if ascending { (1, type_max) } else { (type_min, -1) };
    let default_start = if ascending { min } else { max };

    SequenceBounds {
        start_value: (start != default_start).then_some(start),
        increment_by: increment,
        min_value: (min != default_min).then_some(min),
        max_value: (max != default_max).then_some(max),
        is_cyclic,
    }
}

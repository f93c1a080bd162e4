//! Column type normalization.
//!
//! Maps one scanned cell plus its column's wire scan type onto a [`Value`].
//! The scan-type name is consulted first; when it is missing or unknown the
//! raw value's own shape decides. Both paths are needed: some drivers report
//! opaque or empty scan-type names.
//!
//! Numeric text that fails to parse becomes zero. This loses information
//! silently and is kept for compatibility with existing callers.

use crate::models::{RawValue, Value};

/// Normalization target chosen from a wire scan-type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFamily {
    /// Any integer width or signedness
    Integer,
    /// Any floating-point or decimal type
    Float,
    /// Character, binary and temporal types
    Text,
}

const INTEGER_NAMES: &[&str] = &[
    "int", "int2", "int4", "int8", "integer", "smallint", "mediumint", "tinyint", "bigint",
    "serial", "bigserial", "smallserial", "oid", "year", "nullint64", "nullint32", "nullint16",
];

const FLOAT_NAMES: &[&str] = &[
    "float", "float4", "float8", "real", "double", "double precision", "numeric", "decimal",
    "nullfloat64",
];

const TEXT_NAMES: &[&str] = &[
    "text", "varchar", "char", "bpchar", "name", "bytea", "blob", "rawbytes", "json", "jsonb",
    "uuid", "date", "time", "timetz", "timestamp", "timestamptz", "datetime", "interval",
    "nulltime",
];

impl ScanFamily {
    /// Classify a scan-type name; `None` when it is not recognized.
    ///
    /// Matching ignores case and a leading `sql.` or `mysql.` qualifier.
    pub fn classify(scan_type: &str) -> Option<Self> {
        let name = scan_type.trim().to_ascii_lowercase();
        let name = name
            .strip_prefix("sql.")
            .or_else(|| name.strip_prefix("mysql."))
            .unwrap_or(&name);

        if INTEGER_NAMES.contains(&name) {
            Some(Self::Integer)
        } else if FLOAT_NAMES.contains(&name) {
            Some(Self::Float)
        } else if TEXT_NAMES.contains(&name) {
            Some(Self::Text)
        } else {
            None
        }
    }
}

/// Normalize a cell using its column's scan type, falling back to the value's shape.
pub fn normalize(scan_type: &str, raw: RawValue) -> Value {
    match ScanFamily::classify(scan_type) {
        Some(family) => normalize_as(family, raw),
        None => classify_raw(raw),
    }
}

/// Normalize a cell into a known family.
pub fn normalize_as(family: ScanFamily, raw: RawValue) -> Value {
    match family {
        ScanFamily::Integer => Value::Int(to_integer(raw)),
        ScanFamily::Float => Value::Float(to_float(raw)),
        ScanFamily::Text => Value::Text(to_text(raw)),
    }
}

/// Structural fallback: decide by the raw value's own kind.
///
/// Opaque bytes are the terminal case and decode as text.
pub fn classify_raw(raw: RawValue) -> Value {
    if let Some(i) = raw.as_integer() {
        return Value::Int(i);
    }
    if let Some(f) = raw.as_float() {
        return Value::Float(f);
    }
    match raw {
        RawValue::Text(s) => Value::Text(s),
        RawValue::Bytes(b) => Value::Text(bytes_to_text(b)),
        other => Value::Untyped(other),
    }
}

fn to_integer(raw: RawValue) -> i64 {
    if let Some(i) = raw.as_integer() {
        return i;
    }
    match raw {
        RawValue::Null => 0,
        RawValue::Bool(b) => i64::from(b),
        RawValue::F32(f) => f as i64,
        RawValue::F64(f) => f as i64,
        RawValue::Text(s) => parse_integer(&s),
        RawValue::Bytes(b) => parse_integer(&String::from_utf8_lossy(&b)),
        _ => 0,
    }
}

fn to_float(raw: RawValue) -> f64 {
    if let Some(f) = raw.as_float() {
        return f;
    }
    if let Some(i) = raw.as_integer() {
        return i as f64;
    }
    match raw {
        RawValue::Bool(b) => f64::from(u8::from(b)),
        RawValue::Text(s) => parse_float(&s),
        RawValue::Bytes(b) => parse_float(&String::from_utf8_lossy(&b)),
        _ => 0.0,
    }
}

fn to_text(raw: RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Text(s) => s,
        RawValue::Bytes(b) => bytes_to_text(b),
        other => other.to_string(),
    }
}

fn bytes_to_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Base-10 parse; unparsable input yields 0.
fn parse_integer(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

/// Decimal parse; unparsable input yields 0.0.
fn parse_float(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_scan_types() {
        assert_eq!(ScanFamily::classify("int4"), Some(ScanFamily::Integer));
        assert_eq!(ScanFamily::classify("BIGINT"), Some(ScanFamily::Integer));
        assert_eq!(ScanFamily::classify("sql.NullInt64"), Some(ScanFamily::Integer));
        assert_eq!(ScanFamily::classify("float8"), Some(ScanFamily::Float));
        assert_eq!(ScanFamily::classify("sql.NullFloat64"), Some(ScanFamily::Float));
        assert_eq!(ScanFamily::classify("numeric"), Some(ScanFamily::Float));
        assert_eq!(ScanFamily::classify("sql.RawBytes"), Some(ScanFamily::Text));
        assert_eq!(ScanFamily::classify("mysql.NullTime"), Some(ScanFamily::Text));
        assert_eq!(ScanFamily::classify("timestamptz"), Some(ScanFamily::Text));
        assert_eq!(ScanFamily::classify("inet"), None);
        assert_eq!(ScanFamily::classify(""), None);
    }

    #[test]
    fn test_integer_family_widens_every_width() {
        let raws = vec![
            (RawValue::I8(-8), -8),
            (RawValue::I16(-16), -16),
            (RawValue::I32(-32), -32),
            (RawValue::I64(-64), -64),
            (RawValue::U8(8), 8),
            (RawValue::U16(16), 16),
            (RawValue::U32(32), 32),
            (RawValue::U64(64), 64),
        ];
        for (raw, expected) in raws {
            assert_eq!(normalize("int8", raw), Value::Int(expected));
        }
    }

    #[test]
    fn test_integer_family_null_is_zero() {
        assert_eq!(normalize("int4", RawValue::Null), Value::Int(0));
        assert_eq!(normalize("sql.NullInt64", RawValue::Null), Value::Int(0));
    }

    #[test]
    fn test_integer_family_parses_bytes() {
        assert_eq!(normalize("bigint", RawValue::Bytes(b"12345".to_vec())), Value::Int(12345));
        assert_eq!(normalize("bigint", RawValue::Text("-7".into())), Value::Int(-7));
    }

    #[test]
    fn test_integer_family_swallows_parse_failure() {
        assert_eq!(normalize("int", RawValue::Bytes(b"12abc".to_vec())), Value::Int(0));
        assert_eq!(normalize("int", RawValue::Text("1.5".into())), Value::Int(0));
    }

    #[test]
    fn test_float_family() {
        assert_eq!(normalize("float8", RawValue::F64(2.5)), Value::Float(2.5));
        assert_eq!(normalize("float4", RawValue::F32(0.5)), Value::Float(0.5));
        assert_eq!(normalize("double", RawValue::Null), Value::Float(0.0));
        assert_eq!(normalize("numeric", RawValue::Text("123.45".into())), Value::Float(123.45));
        assert_eq!(normalize("decimal", RawValue::Bytes(b"3.25".to_vec())), Value::Float(3.25));
        assert_eq!(normalize("decimal", RawValue::Bytes(b"abc".to_vec())), Value::Float(0.0));
        assert_eq!(normalize("real", RawValue::I32(3)), Value::Float(3.0));
    }

    #[test]
    fn test_text_family() {
        assert_eq!(normalize("varchar", RawValue::Bytes(b"hello".to_vec())), Value::Text("hello".into()));
        assert_eq!(normalize("timestamp", RawValue::Null), Value::Text(String::new()));
        assert_eq!(
            normalize("date", RawValue::Text("2024-05-01".into())),
            Value::Text("2024-05-01".into())
        );
        assert_eq!(normalize("text", RawValue::I32(5)), Value::Text("5".into()));
    }

    #[test]
    fn test_text_family_invalid_utf8_is_lossy() {
        let value = normalize("bytea", RawValue::Bytes(vec![b'a', 0xff, b'b']));
        assert_eq!(value, Value::Text("a\u{fffd}b".into()));
    }

    #[test]
    fn test_unknown_scan_type_uses_raw_shape() {
        assert_eq!(normalize("geometry", RawValue::U16(9)), Value::Int(9));
        assert_eq!(normalize("", RawValue::I8(-1)), Value::Int(-1));
        assert_eq!(normalize("money", RawValue::F32(1.25)), Value::Float(1.25));
        assert_eq!(normalize("inet", RawValue::Bytes(b"10.0.0.1".to_vec())), Value::Text("10.0.0.1".into()));
        assert_eq!(normalize("enum", RawValue::Text("red".into())), Value::Text("red".into()));
        assert_eq!(normalize("bool", RawValue::Bool(true)), Value::Untyped(RawValue::Bool(true)));
        assert_eq!(normalize("void", RawValue::Null), Value::Untyped(RawValue::Null));
    }
}

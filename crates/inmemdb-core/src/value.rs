use bytes::Bytes;

use crate::list::ValueList;

/// Type tags for value kinds in the snapshot format.
pub const STRING_VALUE_TYPE: u8 = 0;
pub const INT_VALUE_TYPE: u8 = 1;
pub const LIST_VALUE_TYPE: u8 = 2;

/// A value stored against a key.
///
/// Integers are detected on ingest: a byte string that parses exactly as a
/// signed 64-bit decimal is stored as `Int`, everything else as `Str`.
/// Lists are only ever created through the push operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw byte string.
    Str(Bytes),

    /// Signed 64-bit integer, observed through GET as its decimal form.
    Int(i64),

    /// Ordered sequence of byte strings.
    List(ValueList),
}

impl Value {
    /// Builds a value from an incoming byte string, autodetecting integers.
    pub fn from_ingest(raw: Bytes) -> Self {
        match parse_i64(&raw) {
            Some(n) => Value::Int(n),
            None => Value::Str(raw),
        }
    }

    /// Returns the type tag used in the snapshot format.
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Str(_) => STRING_VALUE_TYPE,
            Value::Int(_) => INT_VALUE_TYPE,
            Value::List(_) => LIST_VALUE_TYPE,
        }
    }

    /// The value as a byte string, formatting integers back to decimal.
    /// Lists have no string form.
    pub fn as_output(&self) -> Option<Bytes> {
        match self {
            Value::Str(bytes) => Some(bytes.clone()),
            Value::Int(n) => Some(Bytes::from(n.to_string())),
            Value::List(_) => None,
        }
    }
}

/// Parses a byte string as a signed 64-bit decimal, strictly.
///
/// Rejects empty input, leading/trailing whitespace, trailing bytes, and
/// anything outside the i64 range. Accepts an optional leading sign.
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_i64_accepts_plain_decimals() {
        assert_eq!(parse_i64(b"0"), Some(0));
        assert_eq!(parse_i64(b"41"), Some(41));
        assert_eq!(parse_i64(b"-17"), Some(-17));
        assert_eq!(parse_i64(b"+5"), Some(5));
        assert_eq!(parse_i64(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64(b"-9223372036854775808"), Some(i64::MIN));
    }

    #[test]
    fn test_parse_i64_rejects_non_decimals() {
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b" 5"), None);
        assert_eq!(parse_i64(b"5 "), None);
        assert_eq!(parse_i64(b"5x"), None);
        assert_eq!(parse_i64(b"x5"), None);
        assert_eq!(parse_i64(b"1.0"), None);
        assert_eq!(parse_i64(b"--1"), None);
        // One past i64::MAX
        assert_eq!(parse_i64(b"9223372036854775808"), None);
        assert_eq!(parse_i64(b"\xff\xfe"), None);
    }

    #[test]
    fn test_from_ingest_autodetects_integers() {
        assert_eq!(Value::from_ingest(Bytes::from("42")), Value::Int(42));
        assert_eq!(Value::from_ingest(Bytes::from("-1")), Value::Int(-1));
        assert_eq!(
            Value::from_ingest(Bytes::from("hello")),
            Value::Str(Bytes::from("hello"))
        );
        assert_eq!(
            Value::from_ingest(Bytes::from("42abc")),
            Value::Str(Bytes::from("42abc"))
        );
    }

    #[test]
    fn test_as_output_formats_canonical_decimal() {
        // Leading zeros and explicit plus are normalized by the int round trip.
        let v = Value::from_ingest(Bytes::from("007"));
        assert_eq!(v, Value::Int(7));
        assert_eq!(v.as_output().unwrap(), "7");

        let v = Value::from_ingest(Bytes::from("+12"));
        assert_eq!(v.as_output().unwrap(), "12");

        let v = Value::from_ingest(Bytes::from("-0"));
        assert_eq!(v.as_output().unwrap(), "0");
    }

    #[test]
    fn test_as_output_on_lists_is_none() {
        let v = Value::List(crate::list::ValueList::new());
        assert!(v.as_output().is_none());
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::Str(Bytes::new()).type_tag(), STRING_VALUE_TYPE);
        assert_eq!(Value::Int(0).type_tag(), INT_VALUE_TYPE);
        assert_eq!(
            Value::List(crate::list::ValueList::new()).type_tag(),
            LIST_VALUE_TYPE
        );
    }
}

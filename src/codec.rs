//! Field codec for storing structured record values in scalar columns.
//!
//! Structured values (sequences and mappings) are stored as
//! `<tag>:<json>` strings, with the tag at offset 0 and the `:` marker at
//! offset 1:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `a` | JSON array |
//! | `o` | JSON object |
//! | `s` | a scalar string that would otherwise be read back as encoded |
//!
//! A stored string is only decoded if it is at least [`MIN_ENCODED_LEN`]
//! bytes long, carries a known tag and the marker, parses as JSON, and the
//! parsed JSON has the type the tag promises. Everything else stays a scalar.
//!
//! Only top-level columns are encoded and decoded. Values nested inside an
//! encoded mapping, such as payload entries, are stored verbatim and never
//! decoded again, so a caller's string is delivered exactly as given.

use serde_json::{Map, Value};

use crate::error::OutboxError;
use crate::record::EmailRecord;
use crate::store::Row;

/// Shortest possible encoded value (`a:[]`, `o:{}`, `s:""`).
pub const MIN_ENCODED_LEN: usize = 4;

const MARKER: u8 = b':';
const TAG_SEQUENCE: u8 = b'a';
const TAG_MAPPING: u8 = b'o';
const TAG_STRING: u8 = b's';

/// Decode a stored string, if it is an encoded value.
///
/// ```
/// use outbox::codec::decode_value;
/// use serde_json::json;
///
/// assert_eq!(decode_value(r#"a:["x@example.com"]"#), Some(json!(["x@example.com"])));
/// assert_eq!(decode_value("a:b"), None);
/// assert_eq!(decode_value("Hello"), None);
/// ```
pub fn decode_value(stored: &str) -> Option<Value> {
    if stored.len() < MIN_ENCODED_LEN {
        return None;
    }
    let bytes = stored.as_bytes();
    if bytes[1] != MARKER {
        return None;
    }

    let decoded: Value = serde_json::from_str(&stored[2..]).ok()?;
    let matches_tag = match bytes[0] {
        TAG_SEQUENCE => decoded.is_array(),
        TAG_MAPPING => decoded.is_object(),
        TAG_STRING => decoded.is_string(),
        _ => false,
    };
    matches_tag.then_some(decoded)
}

/// Whether a stored string would be decoded on read.
pub fn is_encoded(stored: &str) -> bool {
    decode_value(stored).is_some()
}

/// Encode one value into its storable form.
///
/// Arrays and objects become tagged strings. Strings that would be mistaken
/// for an encoded value are escaped. Other scalars are stored as they are.
pub fn encode_value(value: &Value) -> Result<Value, OutboxError> {
    let tagged = |tag: char, value: &Value| -> Result<Value, OutboxError> {
        let json = serde_json::to_string(value)
            .map_err(|e| OutboxError::Codec(format!("cannot encode value: {e}")))?;
        Ok(Value::String(format!("{tag}:{json}")))
    };

    match value {
        Value::Array(_) => tagged(TAG_SEQUENCE as char, value),
        Value::Object(_) => tagged(TAG_MAPPING as char, value),
        Value::String(s) if is_encoded(s) => tagged(TAG_STRING as char, value),
        _ => Ok(value.clone()),
    }
}

/// Decode every encoded column of a row in place.
pub fn decode_columns(row: &mut Row) {
    for value in row.values_mut() {
        if let Some(decoded) = value.as_str().and_then(decode_value) {
            *value = decoded;
        }
    }
}

/// Encode a record into a storable row.
pub fn encode_record(record: &EmailRecord) -> Result<Row, OutboxError> {
    let value = serde_json::to_value(record)?;
    let Value::Object(columns) = value else {
        return Err(OutboxError::Codec("record did not serialize to a row".into()));
    };

    columns
        .into_iter()
        .map(|(column, value)| Ok((column, encode_value(&value)?)))
        .collect::<Result<Map<_, _>, OutboxError>>()
}

/// Decode a stored row back into a record.
pub fn decode_row(mut row: Row) -> Result<EmailRecord, OutboxError> {
    decode_columns(&mut row);
    serde_json::from_value(Value::Object(row))
        .map_err(|e| OutboxError::Codec(format!("cannot decode row: {e}")))
}

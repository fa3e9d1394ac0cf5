//! Row materialization.
//!
//! Each result row becomes a column-name → JSON value map. Decoding tries
//! progressively more general driver decodes; opaque byte sequences are
//! coerced to text. No type inference beyond what the driver reports.

use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row};

/// A materialized result row.
pub type RowMap = serde_json::Map<String, Value>;

/// Convert one driver row into a column-name → value map.
pub fn row_to_map(row: &MySqlRow) -> RowMap {
    let mut map = RowMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, index));
    }
    map
}

/// Decode a single column, trying the narrow decodes first and falling
/// back to text, then raw bytes.
fn decode_column(row: &MySqlRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return value
            .map(|ts| Value::String(ts.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return value
            .map(|date| Value::String(date.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map(|bytes| coerce_bytes(&bytes)).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Bytes become text for JSON serialization, lossily if needed.
fn coerce_bytes(bytes: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

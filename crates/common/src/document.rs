//! Conversions between typed records and flat document fields
//!
//! A document is a map of top-level field names to JSON values. Stores that
//! keep fields as strings (Redis hashes) JSON-encode each value individually,
//! so a merge-patch is just a write of the patched fields.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Top-level document fields
pub type Fields = Map<String, Value>;

/// Serialize a record into document fields
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(Error::NotADocument),
    }
}

/// Deserialize a record from document fields
pub fn from_fields<T: DeserializeOwned>(fields: Fields) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Apply a merge-patch: every patched field replaces the stored one
pub fn merge_fields(target: &mut Fields, patch: Fields) {
    for (name, value) in patch {
        target.insert(name, value);
    }
}

/// Encode fields as JSON strings, one per field
pub fn encode_fields(fields: &Fields) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}

/// Decode fields stored as JSON strings
pub fn decode_fields(raw: HashMap<String, String>) -> Result<Fields> {
    raw.into_iter()
        .map(|(name, text)| {
            serde_json::from_str::<Value>(&text)
                .map(|value| (name.clone(), value))
                .map_err(|source| Error::InvalidField {
                    field: name,
                    source,
                })
        })
        .collect()
}

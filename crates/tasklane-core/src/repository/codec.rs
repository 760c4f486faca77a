//! JSON encoding of entity collections
//!
//! Decoding degrades per record: a record that fails to parse becomes the
//! entity's placeholder so the rest of the collection still loads.

use serde_json::Value;

use crate::error::Result;
use crate::models::{Entity, EntityId};
use crate::storage::Document;

/// Encode a collection as the JSON array stored under the entity's key
pub fn encode_collection<T: Entity>(items: &[T]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

/// Decode raw JSON records, replacing unreadable ones with placeholders
pub fn decode_records<T: Entity>(records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .map(|record| {
            let id = record_id(&record);
            decode_or_placeholder(record, id)
        })
        .collect()
}

/// Decode cloud documents; the document key stands in for a missing `id`
pub fn decode_documents<T: Entity>(documents: Vec<Document>) -> Vec<T> {
    documents
        .into_iter()
        .map(|document| {
            let id = record_id(&document.data).or_else(|| Some(EntityId::from(document.id)));
            decode_or_placeholder(document.data, id)
        })
        .collect()
}

pub(crate) fn decode_one<T: Entity>(record: Value) -> T {
    let id = record_id(&record);
    decode_or_placeholder(record, id)
}

pub(crate) fn record_id(record: &Value) -> Option<EntityId> {
    record
        .get("id")
        .and_then(Value::as_str)
        .map(EntityId::from)
}

fn decode_or_placeholder<T: Entity>(record: Value, id: Option<EntityId>) -> T {
    match serde_json::from_value::<T>(record) {
        Ok(item) => item,
        Err(error) => {
            let id = id.unwrap_or_default();
            tracing::warn!(
                "Malformed {} record {}; loading placeholder: {}",
                T::KIND,
                id,
                error
            );
            T::placeholder(id)
        }
    }
}

//! Purpose: JSON envelopes for store and schema metadata printed by the CLI.
//! Exports: `store_info_json`, `keys_json`.
//! Role: Keep `info`/`keys` output shape in one place.
//! Invariants: Stable key names; schema columns listed in physical order, index first.

use std::collections::BTreeSet;

use obtstore::api::{FrameKey, OneBigTable, StoreState, TableSchema};
use serde_json::{Map, Value, json};

pub(crate) fn store_info_json(store: &OneBigTable, keys: &BTreeSet<FrameKey>) -> Value {
    let mut map = Map::new();
    map.insert("path".to_string(), json!(store.path().display().to_string()));
    map.insert("state".to_string(), json!(state_name(store.state())));
    map.insert("frame_key".to_string(), json!(store.frame_key()));
    map.insert("rows".to_string(), json!(store.nrows()));
    map.insert("frames".to_string(), json!(keys.len()));
    if let Some(schema) = store.schema() {
        map.insert("schema".to_string(), schema_json(schema));
    }
    Value::Object(map)
}

fn schema_json(schema: &TableSchema) -> Value {
    let columns: Vec<Value> = schema
        .columns()
        .iter()
        .map(|column| {
            json!({
                "name": column.name,
                "type": column.semantic_type,
            })
        })
        .collect();
    let mut map = Map::new();
    map.insert("version".to_string(), json!(schema.version()));
    map.insert("index".to_string(), json!(schema.index_name()));
    map.insert("row_len".to_string(), json!(schema.row_len()));
    map.insert("columns".to_string(), Value::Array(columns));
    if !schema.meta().is_empty() {
        map.insert("meta".to_string(), Value::Object(schema.meta().clone()));
    }
    Value::Object(map)
}

pub(crate) fn keys_json(keys: &BTreeSet<FrameKey>) -> Value {
    Value::Array(
        keys.iter()
            .map(|key| match key {
                FrameKey::Int(value) => json!(value),
                FrameKey::Str(value) => json!(value),
            })
            .collect(),
    )
}

fn state_name(state: StoreState) -> &'static str {
    match state {
        StoreState::Uninitialized => "uninitialized",
        StoreState::SchemaLocked => "schema_locked",
        StoreState::Reindexed => "reindexed",
        StoreState::Closed => "closed",
    }
}

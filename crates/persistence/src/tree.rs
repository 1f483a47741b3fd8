//! Typed access to save trees.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use town_core::{ItemId, ResourceId, ResourceRegistry};
use tracing::warn;

/// A nested key/value save tree.
pub type SaveTree = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` is not a valid {expected}")]
    WrongType { field: String, expected: &'static str },
}

/// Registry lookups needed while loading.
#[derive(Clone, Copy, Debug)]
pub struct LoadContext<'a> {
    pub resources: &'a ResourceRegistry,
}

impl<'a> LoadContext<'a> {
    pub fn new(resources: &'a ResourceRegistry) -> Self {
        Self { resources }
    }

    /// Resolve a persisted resource key, logging and dropping unknown ones.
    pub fn resource(&self, key: &str) -> Option<ResourceId> {
        let id = ResourceId::from(key);
        if self.resources.contains(&id) {
            Some(id)
        } else {
            warn!(key, "skipping unknown resource id in save data");
            None
        }
    }

    /// Resolve a persisted item key. Items are opaque keys, so only blank
    /// keys are dropped; items outside the resource catalog are kept.
    pub fn item(&self, key: &str) -> Option<ItemId> {
        if key.trim().is_empty() {
            warn!(key, "skipping blank item id in save data");
            return None;
        }
        Some(ItemId::from(key))
    }
}

/// Typed getters over a save tree.
pub trait TreeExt {
    fn value(&self, key: &str) -> Result<&Value, LoadError>;

    fn get_i64(&self, key: &str) -> Result<i64, LoadError> {
        self.value(key)?.as_i64().ok_or_else(|| wrong(key, "integer"))
    }

    fn get_u64(&self, key: &str) -> Result<u64, LoadError> {
        self.value(key)?
            .as_u64()
            .ok_or_else(|| wrong(key, "unsigned integer"))
    }

    fn get_u32(&self, key: &str) -> Result<u32, LoadError> {
        u32::try_from(self.get_u64(key)?).map_err(|_| wrong(key, "u32"))
    }

    fn get_f64(&self, key: &str) -> Result<f64, LoadError> {
        self.value(key)?.as_f64().ok_or_else(|| wrong(key, "number"))
    }

    fn get_bool(&self, key: &str) -> Result<bool, LoadError> {
        self.value(key)?.as_bool().ok_or_else(|| wrong(key, "boolean"))
    }

    fn get_str(&self, key: &str) -> Result<&str, LoadError> {
        self.value(key)?.as_str().ok_or_else(|| wrong(key, "string"))
    }

    fn get_tree(&self, key: &str) -> Result<&SaveTree, LoadError> {
        self.value(key)?.as_object().ok_or_else(|| wrong(key, "tree"))
    }

    fn get_list(&self, key: &str) -> Result<&Vec<Value>, LoadError> {
        self.value(key)?.as_array().ok_or_else(|| wrong(key, "list"))
    }

    /// Millisecond epoch timestamp.
    fn get_time(&self, key: &str) -> Result<DateTime<Utc>, LoadError> {
        DateTime::<Utc>::from_timestamp_millis(self.get_i64(key)?)
            .ok_or_else(|| wrong(key, "timestamp"))
    }

    fn has(&self, key: &str) -> bool;
}

impl TreeExt for SaveTree {
    fn value(&self, key: &str) -> Result<&Value, LoadError> {
        self.get(key)
            .ok_or_else(|| LoadError::MissingField(key.to_string()))
    }

    fn has(&self, key: &str) -> bool {
        self.contains_key(key)
    }
}

fn wrong(key: &str, expected: &'static str) -> LoadError {
    LoadError::WrongType {
        field: key.to_string(),
        expected,
    }
}

/// Encode a timestamp the way [`TreeExt::get_time`] reads it.
pub fn time_value(t: DateTime<Utc>) -> Value {
    Value::from(t.timestamp_millis())
}

/// Read a `key -> count` tree, passing each entry through `resolve` and
/// skipping entries that fail to resolve or are not counts.
pub fn read_counts<K>(
    tree: &SaveTree,
    mut resolve: impl FnMut(&str) -> Option<K>,
) -> Vec<(K, u64)> {
    let mut out = Vec::with_capacity(tree.len());
    for (key, value) in tree {
        let Some(count) = value.as_u64() else {
            warn!(key = key.as_str(), "skipping non-numeric count in save data");
            continue;
        };
        if let Some(k) = resolve(key) {
            out.push((k, count));
        }
    }
    out
}

/// Write `key -> count` pairs into a tree.
pub fn write_counts<'a, K: AsRef<str> + 'a>(
    entries: impl IntoIterator<Item = (&'a K, u64)>,
) -> SaveTree {
    entries
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), Value::from(v)))
        .collect()
}

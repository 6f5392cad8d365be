//! In-memory data buckets and global variables.
//!
//! Bucket seeds are rendered once on start; the rendered value is the
//! bucket's current value until CRUD routes mutate it or an admin purge
//! reseeds it.

pub mod crud;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

pub use crud::{execute_crud, CrudError, CrudOperation, CrudResult};

use crate::environment::DataBucket;
use crate::template::{RenderContext, TemplateEngine};

#[derive(Debug)]
struct BucketState {
    uuid: String,
    id: String,
    name: String,
    seed: String,
    value: Value,
}

impl BucketState {
    fn matches(&self, key: &str) -> bool {
        !key.is_empty() && (self.id == key || self.uuid == key || self.name == key)
    }
}

/// Current values of an environment's data buckets.
#[derive(Debug, Default)]
pub struct DataStore {
    buckets: RwLock<Vec<BucketState>>,
}

impl DataStore {
    /// Create an unseeded store. Every bucket starts as an empty list.
    pub fn new(buckets: &[DataBucket]) -> Self {
        let states = buckets
            .iter()
            .map(|bucket| BucketState {
                uuid: bucket.uuid.clone(),
                id: bucket.id.clone(),
                name: bucket.name.clone(),
                seed: bucket.value.clone(),
                value: Value::Array(Vec::new()),
            })
            .collect();
        Self {
            buckets: RwLock::new(states),
        }
    }

    /// Render every seed and replace the current values.
    pub fn seed(&self, engine: &TemplateEngine) {
        let seeds: Vec<(String, String)> = self
            .buckets
            .read()
            .iter()
            .map(|b| (b.uuid.clone(), b.seed.clone()))
            .collect();

        let values: Vec<(String, Value)> = seeds
            .into_iter()
            .map(|(uuid, seed)| {
                let value = seed_value(engine, &uuid, &seed);
                (uuid, value)
            })
            .collect();

        let mut buckets = self.buckets.write();
        for (uuid, value) in values {
            if let Some(bucket) = buckets.iter_mut().find(|b| b.uuid == uuid) {
                bucket.value = value;
            }
        }
        debug!("Seeded {} data bucket(s)", buckets.len());
    }

    /// Current value of a bucket looked up by id, uuid or name.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.buckets
            .read()
            .iter()
            .find(|b| b.matches(key))
            .map(|b| b.value.clone())
    }

    /// Run `f` against a bucket's current value under the write lock.
    pub fn update<F, R>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Value) -> R,
    {
        let mut buckets = self.buckets.write();
        buckets.iter_mut().find(|b| b.matches(key)).map(|b| f(&mut b.value))
    }

    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render a bucket seed. JSON output is parsed, anything else is kept as a
/// string, and a failed render leaves an empty list.
fn seed_value(engine: &TemplateEngine, uuid: &str, seed: &str) -> Value {
    match engine.render(seed, &RenderContext::empty()) {
        Ok(rendered) => serde_json::from_str(&rendered).unwrap_or(Value::String(rendered)),
        Err(e) => {
            warn!("Failed to render data bucket {}: {}", uuid, e);
            Value::Array(Vec::new())
        }
    }
}

/// Environment-wide variables set by templates or the admin API.
#[derive(Debug, Default)]
pub struct GlobalVariables {
    vars: RwLock<HashMap<String, Value>>,
}

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.vars.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        self.vars.write().insert(key.to_string(), value);
    }

    pub fn purge(&self) {
        self.vars.write().clear();
    }

    pub fn len(&self) -> usize {
        self.vars.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FakerOptions;
    use serde_json::json;

    fn bucket(uuid: &str, id: &str, name: &str, value: &str) -> DataBucket {
        DataBucket {
            uuid: uuid.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            documentation: String::new(),
            value: value.to_string(),
        }
    }

    fn engine() -> TemplateEngine {
        TemplateEngine::new(&FakerOptions::default(), "MOCKOON_")
    }

    #[test]
    fn test_unseeded_bucket_is_empty_list() {
        let store = DataStore::new(&[bucket("u1", "b1", "Users", "[1]")]);
        assert_eq!(store.get_value("b1"), Some(json!([])));
    }

    #[test]
    fn test_seed_parses_json_and_keeps_text() {
        let store = DataStore::new(&[
            bucket("u1", "users", "Users", r#"[{"id": {{add 1 1}}}]"#),
            bucket("u2", "text", "Text", "plain text"),
            bucket("u3", "broken", "Broken", "{{#if true}}never closed"),
        ]);
        store.seed(&engine());
        assert_eq!(store.get_value("users"), Some(json!([{"id": 2}])));
        assert_eq!(store.get_value("u2"), Some(json!("plain text")));
        assert_eq!(store.get_value("Broken"), Some(json!([])));
    }

    #[test]
    fn test_lookup_by_id_uuid_or_name() {
        let store = DataStore::new(&[bucket("u1", "b1", "Users", "[]")]);
        assert!(store.get_value("u1").is_some());
        assert!(store.get_value("b1").is_some());
        assert!(store.get_value("Users").is_some());
        assert!(store.get_value("").is_none());
        assert!(store.get_value("other").is_none());
    }

    #[test]
    fn test_update_and_reseed() {
        let store = DataStore::new(&[bucket("u1", "b1", "B", "[1,2]")]);
        let engine = engine();
        store.seed(&engine);
        store.update("b1", |v| *v = json!([]));
        assert_eq!(store.get_value("b1"), Some(json!([])));
        store.seed(&engine);
        assert_eq!(store.get_value("b1"), Some(json!([1, 2])));
    }

    #[test]
    fn test_global_variables() {
        let vars = GlobalVariables::new();
        vars.set("k", json!("v"));
        assert_eq!(vars.get("k"), Some(json!("v")));
        assert_eq!(vars.len(), 1);
        vars.purge();
        assert!(vars.is_empty());
    }
}

//! The document store

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// One named collection: ordered documents plus the next `_id`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collection {
    next_id: u64,
    documents: Vec<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DbInner {
    collections: BTreeMap<String, Collection>,
}

/// Thread-safe in-process document store.
///
/// Collections are held in a `BTreeMap` and documents in insertion
/// order, so a save/load or replay walks them identically every time.
#[derive(Debug, Default)]
pub struct Database {
    inner: RwLock<DbInner>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection if it does not exist yet. Idempotent.
    pub fn create_collection(&self, name: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.collections.entry(name.to_string()).or_default();
    }

    pub fn has_collection(&self, name: &str) -> bool {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.collections.contains_key(name)
    }

    pub fn collection_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.collections.keys().cloned().collect()
    }

    /// Insert a document, assigning it the collection's next `_id`.
    /// Returns the stored document.
    pub fn insert(&self, collection: &str, mut document: Value) -> StoreResult<Value> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let coll = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        coll.next_id += 1;
        if let Value::Object(map) = &mut document {
            map.insert("_id".to_string(), Value::from(coll.next_id));
        }
        coll.documents.push(document.clone());
        Ok(document)
    }

    /// All documents whose fields equal every field of `query`.
    /// An empty query matches everything.
    pub fn find(&self, collection: &str, query: &Value) -> Vec<Value> {
        let inner = self.inner.read().expect("store lock poisoned");
        match inner.collections.get(collection) {
            Some(coll) => coll
                .documents
                .iter()
                .filter(|doc| matches_query(doc, query))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// First document matching `query`, in insertion order.
    pub fn find_one(&self, collection: &str, query: &Value) -> Option<Value> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .collections
            .get(collection)?
            .documents
            .iter()
            .find(|doc| matches_query(doc, query))
            .cloned()
    }

    /// Replace the stored document carrying the same `_id`.
    pub fn update(&self, collection: &str, document: &Value) -> StoreResult<bool> {
        let id = document.get("_id").cloned().ok_or(StoreError::MissingId)?;
        let mut inner = self.inner.write().expect("store lock poisoned");
        let coll = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        for stored in &mut coll.documents {
            if stored.get("_id") == Some(&id) {
                *stored = document.clone();
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove the stored document carrying the same `_id`.
    pub fn remove(&self, collection: &str, document: &Value) -> StoreResult<bool> {
        let id = document.get("_id").cloned().ok_or(StoreError::MissingId)?;
        let mut inner = self.inner.write().expect("store lock poisoned");
        let coll = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let before = coll.documents.len();
        coll.documents.retain(|stored| stored.get("_id") != Some(&id));
        Ok(coll.documents.len() < before)
    }

    /// Every document of a collection, in insertion order.
    pub fn all(&self, collection: &str) -> Vec<Value> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .collections
            .get(collection)
            .map(|coll| coll.documents.clone())
            .unwrap_or_default()
    }

    /// Last inserted document of a collection.
    pub fn last(&self, collection: &str) -> Option<Value> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.collections.get(collection)?.documents.last().cloned()
    }

    pub fn count(&self, collection: &str) -> usize {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .collections
            .get(collection)
            .map(|coll| coll.documents.len())
            .unwrap_or(0)
    }

    /// Drop every collection.
    pub fn wipe(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.collections.clear();
    }

    /// Persist the whole store to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let inner = self.inner.read().expect("store lock poisoned");
        let raw = serde_json::to_vec(&*inner)?;
        std::fs::write(path, raw)?;
        debug!(path = %path.display(), collections = inner.collections.len(), "database saved");
        Ok(())
    }

    /// Replace the in-memory contents with the file at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let raw = std::fs::read(path.as_ref())?;
        let loaded: DbInner = serde_json::from_slice(&raw)?;
        let mut inner = self.inner.write().expect("store lock poisoned");
        *inner = loaded;
        debug!(path = %path.as_ref().display(), "database loaded");
        Ok(())
    }
}

/// Top-level field equality. Every field of `query` must be equal in the
/// document; non-object queries match nothing.
fn matches_query(document: &Value, query: &Value) -> bool {
    match query {
        Value::Object(fields) => fields
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_assigns_sequential_ids() {
        let db = Database::new();
        db.create_collection("accounts");

        let first = db.insert("accounts", json!({"name": "alice"})).unwrap();
        let second = db.insert("accounts", json!({"name": "bob"})).unwrap();
        assert_eq!(first["_id"], 1);
        assert_eq!(second["_id"], 2);
    }

    #[test]
    fn insert_into_unknown_collection_fails() {
        let db = Database::new();
        assert!(matches!(
            db.insert("nope", json!({})),
            Err(StoreError::UnknownCollection(_))
        ));
    }

    #[test]
    fn create_collection_is_idempotent() {
        let db = Database::new();
        db.create_collection("t");
        db.insert("t", json!({"a": 1})).unwrap();
        db.create_collection("t");
        assert_eq!(db.count("t"), 1);
    }

    #[test]
    fn find_matches_on_every_query_field() {
        let db = Database::new();
        db.create_collection("balances");
        db.insert("balances", json!({"account": "alice", "symbol": "TKN"}))
            .unwrap();
        db.insert("balances", json!({"account": "alice", "symbol": "OTH"}))
            .unwrap();
        db.insert("balances", json!({"account": "bob", "symbol": "TKN"}))
            .unwrap();

        assert_eq!(db.find("balances", &json!({"account": "alice"})).len(), 2);
        assert_eq!(
            db.find("balances", &json!({"account": "alice", "symbol": "TKN"}))
                .len(),
            1
        );
        assert_eq!(db.find("balances", &json!({})).len(), 3);
        assert!(db.find("balances", &json!({"account": "carol"})).is_empty());
    }

    #[test]
    fn find_one_returns_first_match() {
        let db = Database::new();
        db.create_collection("rows");
        db.insert("rows", json!({"k": 1, "v": "first"})).unwrap();
        db.insert("rows", json!({"k": 1, "v": "second"})).unwrap();

        let found = db.find_one("rows", &json!({"k": 1})).unwrap();
        assert_eq!(found["v"], "first");
        assert!(db.find_one("rows", &json!({"k": 2})).is_none());
    }

    #[test]
    fn update_replaces_by_id() {
        let db = Database::new();
        db.create_collection("rows");
        let mut doc = db.insert("rows", json!({"v": 1})).unwrap();
        doc["v"] = json!(2);

        assert!(db.update("rows", &doc).unwrap());
        assert_eq!(db.find_one("rows", &json!({"v": 2})).unwrap()["_id"], 1);
        assert!(db.find_one("rows", &json!({"v": 1})).is_none());
    }

    #[test]
    fn remove_deletes_by_id() {
        let db = Database::new();
        db.create_collection("rows");
        let doc = db.insert("rows", json!({"v": 1})).unwrap();
        assert!(db.remove("rows", &doc).unwrap());
        assert_eq!(db.count("rows"), 0);
        assert!(!db.remove("rows", &doc).unwrap());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");

        let db = Database::new();
        db.create_collection("chain");
        db.insert("chain", json!({"blockNumber": 0})).unwrap();
        db.save(&path).unwrap();

        let restored = Database::new();
        restored.load(&path).unwrap();
        assert_eq!(restored.count("chain"), 1);
        assert_eq!(
            restored.find_one("chain", &json!({"blockNumber": 0})).unwrap()["_id"],
            1
        );

        // ids keep counting after a reload
        restored.insert("chain", json!({"blockNumber": 1})).unwrap();
        assert_eq!(restored.last("chain").unwrap()["_id"], 2);
    }

    #[test]
    fn wipe_clears_everything() {
        let db = Database::new();
        db.create_collection("chain");
        db.insert("chain", json!({})).unwrap();
        db.wipe();
        assert!(!db.has_collection("chain"));
    }
}

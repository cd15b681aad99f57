use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

use crate::query::Row;

/// Named collection of schemaless JSON rows
pub struct Collection {
    name: String,
    rows: RwLock<Vec<Row>>,
    created_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(Vec::new()),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert_rows(&self, rows: Vec<Row>) -> usize {
        let count = rows.len();
        self.rows.write().extend(rows);
        count
    }

    /// Run `f` over the rows under a read lock
    pub fn scan<T>(&self, f: impl FnOnce(&[Row]) -> T) -> T {
        let rows = self.rows.read();
        f(&rows)
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            name: self.name.clone(),
            row_count: self.len(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
}

/// In-memory backing store for the collection handlers
pub struct MemoryStore {
    collections: DashMap<String, Arc<Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }

    pub fn create_collection(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        if self.collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        let collection = Arc::new(Collection::new(name));
        self.collections
            .insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    pub fn get_or_create_collection(&self, name: &str) -> Arc<Collection> {
        let entry = self
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new(name)));
        Arc::clone(&entry)
    }

    pub fn collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|c| Arc::clone(&c))
    }

    /// Append rows, creating the collection if needed
    pub fn insert_rows(&self, name: &str, rows: Vec<Row>) -> usize {
        let inserted = self.get_or_create_collection(name).insert_rows(rows);
        tracing::debug!(collection = %name, inserted, "Inserted rows");
        inserted
    }

    pub fn list_collections(&self) -> Vec<CollectionStats> {
        let mut stats: Vec<CollectionStats> =
            self.collections.iter().map(|c| c.value().stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Load `{"collection": [rows...], ...}` seed data. Returns rows loaded.
    pub fn load_seed(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let loaded = self.load_seed_str(&contents)?;
        tracing::info!("Loaded {} seed rows from {}", loaded, path.display());
        Ok(loaded)
    }

    pub fn load_seed_str(&self, contents: &str) -> Result<usize, StoreError> {
        let seed: serde_json::Map<String, JsonValue> = serde_json::from_str(contents)?;

        // Validate everything before touching the store
        let mut batches = Vec::with_capacity(seed.len());
        for (name, rows) in seed {
            let JsonValue::Array(items) = rows else {
                return Err(StoreError::InvalidSeed(format!(
                    "collection '{}' must be an array of objects",
                    name
                )));
            };
            let rows = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    JsonValue::Object(row) => Ok(row),
                    _ => Err(StoreError::InvalidSeed(format!(
                        "row {} of collection '{}' is not an object",
                        i, name
                    ))),
                })
                .collect::<Result<Vec<Row>, _>>()?;
            batches.push((name, rows));
        }

        Ok(batches
            .into_iter()
            .map(|(name, rows)| self.insert_rows(&name, rows))
            .sum())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_and_insert() {
        let store = MemoryStore::new();
        store.create_collection("documents").unwrap();
        assert!(matches!(
            store.create_collection("documents"),
            Err(StoreError::CollectionExists(_))
        ));

        store.insert_rows("documents", vec![row(json!({"id": 1})), row(json!({"id": 2}))]);
        store.insert_rows("folders", vec![row(json!({"id": 10}))]);

        assert_eq!(store.collection("documents").unwrap().len(), 2);
        let names: Vec<String> = store.list_collections().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["documents", "folders"]);
    }

    #[test]
    fn test_scan_sees_insertion_order() {
        let store = MemoryStore::new();
        store.insert_rows("logs", (0..5).map(|i| row(json!({"seq": i}))).collect());
        let seqs: Vec<i64> = store
            .collection("logs")
            .unwrap()
            .scan(|rows| rows.iter().map(|r| r["seq"].as_i64().unwrap()).collect());
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_load_seed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"documents": [{{"id": 1}}, {{"id": 2}}], "archives": []}}"#
        )
        .unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.load_seed(file.path()).unwrap(), 2);
        assert_eq!(store.collection("documents").unwrap().len(), 2);
        assert!(store.collection("archives").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_seed_leaves_store_untouched() {
        let store = MemoryStore::new();
        let err = store
            .load_seed_str(r#"{"documents": [{"id": 1}], "folders": [1]}"#)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSeed(_)));
        assert!(store.collection("documents").is_none());

        assert!(matches!(
            store.load_seed_str("{"),
            Err(StoreError::Json(_))
        ));
        assert!(matches!(
            store.load_seed("/nonexistent/seed.json"),
            Err(StoreError::Io(_))
        ));
    }
}

use std::sync::Arc;

use super::filter::{compile_all, matches_all};
use super::store::MemoryStore;
use crate::query::{HandlerError, QueryArguments, QueryHandler, Row};

/// Answers listing queries against one collection of a [`MemoryStore`].
///
/// Pipeline: conditions (ANDed, in order) -> offset -> limit -> properties.
pub struct CollectionHandler {
    store: Arc<MemoryStore>,
    collection: String,
    max_limit: Option<usize>,
}

impl CollectionHandler {
    pub fn new(store: Arc<MemoryStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            max_limit: None,
        }
    }

    /// Cap the number of rows a single query may return
    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = Some(max_limit);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl QueryHandler for CollectionHandler {
    fn execute(&self, args: &QueryArguments) -> Result<Vec<Row>, HandlerError> {
        let filters = match args.conditions() {
            Some(conditions) => compile_all(conditions)?,
            None => Vec::new(),
        };

        let offset = args.offset().unwrap_or(0);
        let limit = match (args.limit(), self.max_limit) {
            (Some(requested), Some(max)) => requested.min(max),
            (requested, max) => requested.or(max).unwrap_or(usize::MAX),
        };

        // A collection nobody has written to yet is simply empty
        let Some(collection) = self.store.collection(&self.collection) else {
            return Ok(Vec::new());
        };

        let selected: Vec<Row> = collection.scan(|rows| {
            rows.iter()
                .filter(|row| matches_all(&filters, row))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        });

        Ok(match args.properties() {
            Some(properties) => selected
                .into_iter()
                .map(|row| project(&row, properties))
                .collect(),
            None => selected,
        })
    }
}

/// Keep only `properties`, in the requested order. Absent ones become null.
fn project(row: &Row, properties: &[String]) -> Row {
    properties
        .iter()
        .map(|p| (p.clone(), row.get(p).cloned().unwrap_or(serde_json::Value::Null)))
        .collect()
}

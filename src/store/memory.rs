//! In-memory [`RecordStore`] implementation for tests.
//!
//! Collections are `Vec<Record>` behind a `std::sync::RwLock`, kept in
//! insertion order. A collection can be marked as failing to simulate a
//! transport error for that collection only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    generate_id, value_as_filter_text, ListQuery, RecordStore, SortOrder, StoreError, StoreResult,
};
use crate::models::Record;

/// In-memory store for tests.
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
    failing: BTreeSet<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            failing: BTreeSet::new(),
        }
    }

    /// Seed a collection. Each value must be a JSON object.
    pub fn with_records(self, collection: &str, records: Vec<Value>) -> Self {
        {
            let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
            let rows = collections.entry(collection.to_string()).or_default();
            for value in records {
                if let Value::Object(map) = value {
                    rows.push(map);
                }
            }
        }
        self
    }

    /// Make every call against `collection` fail with an API error.
    pub fn failing_on(mut self, collection: &str) -> Self {
        self.failing.insert(collection.to_string());
        self
    }

    fn check(&self, collection: &str) -> StoreResult<()> {
        if self.failing.contains(collection) {
            return Err(StoreError::Api {
                status: 503,
                message: format!("collection '{}' unavailable", collection),
            });
        }
        Ok(())
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get_full_list(&self, collection: &str) -> StoreResult<Vec<Record>> {
        self.get_list(collection, &ListQuery::default()).await
    }

    async fn get_list(&self, collection: &str, query: &ListQuery) -> StoreResult<Vec<Record>> {
        self.check(collection)?;
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Record> = collections
            .get(collection)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        query.filters.iter().all(|(key, expected)| {
                            row.get(key)
                                .map(|v| value_as_filter_text(v) == *expected)
                                .unwrap_or(false)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(ref field) = query.sort {
            rows.sort_by(|a, b| {
                let a = a.get(field).map(value_as_filter_text).unwrap_or_default();
                let b = b.get(field).map(value_as_filter_text).unwrap_or_default();
                a.cmp(&b)
            });
            if query.order == SortOrder::Desc {
                rows.reverse();
            }
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Record> {
        self.check(collection)?;
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections
            .get(collection)
            .and_then(|rows| rows.iter().find(|r| record_id(r) == Some(id)))
            .cloned()
            .ok_or_else(|| Self::not_found(collection, id))
    }

    async fn create(&self, collection: &str, fields: &Record) -> StoreResult<Record> {
        self.check(collection)?;
        let mut record = fields.clone();
        if record_id(&record).map(str::is_empty).unwrap_or(true) {
            record.insert("id".to_string(), Value::String(generate_id()));
        }
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &str, fields: &Record) -> StoreResult<Record> {
        self.check(collection)?;
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let row = collections
            .get_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|r| record_id(r) == Some(id)))
            .ok_or_else(|| Self::not_found(collection, id))?;
        for (key, value) in fields {
            if key != "id" {
                row.insert(key.clone(), value.clone());
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check(collection)?;
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let rows = collections
            .get_mut(collection)
            .ok_or_else(|| Self::not_found(collection, id))?;
        let before = rows.len();
        rows.retain(|r| record_id(r) != Some(id));
        if rows.len() == before {
            return Err(Self::not_found(collection, id));
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        self.check(collection)?;
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(collection).map(|r| r.len() as u64).unwrap_or(0))
    }

    async fn health(&self) -> StoreResult<()> {
        Ok(())
    }
}

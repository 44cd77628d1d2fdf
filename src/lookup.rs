//! Case-insensitive name → id lookup maps over the reference collections.
//!
//! [`load_lookup_maps`] fetches all eight reference collections
//! concurrently and builds one map per [`LookupCategory`]. The load is
//! all-or-nothing: the first failed fetch aborts it and no partial maps
//! escape. Maps live for a single command invocation and are never
//! persisted.
//!
//! When two records in one collection share a name that differs only by
//! case, the record fetched last wins and the collision is logged at
//! `warn`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::models::{LookupCategory, Record, ReferenceEntity};
use crate::store::{RecordStore, StoreResult};

/// Normalize a reference name into a lookup key.
pub fn lookup_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Name → id maps for every reference collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LookupMaps {
    maps: BTreeMap<LookupCategory, BTreeMap<String, String>>,
}

impl LookupMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build maps for one category from raw records.
    pub fn from_records(category: LookupCategory, records: &[Record]) -> Self {
        let mut maps = Self::new();
        maps.insert_records(category, records);
        maps
    }

    /// Add records of one category. Records without a name or id are
    /// skipped.
    pub fn insert_records(&mut self, category: LookupCategory, records: &[Record]) {
        let map = self.maps.entry(category).or_default();
        for record in records {
            let (Some(name), Some(id)) = (
                record.get("name").and_then(Value::as_str),
                record.get("id").and_then(Value::as_str),
            ) else {
                continue;
            };
            if name.trim().is_empty() {
                continue;
            }
            let key = lookup_key(name);
            if let Some(previous) = map.insert(key, id.to_string()) {
                if previous != id {
                    tracing::warn!(
                        collection = category.collection(),
                        name,
                        previous_id = %previous,
                        id,
                        "lookup name collision, keeping last record"
                    );
                }
            }
        }
    }

    /// Resolve a human-entered name to an id.
    pub fn resolve(&self, category: LookupCategory, name: &str) -> Option<&str> {
        self.maps
            .get(&category)
            .and_then(|map| map.get(&lookup_key(name)))
            .map(String::as_str)
    }

    /// The map for one category, if it was loaded.
    pub fn get(&self, category: LookupCategory) -> Option<&BTreeMap<String, String>> {
        self.maps.get(&category)
    }

    /// Number of entries in one category.
    pub fn len(&self, category: LookupCategory) -> usize {
        self.maps.get(&category).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.values().all(BTreeMap::is_empty)
    }
}

/// Fetch every reference collection and build the lookup maps.
pub async fn load_lookup_maps(store: &dyn RecordStore) -> StoreResult<LookupMaps> {
    use LookupCategory::*;

    let (organizations, teams, standards, technologies, targets, categories, capabilities, tags) = tokio::try_join!(
        store.get_full_list(Organizations.collection()),
        store.get_full_list(Teams.collection()),
        store.get_full_list(Standards.collection()),
        store.get_full_list(Technologies.collection()),
        store.get_full_list(Targets.collection()),
        store.get_full_list(Categories.collection()),
        store.get_full_list(Capabilities.collection()),
        store.get_full_list(Tags.collection()),
    )?;

    let mut maps = LookupMaps::new();
    maps.insert_records(Organizations, &organizations);
    maps.insert_records(Teams, &teams);
    maps.insert_records(Standards, &standards);
    maps.insert_records(Technologies, &technologies);
    maps.insert_records(Targets, &targets);
    maps.insert_records(Categories, &categories);
    maps.insert_records(Capabilities, &capabilities);
    maps.insert_records(Tags, &tags);

    tracing::debug!(
        organizations = maps.len(Organizations),
        tags = maps.len(Tags),
        "loaded lookup maps"
    );
    Ok(maps)
}

/// Id → entity index over some reference collections, used to expand
/// stored FK ids into typed entities.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    entities: BTreeMap<LookupCategory, BTreeMap<String, ReferenceEntity>>,
}

impl ReferenceIndex {
    /// Load the collections that content foreign keys point at.
    pub async fn load(store: &dyn RecordStore) -> StoreResult<Self> {
        use LookupCategory::*;

        let (organizations, teams, standards, technologies, targets) = tokio::try_join!(
            store.get_full_list(Organizations.collection()),
            store.get_full_list(Teams.collection()),
            store.get_full_list(Standards.collection()),
            store.get_full_list(Technologies.collection()),
            store.get_full_list(Targets.collection()),
        )?;

        let mut index = Self::default();
        index.insert_records(Organizations, &organizations);
        index.insert_records(Teams, &teams);
        index.insert_records(Standards, &standards);
        index.insert_records(Technologies, &technologies);
        index.insert_records(Targets, &targets);
        Ok(index)
    }

    pub fn insert_records(&mut self, category: LookupCategory, records: &[Record]) {
        let map = self.entities.entry(category).or_default();
        for record in records {
            let Some(id) = record.get("id").and_then(Value::as_str) else {
                continue;
            };
            let entity = ReferenceEntity {
                id: id.to_string(),
                name: record
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                short_name: record
                    .get("short_name")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            };
            map.insert(id.to_string(), entity);
        }
    }

    pub fn get(&self, category: LookupCategory, id: &str) -> Option<&ReferenceEntity> {
        self.entities.get(&category).and_then(|m| m.get(id))
    }

    pub fn contains(&self, category: LookupCategory, id: &str) -> bool {
        self.get(category, id).is_some()
    }
}

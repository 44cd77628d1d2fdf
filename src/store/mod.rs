//! Record store abstraction.
//!
//! The [`RecordStore`] trait is the CRUD contract the CLI talks to. Two
//! backends implement it: [`PocketBaseStore`](pocketbase::PocketBaseStore)
//! (remote collections over HTTP) and [`SqliteStore`](sqlite::SqliteStore)
//! (the local database). [`InMemoryStore`](memory::InMemoryStore) stands in
//! for either in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`get_full_list`](RecordStore::get_full_list) | Every record of a collection |
//! | [`get_list`](RecordStore::get_list) | Filtered, sorted, limited records |
//! | [`get_one`](RecordStore::get_one) | Single record by id |
//! | [`create`](RecordStore::create) | Insert a record, returning it |
//! | [`update`](RecordStore::update) | Patch fields of a record, returning it |
//! | [`delete`](RecordStore::delete) | Remove a record |
//! | [`count`](RecordStore::count) | Number of records in a collection |
//! | [`health`](RecordStore::health) | Connectivity check |
//!
//! A store is opened once per command with [`open_store`] and passed by
//! reference to everything that needs it.

pub mod memory;
pub mod pocketbase;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::models::Record;

/// Errors at the storage boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Unknown table: \"{name}\". Valid tables: {valid}")]
    UnknownCollection { name: String, valid: String },

    #[error("Unknown column \"{column}\" for table \"{table}\"")]
    UnknownField { table: String, column: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Sort direction for [`ListQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order '{}': expected asc or desc", other)),
        }
    }
}

/// Options for [`RecordStore::get_list`].
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Equality filters, ANDed together.
    pub filters: Vec<(String, String)>,
    pub sort: Option<String>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(field.into());
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// CRUD contract over named collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend label for status output (`"sqlite"`, `"pocketbase"`).
    fn backend(&self) -> &str;

    /// Fetch every record of a collection.
    async fn get_full_list(&self, collection: &str) -> StoreResult<Vec<Record>>;

    /// Fetch records matching a query.
    async fn get_list(&self, collection: &str, query: &ListQuery) -> StoreResult<Vec<Record>>;

    /// Fetch one record; [`StoreError::NotFound`] when absent.
    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Record>;

    /// Insert a record. An id is generated when `fields` has none.
    async fn create(&self, collection: &str, fields: &Record) -> StoreResult<Record>;

    /// Patch the given fields of a record.
    async fn update(&self, collection: &str, id: &str, fields: &Record) -> StoreResult<Record>;

    /// Delete a record; [`StoreError::NotFound`] when absent.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> StoreResult<u64>;

    /// Check that the backend is reachable.
    async fn health(&self) -> StoreResult<()>;
}

/// Generate a 15-character lowercase alphanumeric record id, the shape
/// Pocketbase uses.
pub fn generate_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(15);
    id
}

/// Open the configured backend. Pocketbase authenticates here, once.
pub async fn open_store(config: &Config) -> anyhow::Result<Box<dyn RecordStore>> {
    match config.store.backend.as_str() {
        "pocketbase" => {
            let store = pocketbase::PocketBaseStore::connect(&config.pocketbase).await?;
            Ok(Box::new(store))
        }
        _ => {
            let store = sqlite::SqliteStore::open(config).await?;
            Ok(Box::new(store))
        }
    }
}

/// String form of a field value, used for equality filters.
pub(crate) fn value_as_filter_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        other => other.to_string(),
    }
}

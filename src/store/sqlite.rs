//! SQLite-backed [`RecordStore`] implementation.
//!
//! Generic CRUD over the tables created by [`crate::migrate`]. Table names
//! are checked against [`crate::migrate::TABLES`] and column names against
//! `PRAGMA table_info` before either is interpolated into SQL; values are
//! always bound.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};

use super::{generate_id, ListQuery, RecordStore, SortOrder, StoreError, StoreResult};
use crate::config::Config;
use crate::db;
use crate::migrate::{is_known_table, TABLES};
use crate::models::Record;

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to an existing database file.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(db::open(config).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn check_table(table: &str) -> StoreResult<()> {
        if is_known_table(table) {
            Ok(())
        } else {
            Err(StoreError::UnknownCollection {
                name: table.to_string(),
                valid: TABLES.join(", "),
            })
        }
    }

    async fn columns(&self, table: &str) -> StoreResult<Vec<String>> {
        Self::check_table(table)?;
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{}\")", table))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    fn check_column(table: &str, columns: &[String], column: &str) -> StoreResult<()> {
        if columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(StoreError::UnknownField {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    fn not_found(table: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: table.to_string(),
            id: id.to_string(),
        }
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        // Arrays and objects live in TEXT columns as JSON.
        other => query.bind(other.to_string()),
    }
}

fn row_to_record(row: &SqliteRow) -> StoreResult<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(idx)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::Null,
                _ => Value::String(row.try_get::<String, _>(idx)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn get_full_list(&self, collection: &str) -> StoreResult<Vec<Record>> {
        self.get_list(collection, &ListQuery::default()).await
    }

    async fn get_list(&self, collection: &str, query: &ListQuery) -> StoreResult<Vec<Record>> {
        let columns = self.columns(collection).await?;

        let mut sql = format!("SELECT * FROM \"{}\"", collection);

        if !query.filters.is_empty() {
            let mut conditions = Vec::with_capacity(query.filters.len());
            for (key, _) in &query.filters {
                Self::check_column(collection, &columns, key)?;
                conditions.push(format!("\"{}\" = ?", key));
            }
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }

        match query.sort {
            Some(ref field) => {
                Self::check_column(collection, &columns, field)?;
                let direction = match query.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                sql.push_str(&format!(" ORDER BY \"{}\" {}", field, direction));
            }
            None => sql.push_str(" ORDER BY rowid ASC"),
        }

        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query(&sql);
        for (_, value) in &query.filters {
            q = q.bind(value.clone());
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit as i64);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Record> {
        Self::check_table(collection)?;
        let sql = format!("SELECT * FROM \"{}\" WHERE \"id\" = ?", collection);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row_to_record(&row),
            None => Err(Self::not_found(collection, id)),
        }
    }

    async fn create(&self, collection: &str, fields: &Record) -> StoreResult<Record> {
        let columns = self.columns(collection).await?;

        let mut data = fields.clone();
        let id = match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_id(),
        };
        data.insert("id".to_string(), Value::String(id.clone()));

        let now = now_iso();
        for stamp in ["created", "updated"] {
            if columns.iter().any(|c| c == stamp) && !data.contains_key(stamp) {
                data.insert(stamp.to_string(), Value::String(now.clone()));
            }
        }

        for key in data.keys() {
            Self::check_column(collection, &columns, key)?;
        }

        let names: Vec<String> = data.keys().map(|k| format!("\"{}\"", k)).collect();
        let placeholders = vec!["?"; data.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            collection,
            names.join(", "),
            placeholders
        );

        let mut q = sqlx::query(&sql);
        for value in data.values() {
            q = bind_value(q, value);
        }
        q.execute(&self.pool).await?;

        self.get_one(collection, &id).await
    }

    async fn update(&self, collection: &str, id: &str, fields: &Record) -> StoreResult<Record> {
        let columns = self.columns(collection).await?;
        let existing = self.get_one(collection, id).await?;

        let mut data: Record = fields
            .iter()
            .filter(|(k, _)| k.as_str() != "id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if data.is_empty() {
            return Ok(existing);
        }
        if columns.iter().any(|c| c == "updated") && !data.contains_key("updated") {
            data.insert("updated".to_string(), Value::String(now_iso()));
        }

        for key in data.keys() {
            Self::check_column(collection, &columns, key)?;
        }

        let set_clause: Vec<String> = data.keys().map(|k| format!("\"{}\" = ?", k)).collect();
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ?",
            collection,
            set_clause.join(", ")
        );

        let mut q = sqlx::query(&sql);
        for value in data.values() {
            q = bind_value(q, value);
        }
        q.bind(id.to_string()).execute(&self.pool).await?;

        self.get_one(collection, id).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        Self::check_table(collection)?;
        let sql = format!("DELETE FROM \"{}\" WHERE \"id\" = ?", collection);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Self::not_found(collection, id));
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> StoreResult<u64> {
        Self::check_table(collection)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{}\"", collection))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn health(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("saf.sqlite");
        let pool = db::create(&config).await.unwrap();
        create_schema(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn obj(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let (_tmp, store) = setup().await;

        let org = store
            .create("organizations", &obj(json!({ "name": "MITRE" })))
            .await
            .unwrap();
        let org_id = org["id"].as_str().unwrap().to_string();
        assert_eq!(org_id.len(), 15);

        let content = store
            .create(
                "content",
                &obj(json!({
                    "name": "RHEL 9 STIG",
                    "slug": "rhel-9-stig",
                    "content_type": "validation",
                    "vendor": org_id,
                    "tags": ["t1", "t2"],
                    "is_featured": true
                })),
            )
            .await
            .unwrap();
        assert_eq!(content["status"], "active");
        assert_eq!(content["is_featured"], 1);
        assert_eq!(content["tags"], "[\"t1\",\"t2\"]");
        assert!(content["created"].as_str().is_some());

        let id = content["id"].as_str().unwrap().to_string();
        let updated = store
            .update("content", &id, &obj(json!({ "version": "1.2.0", "vendor": null })))
            .await
            .unwrap();
        assert_eq!(updated["version"], "1.2.0");
        assert_eq!(updated["vendor"], Value::Null);

        store.delete("content", &id).await.unwrap();
        assert!(store.get_one("content", &id).await.unwrap_err().is_not_found());
        assert!(store.delete("content", &id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_unknown_table_and_column() {
        let (_tmp, store) = setup().await;
        let err = store.get_full_list("sqlite_master").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection { .. }));

        let err = store
            .get_list("tags", &ListQuery::default().filter("name\" OR 1=1 --", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));

        let err = store
            .create("tags", &obj(json!({ "name": "x", "colour": "red" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn test_foreign_key_enforced() {
        let (_tmp, store) = setup().await;
        let err = store
            .create(
                "content",
                &obj(json!({
                    "name": "X",
                    "slug": "x-stig",
                    "content_type": "validation",
                    "vendor": "missing_org_id"
                })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_list_filters_sort_limit_count() {
        let (_tmp, store) = setup().await;
        for name in ["Charlie", "Alpha", "Bravo"] {
            store
                .create("standards", &obj(json!({ "name": name, "short_name": "STIG" })))
                .await
                .unwrap();
        }
        store
            .create("standards", &obj(json!({ "name": "CIS Benchmarks", "short_name": "CIS" })))
            .await
            .unwrap();

        let query = ListQuery::default()
            .filter("short_name", "STIG")
            .sort_by("name", SortOrder::Desc)
            .limit(2);
        let rows = store.get_list("standards", &query).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Charlie", "Bravo"]);

        let all = store.get_full_list("standards").await.unwrap();
        assert_eq!(all[0]["name"], "Charlie");
        assert_eq!(store.count("standards").await.unwrap(), 4);
        store.health().await.unwrap();
    }
}

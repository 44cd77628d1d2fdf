//! SQLite schema for the local content database.
//!
//! Reference tables (organizations, standards, ...) share one shape. The
//! `content` and `tools` tables carry foreign keys into them and a
//! `CHECK` that version strings begin with a digit, so `v1.2.0` is
//! rejected by the database itself.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::LookupCategory;

/// Every table the generic CRUD commands may touch, sorted.
pub const TABLES: [&str; 10] = [
    "capabilities",
    "categories",
    "content",
    "organizations",
    "standards",
    "tags",
    "targets",
    "teams",
    "technologies",
    "tools",
];

pub fn is_known_table(name: &str) -> bool {
    TABLES.contains(&name)
}

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::create(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for category in LookupCategory::ALL {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                short_name TEXT,
                slug TEXT,
                description TEXT,
                website TEXT
            )
            "#,
            category.collection()
        );
        sqlx::query(&sql).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            content_type TEXT NOT NULL
                CHECK (content_type IN ('validation', 'hardening')),
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'beta', 'deprecated', 'draft')),
            version TEXT CHECK (version IS NULL OR version GLOB '[0-9]*'),
            description TEXT,
            long_description TEXT,
            github TEXT,
            documentation_url TEXT,
            reference_url TEXT,
            readme_url TEXT,
            readme_markdown TEXT,
            control_count INTEGER CHECK (control_count IS NULL OR control_count > 0),
            stig_id TEXT CHECK (stig_id IS NULL OR length(stig_id) <= 50),
            benchmark_version TEXT CHECK (benchmark_version IS NULL OR length(benchmark_version) <= 50),
            license TEXT,
            automation_level TEXT
                CHECK (automation_level IS NULL OR automation_level IN ('full', 'partial', 'manual')),
            is_featured INTEGER NOT NULL DEFAULT 0,
            featured_order INTEGER,
            vendor TEXT REFERENCES organizations(id),
            standard TEXT REFERENCES standards(id),
            technology TEXT REFERENCES technologies(id),
            target TEXT REFERENCES targets(id),
            maintainer TEXT REFERENCES teams(id),
            tags TEXT NOT NULL DEFAULT '[]',
            created TEXT,
            updated TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tools (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT UNIQUE,
            description TEXT,
            version TEXT CHECK (version IS NULL OR version GLOB '[0-9]*'),
            organization TEXT REFERENCES organizations(id),
            github TEXT,
            created TEXT,
            updated TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_type ON content(content_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_created ON content(created DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn temp_config(tmp: &TempDir) -> Config {
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data").join("saf.sqlite");
        config
    }

    #[test]
    fn test_tables_sorted_and_cover_lookups() {
        let mut sorted = TABLES.to_vec();
        sorted.sort();
        assert_eq!(sorted, TABLES.to_vec());
        for category in LookupCategory::ALL {
            assert!(is_known_table(category.collection()));
        }
        assert!(!is_known_table("sqlite_master"));
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let tmp = TempDir::new().unwrap();
        let config = temp_config(&tmp);
        run_migrations(&config).await.unwrap();
        run_migrations(&config).await.unwrap();
        assert!(config.db.path.exists());
    }

    #[tokio::test]
    async fn test_version_check_constraint() {
        let tmp = TempDir::new().unwrap();
        let config = temp_config(&tmp);
        let pool = db::create(&config).await.unwrap();
        create_schema(&pool).await.unwrap();

        let bad = sqlx::query(
            "INSERT INTO content (id, name, slug, content_type, version) VALUES ('a', 'A', 'a-stig', 'validation', 'v1.2.0')",
        )
        .execute(&pool)
        .await;
        assert!(bad.is_err());

        sqlx::query(
            "INSERT INTO content (id, name, slug, content_type, version) VALUES ('b', 'B', 'b-stig', 'validation', '1.2.0')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }
}

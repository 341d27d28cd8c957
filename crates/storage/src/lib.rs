use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

use shared::domain::NamespaceDefinition;

/// Ordered schema revisions. A store is ready once the last one is recorded.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "initial",
        r#"
        CREATE TABLE IF NOT EXISTS relation_tuple (
            namespace        TEXT NOT NULL,
            object_id        TEXT NOT NULL,
            relation         TEXT NOT NULL,
            userset_namespace TEXT NOT NULL,
            userset_object_id TEXT NOT NULL,
            userset_relation TEXT NOT NULL,
            created_at       TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (namespace, object_id, relation, userset_namespace, userset_object_id, userset_relation)
        )
        "#,
    ),
    (
        "add_namespace_config",
        r#"
        CREATE TABLE IF NOT EXISTS namespace_config (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace         TEXT NOT NULL UNIQUE CHECK (length(trim(namespace)) > 0),
            serialized_config TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
];

pub const HEAD_REVISION: &str = "add_namespace_config";

/// Read side of the permissions datastore consumed by the dashboard.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Whether the store has been migrated to the head revision.
    async fn is_ready(&self) -> Result<bool>;
    async fn list_namespaces(&self) -> Result<Vec<NamespaceDefinition>>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub revision: String,
    pub applied_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Applies every revision not yet recorded and returns the resulting head.
    pub async fn migrate(&self) -> Result<MigrationStatus> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                revision   TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure schema_migrations table exists")?;

        for (revision, statement) in MIGRATIONS {
            // Claiming the revision first takes the write lock, so a concurrent
            // migrate either waits for us or finds the row already present.
            let mut tx = self.pool.begin().await?;
            let claimed = sqlx::query(
                "INSERT OR IGNORE INTO schema_migrations (revision, applied_at) VALUES (?, ?)",
            )
            .bind(*revision)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed recording migration '{revision}'"))?
            .rows_affected();
            if claimed == 0 {
                tx.rollback().await?;
                continue;
            }

            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed applying migration '{revision}'"))?;
            tx.commit().await?;
            info!(%revision, "applied migration");
        }

        self.migration_status()
            .await?
            .context("schema_migrations is empty after migrating")
    }

    /// Latest applied revision, or `None` when the store was never migrated.
    pub async fn migration_status(&self) -> Result<Option<MigrationStatus>> {
        if !self.has_table("schema_migrations").await? {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT revision, applied_at FROM schema_migrations
             ORDER BY rowid DESC
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| MigrationStatus {
            revision: r.get::<String, _>(0),
            applied_at: r.get::<DateTime<Utc>, _>(1),
        }))
    }

    /// Inserts or replaces a namespace by name. Replacing keeps its position
    /// in the listing order.
    pub async fn write_namespace(&self, definition: &NamespaceDefinition) -> Result<()> {
        self.write_namespaces(std::slice::from_ref(definition)).await
    }

    /// Writes all definitions in one transaction; on any failure none of
    /// them are stored.
    pub async fn write_namespaces(&self, definitions: &[NamespaceDefinition]) -> Result<()> {
        if !self.is_ready().await? {
            bail!("datastore is not migrated to '{HEAD_REVISION}'; run the migrate command first");
        }

        let mut tx = self.pool.begin().await?;
        for definition in definitions {
            let serialized = serde_json::to_string(definition)
                .with_context(|| format!("failed to serialize namespace '{}'", definition.name))?;
            sqlx::query(
                "INSERT INTO namespace_config (namespace, serialized_config, updated_at)
                 VALUES (?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(namespace) DO UPDATE SET
                    serialized_config = excluded.serialized_config,
                    updated_at = CURRENT_TIMESTAMP",
            )
            .bind(&definition.name)
            .bind(serialized)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to write namespace '{}'", definition.name))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM namespace_config WHERE namespace = ?")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("failed to inspect sqlite_master for '{table}'"))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl Datastore for Storage {
    async fn is_ready(&self) -> Result<bool> {
        if !self.has_table("schema_migrations").await? {
            return Ok(false);
        }

        let head: Option<String> =
            sqlx::query_scalar("SELECT revision FROM schema_migrations WHERE revision = ?")
                .bind(HEAD_REVISION)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read schema_migrations")?;
        Ok(head.is_some())
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceDefinition>> {
        let rows = sqlx::query("SELECT namespace, serialized_config FROM namespace_config ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("failed to load namespace_config")?;

        rows.into_iter()
            .map(|r| {
                let name = r.get::<String, _>(0);
                let raw = r.get::<String, _>(1);
                serde_json::from_str::<NamespaceDefinition>(&raw)
                    .with_context(|| format!("corrupt namespace config for '{name}'"))
            })
            .collect()
    }
}

pub fn prepare_database_url(raw_database_url: &str, default_url: &str) -> Result<String> {
    let database_url = normalize_database_url(raw_database_url, default_url);
    ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str, default_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return default_url.to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

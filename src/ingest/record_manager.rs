//! Persistent bookkeeping of which document hashes were indexed under a scope.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::core::errors::RagError;

/// One entry per (scope, content key), refreshed on every ingestion run that
/// sees the same content.
pub struct RecordManager {
    pool: SqlitePool,
}

/// Accepts sqlx-style and SQLAlchemy-style sqlite URLs.
///
/// `sqlite:////abs/path.db` and `sqlite:///rel.db` follow SQLAlchemy (three
/// slashes means relative); `sqlite://path` and `sqlite:path` are taken as
/// given; `sqlite::memory:` is an in-memory database.
fn connect_options(db_url: &str) -> Result<(SqliteConnectOptions, bool), RagError> {
    if db_url == "sqlite::memory:" || db_url == "sqlite://:memory:" {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(RagError::collaborator)?;
        return Ok((options, true));
    }

    let path = if let Some(abs) = db_url.strip_prefix("sqlite:////") {
        format!("/{abs}")
    } else if let Some(rel) = db_url.strip_prefix("sqlite:///") {
        rel.to_string()
    } else if let Some(rest) = db_url.strip_prefix("sqlite://") {
        rest.to_string()
    } else if let Some(rest) = db_url.strip_prefix("sqlite:") {
        rest.to_string()
    } else {
        return Err(RagError::InvalidInput(format!(
            "unsupported record manager database url: {db_url} (only sqlite is supported)"
        )));
    };

    if path.is_empty() {
        return Err(RagError::InvalidInput(
            "record manager database url has no path".to_string(),
        ));
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    Ok((options, false))
}

impl RecordManager {
    pub async fn connect(db_url: &str) -> Result<Self, RagError> {
        let (options, in_memory) = connect_options(db_url)?;

        // every pooled connection to :memory: would be a separate database
        let mut pool_options = SqlitePoolOptions::new().min_connections(1);
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(4)
        };
        let pool = pool_options.connect_with(options).await?;

        let manager = Self { pool };
        manager.create_schema().await?;
        Ok(manager)
    }

    async fn create_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS upsertion_record (
                uuid TEXT PRIMARY KEY,
                key TEXT NOT NULL,
                namespace TEXT NOT NULL,
                group_id TEXT,
                updated_at INTEGER NOT NULL,
                UNIQUE (key, namespace)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_upsertion_namespace_updated
             ON upsertion_record(namespace, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_upsertion_namespace_group
             ON upsertion_record(namespace, group_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current time in microseconds since the epoch.
    pub fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }

    /// For each key, whether it is already recorded under `namespace`.
    pub async fn exists(&self, namespace: &str, keys: &[String]) -> Result<Vec<bool>, RagError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT key FROM upsertion_record WHERE namespace = ");
        builder.push_bind(namespace).push(" AND key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let found: std::collections::HashSet<String> =
            rows.iter().map(|row| row.get::<String, _>("key")).collect();

        Ok(keys.iter().map(|k| found.contains(k)).collect())
    }

    /// Inserts or refreshes records, stamping them with `updated_at`.
    pub async fn update(
        &self,
        namespace: &str,
        keys: &[String],
        group_ids: &[String],
        updated_at: i64,
    ) -> Result<(), RagError> {
        if keys.len() != group_ids.len() {
            return Err(RagError::InvalidInput(format!(
                "{} keys but {} group ids",
                keys.len(),
                group_ids.len()
            )));
        }

        let mut tx = self.pool.begin().await?;
        for (key, group_id) in keys.iter().zip(group_ids) {
            sqlx::query(
                "INSERT INTO upsertion_record (uuid, key, namespace, group_id, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(key, namespace) DO UPDATE SET
                    group_id = excluded.group_id,
                    updated_at = excluded.updated_at",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(key)
            .bind(namespace)
            .bind(group_id)
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Keys under `namespace` last touched before `before`, optionally
    /// restricted to some groups.
    pub async fn list_keys(
        &self,
        namespace: &str,
        before: i64,
        group_ids: Option<&[String]>,
    ) -> Result<Vec<String>, RagError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT key FROM upsertion_record WHERE namespace = ");
        builder
            .push_bind(namespace)
            .push(" AND updated_at < ")
            .push_bind(before);

        if let Some(groups) = group_ids {
            if groups.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND group_id IN (");
            let mut separated = builder.separated(", ");
            for group in groups {
                separated.push_bind(group);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY key");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("key")).collect())
    }

    pub async fn delete_keys(&self, namespace: &str, keys: &[String]) -> Result<u64, RagError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM upsertion_record WHERE namespace = ");
        builder.push_bind(namespace).push(" AND key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self, namespace: &str) -> Result<i64, RagError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM upsertion_record WHERE namespace = ?")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }
}

//! Embedded file-backed SQLite store for local development.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Column, Row, Sqlite, ValueRef};
use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::schema::{self, TABLES};
use crate::store::{DbRow, DbValue, ExecOutcome, Store, StoreError};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file. The schema is not touched until
    /// [`Store::bootstrap`].
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "opened SQLite store");
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let rows = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[table.into()],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn table_columns(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        let rows = self
            .query("SELECT name FROM pragma_table_info(?)", &[table.into()])
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_string))
            .collect())
    }

    /// Drops tables left by an older layout, together with everything depending on them,
    /// so that they are recreated with the current columns. Preserved tables are only
    /// reported.
    async fn drop_outdated_tables(&self) -> Result<Vec<&'static str>, StoreError> {
        let mut dropped = Vec::new();
        for def in TABLES {
            if dropped.contains(&def.name) || !self.table_exists(def.name).await? {
                continue;
            }
            let columns = self.table_columns(def.name).await?;
            let missing: Vec<&str> = def
                .required
                .iter()
                .copied()
                .filter(|c| !columns.contains(*c))
                .collect();
            if missing.is_empty() {
                continue;
            }
            if schema::is_preserved(def.name) {
                warn!(
                    table = def.name,
                    missing = ?missing,
                    "outdated layout on a table holding member data, left as is"
                );
                continue;
            }

            warn!(
                table = def.name,
                missing = ?missing,
                "outdated table layout, dropping it and its dependents"
            );
            for name in schema::drop_order(def.name) {
                self.execute(&format!("DROP TABLE IF EXISTS {name}"), &[])
                    .await?;
                if !dropped.contains(&name) {
                    dropped.push(name);
                }
            }
        }
        Ok(dropped)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[DbValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            DbValue::Null => query.bind(None::<String>),
            DbValue::Integer(v) => query.bind(*v),
            DbValue::Real(v) => query.bind(*v),
            DbValue::Text(v) => query.bind(v.clone()),
            DbValue::Blob(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<DbRow, StoreError> {
    let mut columns = BTreeMap::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            DbValue::Null
        } else if let Ok(v) = row.try_get::<i64, _>(idx) {
            DbValue::Integer(v)
        } else if let Ok(v) = row.try_get::<f64, _>(idx) {
            DbValue::Real(v)
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            DbValue::Text(v)
        } else {
            DbValue::Blob(row.try_get::<Vec<u8>, _>(idx)?)
        };
        columns.insert(column.name().to_string(), value);
    }
    Ok(DbRow::new(columns))
}

#[async_trait]
impl Store for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<ExecOutcome, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id > 0),
        })
    }

    async fn query(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn bootstrap(&self) -> Result<(), StoreError> {
        let dropped = self.drop_outdated_tables().await?;
        for def in TABLES {
            self.execute(def.create, &[]).await?;
        }
        if dropped.is_empty() {
            debug!(tables = TABLES.len(), "SQLite schema ready");
        } else {
            info!(recreated = ?dropped, "SQLite schema migrated");
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

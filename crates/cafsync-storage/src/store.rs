//! Backend-neutral store contract.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use cafsync_core::EntityKind;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;
use tracing::info;

use crate::dialect::{Dialect, Upsert};
use crate::mysql::{MySqlCredentials, MySqlStore};
use crate::sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("MySQL was requested but credentials are incomplete (missing {0})")]
    MissingCredentials(String),

    #[error("store is closed")]
    Closed,

    #[error("cannot create database directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected value in column `{column}`")]
    UnexpectedValue { column: String },
}

impl StoreError {
    /// Vendor error code of the underlying database error, when there is one: the MySQL
    /// error number (`1062`) rather than its SQLSTATE, the extended result code on SQLite.
    pub fn code(&self) -> Option<String> {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                match db.try_downcast_ref::<MySqlDatabaseError>() {
                    Some(mysql) => Some(mysql.number().to_string()),
                    None => db.code().map(|c| c.into_owned()),
                }
            }
            _ => None,
        }
    }

    pub fn is_missing_table(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.message().contains("no such table")
                    || db.message().contains("doesn't exist")
                    || db.code().is_some_and(|c| c == "42S02")
            }
            _ => false,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.is_unique_violation() || db.message().contains("Duplicate entry")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DbValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Integer(v) => Some(*v),
            DbValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::Integer(value)
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Integer(value.into())
    }
}

impl From<usize> for DbValue {
    fn from(value: usize) -> Self {
        DbValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Integer(i64::from(value))
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Real(value)
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_string())
    }
}

impl From<&String> for DbValue {
    fn from(value: &String) -> Self {
        DbValue::Text(value.clone())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DbValue::Null, Into::into)
    }
}

/// One result row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbRow {
    columns: BTreeMap<String, DbValue>,
}

impl DbRow {
    pub fn new(columns: BTreeMap<String, DbValue>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.columns.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(DbValue::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(DbValue::as_str)
    }

    pub fn require_i64(&self, column: &str) -> Result<i64, StoreError> {
        self.get_i64(column).ok_or_else(|| StoreError::UnexpectedValue {
            column: column.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Uniform access to the relational store, whatever the backend.
///
/// Statements use `?` placeholders on both backends. Syntax that differs (upserts,
/// insert-ignore, the current timestamp) is rendered through [`Store::dialect`].
#[async_trait]
pub trait Store: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn is_connected(&self) -> bool;

    async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<ExecOutcome, StoreError>;

    async fn query(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, StoreError>;

    /// Creates (SQLite) or verifies (MySQL) the schema.
    async fn bootstrap(&self) -> Result<(), StoreError>;

    async fn close(&self);

    /// Internal id of a member. `None` when the membership number is unknown.
    async fn member_id(&self, cafnum: &str) -> Result<Option<i64>, StoreError> {
        let rows = self
            .query(
                "SELECT id_user FROM caf_user WHERE cafnum_user = ? LIMIT 1",
                &[cafnum.into()],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get_i64("id_user")))
    }

    async fn record_last_sync(
        &self,
        kind: EntityKind,
        at: DateTime<Utc>,
        count: usize,
    ) -> Result<(), StoreError> {
        let sql = self.dialect().upsert(&Upsert {
            table: "formation_last_sync",
            columns: &["type", "last_sync", "records_count"],
            conflict: &["type"],
            update: &["last_sync", "records_count"],
            touch: &[],
        });
        self.execute(
            &sql,
            &[
                kind.sync_key().into(),
                at.format("%Y-%m-%d %H:%M:%S").to_string().into(),
                count.into(),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Backend requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendChoice {
    #[default]
    Auto,
    Sqlite,
    MySql,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql(MySqlCredentials),
}

impl Backend {
    pub fn dialect(&self) -> Dialect {
        match self {
            Backend::Sqlite => Dialect::Sqlite,
            Backend::MySql(_) => Dialect::MySql,
        }
    }
}

/// Resolves the backend: a forced choice wins, MySQL is fatal without complete
/// credentials, and auto-detection picks MySQL only when every credential is present.
pub fn select_backend(
    choice: BackendChoice,
    mysql: Option<&MySqlCredentials>,
) -> Result<Backend, StoreError> {
    match (choice, mysql) {
        (BackendChoice::Sqlite, _) => Ok(Backend::Sqlite),
        (BackendChoice::MySql, Some(creds)) if creds.is_complete() => {
            Ok(Backend::MySql(creds.clone()))
        }
        (BackendChoice::MySql, Some(creds)) => {
            Err(StoreError::MissingCredentials(creds.missing().join(", ")))
        }
        (BackendChoice::MySql, None) => Err(StoreError::MissingCredentials(
            MySqlCredentials::ENV_VARS.join(", "),
        )),
        (BackendChoice::Auto, Some(creds)) if creds.is_complete() => {
            Ok(Backend::MySql(creds.clone()))
        }
        (BackendChoice::Auto, _) => Ok(Backend::Sqlite),
    }
}

/// Connects the selected backend and bootstraps its schema.
pub async fn open_store(
    backend: &Backend,
    sqlite_path: &Path,
) -> Result<Box<dyn Store>, StoreError> {
    let store: Box<dyn Store> = match backend {
        Backend::Sqlite => {
            info!(path = %sqlite_path.display(), "using SQLite store");
            Box::new(SqliteStore::open(sqlite_path).await?)
        }
        Backend::MySql(creds) => {
            info!(host = %creds.host, database = %creds.database, "using MySQL store");
            Box::new(MySqlStore::connect(creds).await?)
        }
    };
    store.bootstrap().await?;
    Ok(store)
}

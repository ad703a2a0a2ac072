//! Networked MySQL store. The production schema is managed outside this tool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row, ValueRef};
use tracing::info;

use crate::dialect::Dialect;
use crate::store::{DbRow, DbValue, ExecOutcome, Store, StoreError};

#[derive(Clone, PartialEq, Eq)]
pub struct MySqlCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for MySqlCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl MySqlCredentials {
    pub const ENV_VARS: [&'static str; 4] = [
        "MYSQL_ADDON_HOST",
        "MYSQL_ADDON_USER",
        "MYSQL_ADDON_PASSWORD",
        "MYSQL_ADDON_DB",
    ];

    /// Reads `MYSQL_ADDON_*`. Returns `None` when none of the variables is set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default().trim().to_string();
        let creds = Self {
            host: var("MYSQL_ADDON_HOST"),
            port: var("MYSQL_ADDON_PORT").parse().unwrap_or(3306),
            user: var("MYSQL_ADDON_USER"),
            password: var("MYSQL_ADDON_PASSWORD"),
            database: var("MYSQL_ADDON_DB"),
        };
        (creds.missing().len() < Self::ENV_VARS.len()).then_some(creds)
    }

    /// Names of the variables that are still empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [&self.host, &self.user, &self.password, &self.database]
            .into_iter()
            .zip(Self::ENV_VARS)
            .filter(|(value, _)| value.is_empty())
            .map(|(_, name)| name)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(creds: &MySqlCredentials) -> Result<Self, StoreError> {
        if !creds.is_complete() {
            return Err(StoreError::MissingCredentials(creds.missing().join(", ")));
        }
        let options = MySqlConnectOptions::new()
            .host(&creds.host)
            .port(creds.port)
            .username(&creds.user)
            .password(&creds.password)
            .database(&creds.database)
            .charset("utf8mb4");
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(host = %creds.host, database = %creds.database, "connected to MySQL");
        Ok(Self { pool })
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[DbValue],
) -> Query<'q, MySql, MySqlArguments> {
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

fn decode_row(row: &MySqlRow) -> Result<DbRow, StoreError> {
    let mut columns = BTreeMap::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            DbValue::Null
        } else if let Ok(v) = row.try_get::<i64, _>(idx) {
            DbValue::Integer(v)
        } else if let Ok(v) = row.try_get::<u64, _>(idx) {
            DbValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
        } else if let Ok(v) = row.try_get::<bool, _>(idx) {
            DbValue::from(v)
        } else if let Ok(v) = row.try_get::<f64, _>(idx) {
            DbValue::Real(v)
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            DbValue::Text(v)
        } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            DbValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string())
        } else if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
            DbValue::Text(v.format("%Y-%m-%d").to_string())
        } else {
            DbValue::Blob(row.try_get::<Vec<u8>, _>(idx)?)
        };
        columns.insert(column.name().to_string(), value);
    }
    Ok(DbRow::new(columns))
}

#[async_trait]
impl Store for MySqlStore {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
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
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .filter(|id| *id > 0),
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
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_empty_variables_in_order() {
        let creds = MySqlCredentials {
            host: "h".into(),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: "d".into(),
        };
        assert_eq!(
            creds.missing(),
            vec!["MYSQL_ADDON_USER", "MYSQL_ADDON_PASSWORD"]
        );
        assert!(!creds.is_complete());
    }

    #[test]
    fn debug_output_hides_the_password() {
        let creds = MySqlCredentials {
            host: "h".into(),
            port: 3306,
            user: "u".into(),
            password: "hunter2".into(),
            database: "d".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}

//! Data stores that back the `query_database` tool.
//!
//! A [`QueryStore`] runs one SQL statement and hands back rows as JSON
//! objects keyed by column name. The SQLite implementation is behind the
//! `sqlite` feature (on by default).

use async_trait::async_trait;
use stepwise_core::error::ToolError;

/// A single result row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Run a SQL statement and return every row it produced.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ToolError>;
}

fn store_error(reason: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: crate::query_database::NAME.into(),
        reason: reason.to_string(),
    }
}

#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteQueryStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::{QueryStore, Row, store_error};
    use async_trait::async_trait;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
    use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
    use std::str::FromStr;
    use stepwise_core::error::ToolError;
    use tracing::{debug, info};

    /// SQLite-backed store. Opens the file read-write and creates it if missing.
    pub struct SqliteQueryStore {
        pool: SqlitePool,
    }

    impl SqliteQueryStore {
        /// Open a store from a path or `sqlite:` URL.
        ///
        /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
        pub async fn new(path: &str) -> Result<Self, ToolError> {
            let options = SqliteConnectOptions::from_str(path)
                .map_err(|e| store_error(format!("Invalid SQLite path: {e}")))?
                .create_if_missing(true);

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(|e| store_error(format!("Failed to open SQLite: {e}")))?;

            info!(path, "SQLite query store opened");
            Ok(Self { pool })
        }

        /// Like [`new`](Self::new), but the file is only opened on first query.
        pub fn open_lazy(path: &str) -> Result<Self, ToolError> {
            let options = SqliteConnectOptions::from_str(path)
                .map_err(|e| store_error(format!("Invalid SQLite path: {e}")))?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_lazy_with(options);
            debug!(path, "SQLite query store configured");
            Ok(Self { pool })
        }

        /// Wrap an existing pool (useful for testing).
        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl QueryStore for SqliteQueryStore {
        fn name(&self) -> &str {
            "sqlite"
        }

        async fn execute(&self, sql: &str) -> Result<Vec<Row>, ToolError> {
            let rows = sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;
            debug!(rows = rows.len(), "SQLite query finished");
            rows.iter().map(row_to_json).collect()
        }
    }

    /// Decode by the value's runtime storage class; SQLite columns are untyped.
    fn row_to_json(row: &SqliteRow) -> Result<Row, ToolError> {
        let mut out = Row::new();
        for (i, column) in row.columns().iter().enumerate() {
            let raw = row.try_get_raw(i).map_err(store_error)?;
            let value = if raw.is_null() {
                serde_json::Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(i).map_err(store_error)?.into(),
                    "REAL" | "NUMERIC" => row.try_get::<f64, _>(i).map_err(store_error)?.into(),
                    "BLOB" => {
                        let bytes: Vec<u8> = row.try_get(i).map_err(store_error)?;
                        serde_json::Value::String(format!("<{} bytes>", bytes.len()))
                    }
                    _ => row.try_get::<String, _>(i).map_err(store_error)?.into(),
                }
            };
            out.insert(column.name().to_string(), value);
        }
        Ok(out)
    }

}

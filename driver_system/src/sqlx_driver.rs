//! sqlx-backed openers for Postgres, MySQL and SQLite

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::any::Any;
use std::sync::Arc;

use crate::errors::DriverError;
use crate::handle::{BackendHandle, BackendOpener, OpenRequest};
use crate::kind::BackendKind;

const PROBE_SQL: &str = "SELECT 1";
const DEFAULT_POOL_SIZE: u32 = 10;

/// Pool for one of the sqlx-supported engines
#[derive(Debug, Clone)]
pub enum SqlxPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Backend handle wrapping a sqlx pool
#[derive(Debug, Clone)]
pub struct SqlxHandle {
    pool: SqlxPool,
}

impl SqlxHandle {
    pub fn new(pool: SqlxPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlxPool {
        &self.pool
    }

    pub fn postgres(&self) -> Option<&PgPool> {
        match &self.pool {
            SqlxPool::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn mysql(&self) -> Option<&MySqlPool> {
        match &self.pool {
            SqlxPool::MySql(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn sqlite(&self) -> Option<&SqlitePool> {
        match &self.pool {
            SqlxPool::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }
}

#[async_trait]
impl BackendHandle for SqlxHandle {
    fn kind(&self) -> BackendKind {
        match self.pool {
            SqlxPool::Postgres(_) => BackendKind::Postgres,
            SqlxPool::MySql(_) => BackendKind::MySql,
            SqlxPool::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    async fn probe(&self) -> Result<(), DriverError> {
        match &self.pool {
            SqlxPool::Postgres(pool) => {
                sqlx::query(PROBE_SQL).fetch_one(pool).await?;
            }
            SqlxPool::MySql(pool) => {
                sqlx::query(PROBE_SQL).fetch_one(pool).await?;
            }
            SqlxPool::Sqlite(pool) => {
                sqlx::query(PROBE_SQL).fetch_one(pool).await?;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        match &self.pool {
            SqlxPool::Postgres(pool) => pool.close().await,
            SqlxPool::MySql(pool) => pool.close().await,
            SqlxPool::Sqlite(pool) => pool.close().await,
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Opens sqlx pools sized by the request's pool-size hint
#[derive(Debug, Clone, Default)]
pub struct SqlxOpener;

impl SqlxOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendOpener for SqlxOpener {
    async fn open(&self, request: &OpenRequest) -> Result<Arc<dyn BackendHandle>, DriverError> {
        let max_connections = request.pool_size.unwrap_or(DEFAULT_POOL_SIZE);

        let pool = match request.kind {
            BackendKind::Postgres => {
                let mut options = PgPoolOptions::new().max_connections(max_connections);
                if let Some(timeout) = request.timeout {
                    options = options.acquire_timeout(timeout);
                }
                SqlxPool::Postgres(options.connect(&request.url).await?)
            }
            BackendKind::MySql => {
                let mut options = MySqlPoolOptions::new().max_connections(max_connections);
                if let Some(timeout) = request.timeout {
                    options = options.acquire_timeout(timeout);
                }
                SqlxPool::MySql(options.connect(&mysql_url(&request.url)).await?)
            }
            BackendKind::Sqlite => {
                let mut options = SqlitePoolOptions::new().max_connections(max_connections);
                if let Some(timeout) = request.timeout {
                    options = options.acquire_timeout(timeout);
                }
                SqlxPool::Sqlite(options.connect(&request.url).await?)
            }
            other => {
                return Err(DriverError::Backend(format!(
                    "sqlx opener cannot open {} connections",
                    other
                )));
            }
        };

        tracing::debug!(backend = %request.kind, max_connections, "sqlx pool opened");
        Ok(Arc::new(SqlxHandle::new(pool)))
    }
}

/// sqlx only understands the `mysql` scheme
fn mysql_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("mariadb") => {
            format!("mysql://{}", rest)
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mariadb_scheme_is_rewritten() {
        assert_eq!(mysql_url("mariadb://u:p@h/db"), "mysql://u:p@h/db");
        assert_eq!(mysql_url("mysql://u:p@h/db"), "mysql://u:p@h/db");
    }

    #[tokio::test]
    async fn test_sqlite_memory_open_probe_close() {
        let request = OpenRequest::new(BackendKind::Sqlite, "sqlite::memory:").with_pool_size(Some(1));
        let handle = SqlxOpener::new().open(&request).await.unwrap();

        assert_eq!(handle.kind(), BackendKind::Sqlite);
        handle.probe().await.unwrap();

        let sqlx_handle = handle.as_any().downcast_ref::<SqlxHandle>().unwrap();
        assert!(sqlx_handle.sqlite().is_some());
        assert!(sqlx_handle.postgres().is_none());

        handle.close().await.unwrap();
        assert!(handle.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_libsql_requests() {
        let request = OpenRequest::new(BackendKind::LibSql, "libsql://edge.example.io");
        let err = SqlxOpener::new().open(&request).await.err().unwrap();
        assert!(matches!(err, DriverError::Backend(_)));
    }
}

use async_trait::async_trait;
use keiba_common::config::DbConfig;
use keiba_connectors::{PgConnection, QueryParams, Table};
use keiba_error::Result;

/// Runs a query to completion and returns every row.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Table>;
}

/// Executes against PostgreSQL, one fresh connection per call.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    config: DbConfig,
}

impl PostgresExecutor {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Open a new connection. Callers own it; nothing is pooled.
    pub async fn connect(&self) -> Result<PgConnection> {
        PgConnection::connect(&self.config).await
    }

    async fn run(&self, sql: &str, params: &QueryParams) -> Result<Table> {
        let conn = self.connect().await?;
        conn.query_table(sql, params).await
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    /// Failures are logged as two lines (the error, then the query) and
    /// returned unchanged.
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Table> {
        let result = self.run(sql, params).await;
        if let Err(e) = &result {
            tracing::error!("Database error: {}", e);
            tracing::error!("Query: {}", sql);
        }
        result
    }
}

#[async_trait]
impl<E: QueryExecutor + ?Sized> QueryExecutor for Box<E> {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Table> {
        (**self).execute(sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keiba_error::ErrorCode;

    #[tokio::test]
    async fn test_invalid_port_fails_before_connecting() {
        let executor = PostgresExecutor::new(DbConfig::new("127.0.0.1", "nope", "d", "u", "p"));
        let err = executor
            .execute("SELECT 1", &QueryParams::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPort);
    }

    #[tokio::test]
    async fn test_boxed_executor_delegates() {
        let boxed: Box<dyn QueryExecutor> = Box::new(PostgresExecutor::new(DbConfig::new(
            "127.0.0.1",
            "0",
            "d",
            "u",
            "p",
        )));
        let err = boxed
            .execute("SELECT 1", &QueryParams::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPort);
    }
}

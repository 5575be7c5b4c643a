//! Blocking entry point for synchronous callers.
//!
//! [`Database`] owns a small private Tokio runtime and blocks the calling
//! thread on each operation. It must not be used from inside an async
//! context; doing so returns `RuntimeUnavailable` instead of panicking.

use keiba_common::config::AppConfig;
use keiba_connectors::{PgConnection, QueryParams, Table};
use keiba_error::{ErrorCode, KeibaError, Result};
use tokio::runtime::Runtime;

use crate::cache::{CacheStatus, CachedExecutor, ResultCache};
use crate::executor::{PostgresExecutor, QueryExecutor};

const RUNTIME_THREAD_NAME: &str = "keiba-db-runtime";

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .thread_name(RUNTIME_THREAD_NAME)
        .build()
        .map_err(|e| {
            KeibaError::new(
                ErrorCode::RuntimeUnavailable,
                format!("Failed to create runtime: {}", e),
            )
        })
}

/// `block_on` panics when nested inside a Tokio context; report it instead.
fn check_not_in_tokio_context(method: &str) -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        Err(KeibaError::new(
            ErrorCode::RuntimeUnavailable,
            format!(
                "Database::{}() must not be called from within a Tokio async context",
                method
            ),
        )
        .with_hint("Use the async executors directly, or call from spawn_blocking"))
    } else {
        Ok(())
    }
}

pub struct Database<E = PostgresExecutor> {
    config: AppConfig,
    runtime: Runtime,
    executor: CachedExecutor<E>,
}

impl Database<PostgresExecutor> {
    pub fn new(config: AppConfig) -> Result<Self> {
        let executor = PostgresExecutor::new(config.database.clone());
        Self::with_executor(config, executor)
    }

    /// Load configuration from `.env` and the environment, creating the
    /// cache directory.
    pub fn from_env() -> Result<Self> {
        Self::new(AppConfig::load()?)
    }

    /// Open a dedicated connection.
    pub fn connect(&self) -> Result<Connection<'_>> {
        check_not_in_tokio_context("connect")?;
        let conn = self.runtime.block_on(self.executor.inner().connect())?;
        Ok(Connection {
            conn,
            runtime: &self.runtime,
        })
    }
}

impl<E: QueryExecutor> Database<E> {
    pub fn with_executor(config: AppConfig, executor: E) -> Result<Self> {
        let runtime = build_runtime()?;
        let cache = ResultCache::new(config.cache.directory.clone());
        Ok(Self {
            config,
            runtime,
            executor: CachedExecutor::new(executor, cache),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn executor(&self) -> &CachedExecutor<E> {
        &self.executor
    }

    pub fn execute_query(&self, sql: &str, params: Option<&QueryParams>) -> Result<Table> {
        check_not_in_tokio_context("execute_query")?;
        let empty = QueryParams::new();
        let params = params.unwrap_or(&empty);
        self.runtime.block_on(self.executor.execute(sql, params))
    }

    pub fn query_with_cache(
        &self,
        sql: &str,
        cache_name: &str,
        params: Option<&QueryParams>,
        force_refresh: bool,
    ) -> Result<Table> {
        self.query_with_cache_status(sql, cache_name, params, force_refresh)
            .map(|(table, _)| table)
    }

    pub fn query_with_cache_status(
        &self,
        sql: &str,
        cache_name: &str,
        params: Option<&QueryParams>,
        force_refresh: bool,
    ) -> Result<(Table, CacheStatus)> {
        check_not_in_tokio_context("query_with_cache")?;
        let empty = QueryParams::new();
        let params = params.unwrap_or(&empty);
        self.runtime.block_on(
            self.executor
                .query_with_cache_status(sql, cache_name, params, force_refresh),
        )
    }
}

/// A connection opened through [`Database::connect`].
pub struct Connection<'db> {
    conn: PgConnection,
    runtime: &'db Runtime,
}

impl Connection<'_> {
    pub fn ping(&self) -> Result<()> {
        check_not_in_tokio_context("ping")?;
        self.runtime.block_on(self.conn.ping())
    }

    pub fn query(&self, sql: &str, params: Option<&QueryParams>) -> Result<Table> {
        check_not_in_tokio_context("query")?;
        let empty = QueryParams::new();
        self.runtime
            .block_on(self.conn.query_table(sql, params.unwrap_or(&empty)))
    }
}

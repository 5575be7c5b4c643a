//! Query execution for keiba.
//!
//! - [`executor`]: the [`QueryExecutor`] seam and its PostgreSQL implementation.
//! - [`cache`]: Parquet-backed result cache keyed by caller-chosen names.
//! - [`database`]: blocking facade for synchronous callers.

pub mod cache;
pub mod database;
pub mod executor;

pub use cache::{CacheStatus, CachedExecutor, ResultCache};
pub use database::{Connection, Database};
pub use executor::{PostgresExecutor, QueryExecutor};

//! On-disk query result cache.
//!
//! Each cache name maps to one `<name>.pkl` file below the cache directory.
//! The file holds the table as Parquet. A result is read back with its full
//! schema, so an empty result keeps its columns.
//!
//! There is no locking: two callers missing on the same name both query
//! and both write. Every write goes to its own temp file, so the last
//! persist wins and neither caller fails.

use std::path::{Component, Path, PathBuf};

use keiba_connectors::{QueryParams, Table};
use keiba_error::{ErrorCode, ErrorContext, KeibaError, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info, warn};

use crate::executor::QueryExecutor;

pub const CACHE_FILE_EXTENSION: &str = "pkl";

/// How a cached query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Read from the cache file; no query ran.
    Hit,
    /// No cache file; queried and stored.
    Miss,
    /// Refresh requested; queried and overwritten.
    Refreshed,
    /// Cache file could not be decoded; queried and overwritten.
    Recovered,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Refreshed => "refreshed",
            CacheStatus::Recovered => "recovered",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn join_error(e: tokio::task::JoinError) -> KeibaError {
    KeibaError::new(
        ErrorCode::InternalPanic,
        format!("Cache file task failed: {}", e),
    )
}

/// Parquet files under one directory, addressed by cache name.
#[derive(Debug, Clone)]
pub struct ResultCache {
    directory: PathBuf,
}

impl ResultCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<directory>/<name>.pkl`.
    ///
    /// `name` may contain sub-directories (`races/2020`) but must stay below
    /// the cache directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| {
            KeibaError::new(
                ErrorCode::InvalidCacheName,
                format!("Invalid cache name '{}': {}", name, reason),
            )
            .with_context(ErrorContext::Cache {
                cache_name: name.to_string(),
                path: None,
            })
        };

        if name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        for component in Path::new(name).components() {
            match component {
                Component::Normal(_) => {}
                Component::ParentDir | Component::CurDir => {
                    return Err(invalid("'.' and '..' are not allowed"))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("name must be a relative path"))
                }
            }
        }

        Ok(self
            .directory
            .join(format!("{}.{}", name, CACHE_FILE_EXTENSION)))
    }

    /// The cache name `path` was derived from, e.g. `races/2020` for
    /// `<directory>/races/2020.pkl`.
    fn name_of(&self, path: &Path) -> String {
        match path.strip_prefix(&self.directory) {
            Ok(relative) => relative.with_extension("").to_string_lossy().into_owned(),
            Err(_) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn with_path(&self, err: KeibaError, path: &Path) -> KeibaError {
        err.with_context(ErrorContext::Cache {
            cache_name: self.name_of(path),
            path: Some(path.display().to_string()),
        })
    }

    /// Read a cached table. Parquet I/O runs on the blocking pool.
    ///
    /// File system failures are `CacheIo`; a file that is not valid Parquet
    /// is `SerializationFailed`.
    pub async fn read(&self, path: &Path) -> Result<Table> {
        let path_buf = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            if !std::fs::metadata(&path_buf)?.is_file() {
                return Err(KeibaError::new(
                    ErrorCode::CacheIo,
                    format!("Cache path {} is not a regular file", path_buf.display()),
                ));
            }
            let file = std::fs::File::open(&path_buf)?;
            let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
            let schema = builder.schema().clone();
            let reader = builder.build()?;

            let mut batches = Vec::new();
            for batch in reader {
                batches.push(batch?);
            }
            Ok::<_, KeibaError>(Table::new(schema, batches))
        })
        .await
        .map_err(join_error)?
        .map_err(|e| self.with_path(e, path))
    }

    /// Write `table` to `path`, creating parent directories.
    ///
    /// Data goes to a uniquely named temp file next to the target, which is
    /// then persisted over it. A failed write removes its temp file.
    pub async fn write(&self, path: &Path, table: &Table) -> Result<()> {
        let path_buf = path.to_path_buf();
        let rows = table.num_rows();
        let table = table.clone();

        tokio::task::spawn_blocking(move || {
            let parent = path_buf.parent().unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(parent)?;

            let mut tmp = tempfile::Builder::new()
                .prefix(".keiba-")
                .suffix(".tmp")
                .tempfile_in(parent)?;
            write_parquet(tmp.as_file_mut(), &table)?;
            tmp.persist(&path_buf).map_err(|e| KeibaError::from(e.error))?;
            Ok::<_, KeibaError>(())
        })
        .await
        .map_err(join_error)?
        .map_err(|e| self.with_path(e, path))?;

        debug!(path = %path.display(), rows, "Wrote cache file");
        Ok(())
    }
}

fn write_parquet(file: &mut std::fs::File, table: &Table) -> Result<()> {
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, table.schema().clone(), Some(props))?;
    for batch in table.batches() {
        writer.write(batch)?;
    }
    writer.close()?;
    Ok(())
}

/// Wraps an executor with the file cache.
pub struct CachedExecutor<E> {
    executor: E,
    cache: ResultCache,
}

impl<E: QueryExecutor> CachedExecutor<E> {
    pub fn new(executor: E, cache: ResultCache) -> Self {
        Self { executor, cache }
    }

    pub fn inner(&self) -> &E {
        &self.executor
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Uncached pass-through to the wrapped executor.
    pub async fn execute(&self, sql: &str, params: &QueryParams) -> Result<Table> {
        self.executor.execute(sql, params).await
    }

    pub async fn query_with_cache(
        &self,
        sql: &str,
        cache_name: &str,
        params: &QueryParams,
        force_refresh: bool,
    ) -> Result<Table> {
        self.query_with_cache_status(sql, cache_name, params, force_refresh)
            .await
            .map(|(table, _)| table)
    }

    /// Serve `cache_name` from disk unless `force_refresh` is set or no file
    /// exists; otherwise run `sql` and store the result.
    ///
    /// A query failure leaves any existing cache file untouched. A cache
    /// file that cannot be decoded is logged and treated as a miss; any
    /// other cache I/O error is returned before the query runs.
    pub async fn query_with_cache_status(
        &self,
        sql: &str,
        cache_name: &str,
        params: &QueryParams,
        force_refresh: bool,
    ) -> Result<(Table, CacheStatus)> {
        let path = self.cache.path_for(cache_name)?;

        let mut status = if force_refresh {
            CacheStatus::Refreshed
        } else {
            CacheStatus::Miss
        };

        let cached = !force_refresh
            && tokio::fs::try_exists(&path)
                .await
                .map_err(|e| self.cache.with_path(e.into(), &path))?;

        if cached {
            info!(cache = cache_name, path = %path.display(), "Loading {} from cache", cache_name);
            match self.cache.read(&path).await {
                Ok(table) => return Ok((table, CacheStatus::Hit)),
                Err(e) if e.code == ErrorCode::SerializationFailed => {
                    warn!(
                        cache = cache_name,
                        path = %path.display(),
                        error = %e,
                        "Failed to read cache file, querying the database instead"
                    );
                    status = CacheStatus::Recovered;
                }
                Err(e) => return Err(e),
            }
        }

        info!(cache = cache_name, status = %status, "Fetching {} from database", cache_name);
        let table = self.executor.execute(sql, params).await?;
        self.cache.write(&path, &table).await?;
        Ok((table, status))
    }
}

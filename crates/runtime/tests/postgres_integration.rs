//! Runs against a live PostgreSQL server.
//!
//! Set `KEIBA_TEST_DATABASE=1` and the usual `DB_*` variables to enable;
//! otherwise every test returns early.

use arrow::datatypes::{DataType, TimeUnit};
use keiba_common::config::{AppConfig, DbConfig};
use keiba_connectors::{PgConnection, QueryParams};
use keiba_error::ErrorCode;
use keiba_runtime::{CacheStatus, CachedExecutor, PostgresExecutor, QueryExecutor, ResultCache};

const ENABLE_VAR: &str = "KEIBA_TEST_DATABASE";

fn live_config() -> Option<DbConfig> {
    if std::env::var(ENABLE_VAR).is_err() {
        eprintln!("skipping: {} not set", ENABLE_VAR);
        return None;
    }
    Some(AppConfig::from_env().database)
}

#[tokio::test]
async fn test_ping_and_type_mapping() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    let conn = PgConnection::connect(&config).await?;
    conn.ping().await?;

    let table = conn
        .query_table(
            "SELECT 1::int2 AS a, 2::int4 AS b, 3::int8 AS c, 1.5::float8 AS d, \
             12.34::numeric AS e, 'x'::text AS f, 'y'::char(2) AS g, true AS h, \
             DATE '2020-01-05' AS i, TIMESTAMP '2020-01-05 10:00:00' AS j, \
             TIMESTAMPTZ '2020-01-05 10:00:00+00' AS k, NULL::int4 AS l",
            &QueryParams::new(),
        )
        .await?;

    assert_eq!(table.num_rows(), 1);
    let types: Vec<DataType> = table
        .schema()
        .fields()
        .iter()
        .map(|f| f.data_type().clone())
        .collect();
    assert_eq!(
        types,
        vec![
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Float64,
            DataType::Float64,
            DataType::Utf8,
            DataType::Utf8,
            DataType::Boolean,
            DataType::Date32,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            DataType::Int32,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_named_parameters_adapt_to_column_types() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    let conn = PgConnection::connect(&config).await?;

    let params = QueryParams::new().with("n", "41").with("label", 7);
    let table = conn
        .query_table("SELECT :n::int4 + 1 AS n, :label::text AS label", &params)
        .await?;
    assert_eq!(table.num_rows(), 1);

    let bad = QueryParams::new().with("n", "forty-one");
    let err = conn
        .query_table("SELECT :n::int4 AS n", &bad)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ParameterTypeMismatch);
    Ok(())
}

#[tokio::test]
async fn test_missing_table_is_reported_and_not_cached() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    let dir = tempfile::tempdir()?;
    let exec = CachedExecutor::new(PostgresExecutor::new(config), ResultCache::new(dir.path()));

    let err = exec
        .query_with_cache(
            "SELECT * FROM keiba_no_such_table",
            "missing",
            &QueryParams::new(),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);
    assert!(!dir.path().join("missing.pkl").exists());

    let plain = exec
        .inner()
        .execute("SELECT * FROM keiba_no_such_table", &QueryParams::new())
        .await
        .unwrap_err();
    assert_eq!(plain.code, ErrorCode::TableNotFound);
    Ok(())
}

#[tokio::test]
async fn test_cached_round_trip_against_server() -> anyhow::Result<()> {
    let Some(config) = live_config() else {
        return Ok(());
    };
    let dir = tempfile::tempdir()?;
    let exec = CachedExecutor::new(PostgresExecutor::new(config), ResultCache::new(dir.path()));
    let sql = "SELECT g AS code, 'track ' || g AS name FROM generate_series(1, 5) AS g";

    let (first, status) = exec
        .query_with_cache_status(sql, "tracks", &QueryParams::new(), false)
        .await?;
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(first.num_rows(), 5);

    let (second, status) = exec
        .query_with_cache_status(sql, "tracks", &QueryParams::new(), false)
        .await?;
    assert_eq!(status, CacheStatus::Hit);
    assert_eq!(
        second.to_single_batch()?.columns(),
        first.to_single_batch()?.columns()
    );
    Ok(())
}

//! PostgreSQL connections that return query results as Arrow tables.

mod convert;
mod numeric;
mod params;

pub use convert::{map_pg_type, rows_to_batch, schema_for};
pub use numeric::PgNumeric;
pub use params::{bind_named, BoundQuery, ParamTypeError, ParamValue, QueryParams};

use keiba_common::config::DbConfig;
use keiba_error::{ErrorCode, ErrorContext, KeibaError, Result};
use secrecy::ExposeSecret;
use std::error::Error;
use tokio_postgres::{Client, NoTls};

use crate::table::Table;

/// Reported to the server as `application_name`.
pub const APPLICATION_NAME: &str = "keiba";

/// Driver configuration for `config`.
///
/// The port is parsed here; a non-numeric or zero port is a config error,
/// raised before any network traffic.
pub fn pg_config(config: &DbConfig) -> Result<tokio_postgres::Config> {
    let port = config
        .port
        .trim()
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| {
            KeibaError::new(
                ErrorCode::InvalidPort,
                format!("Invalid database port '{}'", config.port),
            )
            .with_hint("Set DB_PORT to a number between 1 and 65535")
        })?;

    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(port)
        .dbname(&config.name)
        .user(&config.user)
        .password(config.password.expose_secret())
        .application_name(APPLICATION_NAME);
    Ok(pg)
}

/// A single open session.
///
/// The connection task runs on the current Tokio runtime and ends when the
/// `PgConnection` is dropped.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pg = pg_config(config)?;

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            tracing::debug!(
                database = %config.redacted_connection_string(),
                error = %e,
                "Connection attempt failed"
            );
            KeibaError::from(e).with_context(ErrorContext::Connection {
                host: config.host.clone(),
                port: config.port.clone(),
                database: config.name.clone(),
            })
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        tracing::debug!(database = %config.redacted_connection_string(), "Connected");
        Ok(Self { client })
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// Run `sql` with its `:name` parameters bound and collect every row.
    ///
    /// The schema always comes from the prepared statement, so an empty
    /// result still carries its columns.
    pub async fn query_table(&self, sql: &str, params: &QueryParams) -> Result<Table> {
        let bound = bind_named(sql, params)?;
        let statement = self.client.prepare(bound.sql()).await?;
        let schema = schema_for(statement.columns())?;

        let rows = self
            .client
            .query(&statement, &bound.sql_params())
            .await
            .map_err(classify_query_error)?;

        if rows.is_empty() {
            return Ok(Table::empty(schema));
        }

        let batch = rows_to_batch(schema.clone(), statement.columns(), &rows)?;
        tracing::debug!(rows = rows.len(), columns = schema.fields().len(), "Query returned");
        Ok(Table::new(schema, vec![batch]))
    }
}

/// After a successful prepare, a client-side failure that is neither a
/// server error nor a broken connection comes from encoding a parameter.
fn classify_query_error(err: tokio_postgres::Error) -> KeibaError {
    if err.as_db_error().is_some() || err.is_closed() {
        return err.into();
    }

    let Some(source) = err.source() else {
        return err.into();
    };
    if source.downcast_ref::<std::io::Error>().is_some() {
        return err.into();
    }

    KeibaError::new(
        ErrorCode::ParameterTypeMismatch,
        format!("{}: {}", err, source),
    )
    .with_hint("Check that each parameter value matches the column it is compared with")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::Host;

    #[test]
    fn test_pg_config_from_db_config() {
        let config = DbConfig::new("db.internal", "6543", "pckeiba", "reader", "pw");
        let pg = pg_config(&config).unwrap();

        assert_eq!(pg.get_hosts(), &[Host::Tcp("db.internal".to_string())]);
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_dbname(), Some("pckeiba"));
        assert_eq!(pg.get_user(), Some("reader"));
        assert_eq!(pg.get_password(), Some(&b"pw"[..]));
        assert_eq!(pg.get_application_name(), Some(APPLICATION_NAME));
    }

    #[test]
    fn test_invalid_ports_are_config_errors() {
        for port in ["", "abc", "0", "70000", "-1"] {
            let config = DbConfig::new("h", port, "d", "u", "p");
            let err = pg_config(&config).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidPort, "port {:?}", port);
            assert!(err.hint.is_some());
        }
    }

    #[test]
    fn test_port_with_whitespace_is_accepted() {
        let config = DbConfig::new("h", " 5433 ", "d", "u", "p");
        assert_eq!(pg_config(&config).unwrap().get_ports(), &[5433]);
    }
}

//! keiba-db: check connectivity to the PC-KEIBA database and run ad-hoc
//! queries, optionally through the on-disk result cache.
//!
//! # Commands
//!
//! - `check` (default): connect and print a few rows of `ref_track_code`.
//! - `query`: run SQL with `--param name=value` bindings, optionally cached
//!   under `--cache-name`.

use clap::{Parser, Subcommand};

use keiba_common::config::AppConfig;
use keiba_common::telemetry::{init_tracing, DEFAULT_LOG_DIRECTIVE};
use keiba_connectors::{ParamValue, QueryParams};
use keiba_runtime::Database;

mod exit_codes;

const CHECK_QUERY: &str = "SELECT * FROM ref_track_code LIMIT 5";

#[derive(Parser)]
#[command(name = "keiba-db")]
#[command(about = "Query the PC-KEIBA PostgreSQL database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print a sample of the track code table
    Check,
    /// Run a query and print the result
    Query {
        /// SQL text; use :name placeholders for parameters
        sql: String,
        /// Cache the result under this name
        #[arg(long)]
        cache_name: Option<String>,
        /// Ignore an existing cache file and query again
        #[arg(long, default_value_t = false, requires = "cache_name")]
        refresh: bool,
        /// Named parameter as name=value (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn main() {
    // `.env` is read by AppConfig::load
    init_tracing(DEFAULT_LOG_DIRECTIVE);

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("{}", e);
        std::process::exit(exit_codes::for_error(&e));
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let db = Database::new(config)?;

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => {
            db.connect()?.ping()?;
            tracing::info!(database = %db.config().database, "connected");

            let table = db.execute_query(CHECK_QUERY, None)?;
            tracing::info!("{} rows from ref_track_code\n{}", table.num_rows(), table.pretty()?);
        }
        Commands::Query {
            sql,
            cache_name,
            refresh,
            params,
        } => {
            // Text values are converted to the server-inferred type on bind
            let params: QueryParams = params
                .into_iter()
                .map(|(name, value)| (name, ParamValue::Text(value)))
                .collect();

            let table = match cache_name {
                Some(name) => {
                    let (table, status) =
                        db.query_with_cache_status(&sql, &name, Some(&params), refresh)?;
                    tracing::info!(cache = %name, status = %status, rows = table.num_rows(), "Query complete");
                    table
                }
                None => db.execute_query(&sql, Some(&params))?,
            };
            println!("{}", table.pretty()?);
        }
    }

    Ok(())
}

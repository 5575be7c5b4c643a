//! Database access for keiba.
//!
//! [`postgres::PgConnection`] runs SQL with `:name` parameters and returns a
//! [`Table`] of Arrow record batches.
pub mod postgres;
pub mod table;

pub use postgres::{bind_named, pg_config, PgConnection, ParamValue, QueryParams};
pub use table::Table;

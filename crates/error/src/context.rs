//! # Error Contexts
//!
//! Structured metadata attached to errors for programmatic handling.

use serde::{Deserialize, Serialize};

/// Structured context for an error.
///
/// Each variant provides the fields relevant to one failure site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Error reported by the PostgreSQL server
    Database {
        /// Five-character SQLSTATE (e.g. "42P01")
        sqlstate: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        /// 1-based character offset into the query text
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<u32>,
    },

    /// Connection target, never including credentials
    Connection {
        host: String,
        port: String,
        database: String,
    },

    /// Context for KEIBA-2004/2006 (parameter binding)
    Parameter { name: String },

    /// Context for KEIBA-3002 and cache file failures
    Cache {
        cache_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },

    /// Context for KEIBA-2007 (UnsupportedColumnType)
    Column { column: String, pg_type: String },
}

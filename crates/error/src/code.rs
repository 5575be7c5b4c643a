use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following KEIBA-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Connection errors
/// - **2000-2999**: Query errors
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Authentication errors
/// - **5000-5999**: Internal/System errors (cache files, runtime)
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Connection Errors (1000-1999) ===
    /// KEIBA-1001: Could not reach the server or the connection dropped
    ConnectionFailed = 1001,
    /// KEIBA-1002: Network timeout while talking to the server
    ConnectionTimeout = 1002,
    /// KEIBA-1003: Target database does not exist
    DatabaseNotFound = 1003,

    // === Query Errors (2000-2999) ===
    /// KEIBA-2001: SQL syntax error
    SyntaxError = 2001,
    /// KEIBA-2002: Column not found
    ColumnNotFound = 2002,
    /// KEIBA-2003: Table not found
    TableNotFound = 2003,
    /// KEIBA-2004: Parameter value cannot be sent as the server-side type
    ParameterTypeMismatch = 2004,
    /// KEIBA-2005: Integrity constraint violated
    ConstraintViolation = 2005,
    /// KEIBA-2006: Named placeholder without a bound value
    MissingParameter = 2006,
    /// KEIBA-2007: Result column type has no Arrow mapping
    UnsupportedColumnType = 2007,
    /// KEIBA-2008: Any other server-reported query failure
    QueryFailed = 2008,
    /// KEIBA-2009: Query cancelled by the server
    QueryCancelled = 2009,

    // === Configuration Errors (3000-3999) ===
    /// KEIBA-3001: DB_PORT is not a valid port number
    InvalidPort = 3001,
    /// KEIBA-3002: Cache name cannot be mapped to a file below the cache directory
    InvalidCacheName = 3002,

    // === Auth Errors (4000-4999) ===
    /// KEIBA-4001: Authentication failed
    AuthenticationFailed = 4001,

    // === Internal Errors (5000-5999) ===
    /// KEIBA-5001: Cache file I/O failed
    CacheIo = 5001,
    /// KEIBA-5002: Arrow/Parquet serialization failed
    SerializationFailed = 5002,
    /// KEIBA-5003: Unexpected internal state
    InternalPanic = 5003,
    /// KEIBA-5004: Blocking call issued from inside an async runtime
    RuntimeUnavailable = 5004,

    /// KEIBA-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "KEIBA-2003")
    pub fn as_str(&self) -> String {
        format!("KEIBA-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Connection,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Auth,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("KEIBA-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::ConnectionFailed),
            1002 => Ok(Self::ConnectionTimeout),
            1003 => Ok(Self::DatabaseNotFound),
            2001 => Ok(Self::SyntaxError),
            2002 => Ok(Self::ColumnNotFound),
            2003 => Ok(Self::TableNotFound),
            2004 => Ok(Self::ParameterTypeMismatch),
            2005 => Ok(Self::ConstraintViolation),
            2006 => Ok(Self::MissingParameter),
            2007 => Ok(Self::UnsupportedColumnType),
            2008 => Ok(Self::QueryFailed),
            2009 => Ok(Self::QueryCancelled),
            3001 => Ok(Self::InvalidPort),
            3002 => Ok(Self::InvalidCacheName),
            4001 => Ok(Self::AuthenticationFailed),
            5001 => Ok(Self::CacheIo),
            5002 => Ok(Self::SerializationFailed),
            5003 => Ok(Self::InternalPanic),
            5004 => Ok(Self::RuntimeUnavailable),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category, used for process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Connection,
    Query,
    Config,
    Auth,
    Internal,
}

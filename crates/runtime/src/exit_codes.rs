//! Process exit codes for `keiba-db`, so scripts can tell failures apart.

use keiba_error::{ErrorCategory, KeibaError};

/// General error (fallback for unknown errors)
pub const GENERAL_ERROR: i32 = 1;

/// Configuration error (invalid port, invalid cache name)
pub const CONFIG_ERROR: i32 = 3;

/// Connection error (database unreachable, timeout, network failure)
pub const CONNECTION_ERROR: i32 = 4;

/// Query error (bad SQL, missing table, parameter problems)
pub const QUERY_ERROR: i32 = 5;

/// Permission error (authentication failed)
pub const PERMISSION_ERROR: i32 = 7;

pub fn for_error(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<KeibaError>() {
        Some(err) => match err.category() {
            ErrorCategory::Connection => CONNECTION_ERROR,
            ErrorCategory::Config => CONFIG_ERROR,
            ErrorCategory::Query => QUERY_ERROR,
            ErrorCategory::Auth => PERMISSION_ERROR,
            ErrorCategory::Internal => GENERAL_ERROR,
            _ => GENERAL_ERROR, // future categories
        },
        None => GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keiba_error::ErrorCode;

    fn code_for(code: ErrorCode) -> i32 {
        for_error(&anyhow::Error::new(KeibaError::new(code, "boom")))
    }

    #[test]
    fn test_categories_map_to_exit_codes() {
        assert_eq!(code_for(ErrorCode::ConnectionFailed), CONNECTION_ERROR);
        assert_eq!(code_for(ErrorCode::InvalidPort), CONFIG_ERROR);
        assert_eq!(code_for(ErrorCode::TableNotFound), QUERY_ERROR);
        assert_eq!(code_for(ErrorCode::AuthenticationFailed), PERMISSION_ERROR);
        assert_eq!(code_for(ErrorCode::CacheIo), GENERAL_ERROR);
    }

    #[test]
    fn test_foreign_errors_are_general() {
        assert_eq!(for_error(&anyhow::anyhow!("something else")), GENERAL_ERROR);
    }
}

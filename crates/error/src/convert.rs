use crate::{ErrorCode, ErrorContext, KeibaError};
use tokio_postgres::error::{DbError, ErrorPosition, SqlState};

impl From<tokio_postgres::Error> for KeibaError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db) = err.as_db_error() {
            return from_db_error(db);
        }

        if let Some(io) = io_source(&err) {
            let code = if io.kind() == std::io::ErrorKind::TimedOut {
                ErrorCode::ConnectionTimeout
            } else {
                ErrorCode::ConnectionFailed
            };
            return KeibaError::new(code, err.to_string());
        }

        if err.is_closed() {
            return KeibaError::new(ErrorCode::ConnectionFailed, err.to_string());
        }

        KeibaError::new(ErrorCode::QueryFailed, err.to_string())
    }
}

fn from_db_error(db: &DbError) -> KeibaError {
    let state = db.code();
    let code = if *state == SqlState::UNDEFINED_TABLE {
        ErrorCode::TableNotFound
    } else if *state == SqlState::UNDEFINED_COLUMN {
        ErrorCode::ColumnNotFound
    } else if *state == SqlState::SYNTAX_ERROR {
        ErrorCode::SyntaxError
    } else if *state == SqlState::INVALID_PASSWORD
        || *state == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
    {
        ErrorCode::AuthenticationFailed
    } else if *state == SqlState::INVALID_CATALOG_NAME {
        ErrorCode::DatabaseNotFound
    } else if *state == SqlState::QUERY_CANCELED {
        ErrorCode::QueryCancelled
    } else if state.code().starts_with("23") {
        // Class 23: integrity constraint violation
        ErrorCode::ConstraintViolation
    } else {
        ErrorCode::QueryFailed
    };

    let position = db.position().map(|p| match p {
        ErrorPosition::Original(pos) => *pos,
        ErrorPosition::Internal { position, .. } => *position,
    });

    let mut error = KeibaError::new(code, db.message()).with_context(ErrorContext::Database {
        sqlstate: state.code().to_string(),
        detail: db.detail().map(str::to_string),
        position,
    });
    if let Some(hint) = db.hint() {
        error = error.with_hint(hint);
    }
    error
}

fn io_source(err: &tokio_postgres::Error) -> Option<&std::io::Error> {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io);
        }
        source = cause.source();
    }
    None
}

impl From<std::io::Error> for KeibaError {
    fn from(err: std::io::Error) -> Self {
        KeibaError::new(ErrorCode::CacheIo, err.to_string())
    }
}

// A failed read or write underneath the codec is file I/O, not bad data.
impl From<parquet::errors::ParquetError> for KeibaError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        if let parquet::errors::ParquetError::External(inner) = &err {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                return KeibaError::new(ErrorCode::CacheIo, io.to_string());
            }
        }
        KeibaError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<arrow::error::ArrowError> for KeibaError {
    fn from(err: arrow::error::ArrowError) -> Self {
        if let arrow::error::ArrowError::IoError(_, io) = &err {
            return KeibaError::new(ErrorCode::CacheIo, io.to_string());
        }
        KeibaError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl From<serde_json::Error> for KeibaError {
    fn from(err: serde_json::Error) -> Self {
        KeibaError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_cache_io() {
        let err: KeibaError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.code, ErrorCode::CacheIo);
        assert_eq!(err.message, "denied");
    }

    #[test]
    fn test_parquet_error_maps_to_serialization() {
        let err: KeibaError =
            parquet::errors::ParquetError::General("bad magic".to_string()).into();
        assert_eq!(err.code, ErrorCode::SerializationFailed);
        assert!(err.message.contains("bad magic"));
    }

    #[test]
    fn test_parquet_io_failure_maps_to_cache_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "Is a directory");
        let err: KeibaError = parquet::errors::ParquetError::External(Box::new(io)).into();
        assert_eq!(err.code, ErrorCode::CacheIo);
        assert_eq!(err.message, "Is a directory");
    }

    #[test]
    fn test_arrow_error_maps_to_serialization() {
        let err: KeibaError =
            arrow::error::ArrowError::SchemaError("mismatch".to_string()).into();
        assert_eq!(err.code, ErrorCode::SerializationFailed);
    }
}

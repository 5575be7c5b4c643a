use keiba_error::{ErrorCategory, ErrorCode, ErrorContext, KeibaError};
use serde_json::Value;

#[test]
fn test_json_serialization() {
    let error = KeibaError::new(ErrorCode::TableNotFound, "relation \"ref_trak_code\" does not exist")
        .with_context(ErrorContext::Database {
            sqlstate: "42P01".to_string(),
            detail: None,
            position: Some(15),
        })
        .with_hint("Did you mean ref_track_code?");

    let json = error.to_json();
    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "KEIBA-2003");
    assert_eq!(v["message"], "relation \"ref_trak_code\" does not exist");
    assert_eq!(v["hint"], "Did you mean ref_track_code?");
    assert_eq!(v["context"]["type"], "database");
    assert_eq!(v["context"]["sqlstate"], "42P01");
    assert_eq!(v["context"]["position"], 15);
}

#[test]
fn test_json_roundtrip() {
    let error = KeibaError::new(ErrorCode::InvalidCacheName, "cache name must be relative")
        .with_context(ErrorContext::Cache {
            cache_name: "/etc/passwd".to_string(),
            path: None,
        });

    let json = error.to_json();
    let back: KeibaError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, error);
    assert_eq!(back.category(), ErrorCategory::Config);
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "KEIBA-4001".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::AuthenticationFailed);
}

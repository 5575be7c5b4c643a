//! # keiba-error
//!
//! Unified error types for the keiba data-access crates.
//!
//! Every failure carries:
//! - A numeric error code (KEIBA-XXXX) with a stable category
//! - Optional structured context (SQLSTATE, cache name, ...)
//! - An optional hint, taken from the server when it provides one

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all keiba operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeibaError {
    /// Numeric error code (e.g., "KEIBA-2003")
    pub code: ErrorCode,

    /// Human-readable error message. For server errors this is the
    /// server's message text, unchanged.
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for fixing the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl KeibaError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Serialize to JSON for machine-readable output
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize KeibaError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for KeibaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for KeibaError {}

/// Result type alias for keiba operations
pub type Result<T> = std::result::Result<T, KeibaError>;

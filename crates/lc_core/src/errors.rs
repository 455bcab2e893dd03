//! Error types for the loan feature pipeline

use thiserror::Error;

/// Errors that can occur while loading, normalizing or evaluating loan records
#[derive(Error, Debug)]
pub enum LcError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A field required by normalization is absent or unparseable
    #[error("schema violation in record {record}: field `{field}` {reason}")]
    SchemaViolation {
        record: String,
        field: String,
        reason: String,
    },

    /// Training and evaluation vectors do not share a schema
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid sampling or model parameters
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Configuration could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl LcError {
    pub(crate) fn violation(
        record: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            record: record.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error concerns a single record rather than the whole run
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, LcError>;

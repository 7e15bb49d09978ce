//! Error type shared by the pipeline builder, the sort builder and the
//! result formatter.
//!
//! Driver, IO, CSV and JSON failures convert automatically via `From`, so
//! `?` works across all of them.

use std::io;

use mongodb::bson::Bson;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An argument had the wrong BSON shape (usually: not a document).
    #[error("type mismatch for {context}: got {found} ({value})")]
    TypeMismatch {
        context: String,
        found: String,
        value: String,
    },

    /// A sort direction other than ascending (1) or descending (-1).
    #[error("invalid sort direction {0}: must be 1 (ascending) or -1 (descending)")]
    InvalidSortDirection(String),

    /// A stage was appended after `$out`.
    #[error("cannot add more pipeline stages after $out: stage '{stage}'")]
    PipelineTerminated { stage: String },

    /// A second `$out` was requested.
    #[error("pipeline already ends with $out: {existing}")]
    DuplicateTerminalStage { existing: String },

    #[error("unknown pipeline stage operator '{0}'")]
    UnknownStage(String),

    /// A value with no shell-text representation.
    #[error("value of type {0} is not serializable as shell text")]
    Unserializable(String),

    #[error("date field '{field}' holds {found}, expected a date or epoch milliseconds")]
    InvalidDateField { field: String, found: String },

    #[error("invalid time format '{0}'")]
    InvalidTimeFormat(String),

    /// A projected record carried a field the CSV header does not name.
    #[error("record field '{0}' is not in the CSV header")]
    UnexpectedField(String),

    #[error("result stream has already been consumed")]
    StreamConsumed,

    #[error("driver error: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn type_mismatch(context: impl Into<String>, value: &Bson) -> Self {
        Error::TypeMismatch {
            context: context.into(),
            found: bson_type_name(value),
            value: value.to_string(),
        }
    }
}

/// Short name of a BSON value's type, used in error messages.
pub(crate) fn bson_type_name(value: &Bson) -> String {
    format!("{:?}", value.element_type())
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_context_and_type() {
        let err = Error::type_mismatch("$match predicate", &Bson::Int32(7));
        let msg = err.to_string();
        assert!(msg.contains("$match predicate"));
        assert!(msg.contains("Int32"));
    }

    #[test]
    fn test_terminated_names_stage() {
        let err = Error::PipelineTerminated {
            stage: "$limit: 5".into(),
        };
        assert!(err.to_string().contains("$limit: 5"));
    }
}

//! Error types for tyrecon-core.

use thiserror::Error;

/// Core error type.
///
/// Ingestion errors are never retried: the offending record is reported by
/// its trace position together with the field that was missing or invalid.
#[derive(Error, Debug)]
pub enum Error {
    /// A record lacks a field its kind requires.
    #[error("operation #{position}: missing field `{field}`")]
    MissingField {
        position: usize,
        field: &'static str,
    },

    /// A record carries a field with an unusable value.
    #[error("operation #{position}: invalid field `{field}`: {reason}")]
    InvalidField {
        position: usize,
        field: &'static str,
        reason: String,
    },

    /// An operand refers to a result that does not exist at that point.
    #[error("operation #{position}: unknown operand, operation #{target} has no result in scope")]
    UnknownOperand { position: usize, target: usize },

    /// Two segments of the memory map share addresses.
    #[error("segments `{first}` and `{second}` overlap")]
    OverlappingSegments { first: String, second: String },

    /// A segment with no addresses.
    #[error("segment `{0}` is empty")]
    EmptySegment(String),

    /// Malformed JSON input.
    #[error("malformed trace: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for tyrecon-core.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for tyrecon-analysis.

use thiserror::Error;
use tyrecon_core::{ClassId, TypeVarId};

/// Fatal analysis errors.
///
/// Conflicting evidence is never an error; it is resolved to a union and
/// reported as an [`Annotation`](crate::Annotation).
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The trace could not be ingested.
    #[error(transparent)]
    Trace(#[from] tyrecon_core::Error),

    /// A union touched a class whose type is already final.
    #[error("cannot merge {a} and {b}: class is finalized")]
    FinalizedMerge { a: ClassId, b: ClassId },

    /// A constraint was attached to a finalized class.
    #[error("class {0} is finalized")]
    FinalizedClass(ClassId),

    /// A variable identifier that the store never handed out.
    #[error("unknown type variable {0}")]
    UnknownVariable(TypeVarId),

    /// A class identifier that the arena never handed out.
    #[error("unknown equivalence class {0}")]
    UnknownClass(ClassId),

    /// A fixed address whose segment offset does not fit a signed offset.
    #[error("address {address:#x} at position {position} is out of range")]
    AddressOutOfRange { position: usize, address: u64 },

    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias for tyrecon-analysis.
pub type Result<T> = std::result::Result<T, AnalysisError>;

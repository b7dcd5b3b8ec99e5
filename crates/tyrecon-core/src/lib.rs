//! # tyrecon-core
//!
//! Core abstractions for the tyrecon type reconstruction engine. This crate
//! defines the operation trace consumed by the engine, the identifiers it
//! hands out, and the process-wide memory map shared by every function
//! analysis.

pub mod error;
pub mod ids;
pub mod memory_map;
pub mod trace;

pub use error::{Error, Result};
pub use ids::{ClassId, TypeVarId};
pub use memory_map::{Location, MemoryMap, Segment, GLOBALS_SEGMENT};
pub use trace::{
    ArithOp, BitwiseOp, CompareOp, OpKind, Operand, Operation, RecordKind, Trace, TraceBuilder,
    TraceRecord,
};

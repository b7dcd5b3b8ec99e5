//! # tyrecon-analysis
//!
//! Type reconstruction over operation traces.
//!
//! Given the trace of one function, the analysis:
//! 1. gives every storage use a type variable ([`store`])
//! 2. collects constraints from how values are used ([`collector`])
//! 3. merges variables that must share a representation ([`equivalence`])
//! 4. resolves every equivalence class to a [`DataType`] ([`resolver`]),
//!    synthesizing aggregates ([`aggregate`]) and signatures ([`signature`])
//! 5. emits a deterministic [`Listing`]
//!
//! [`program::analyze_program`] runs many functions in parallel against a
//! shared [`MemoryMap`] and merges what they learn about global memory.
//!
//! # Example
//!
//! ```
//! use tyrecon_analysis::{AnalysisConfig, FunctionAnalysis};
//! use tyrecon_core::{MemoryMap, Operand, TraceBuilder};
//!
//! let mut b = TraceBuilder::new();
//! let v = b.load(Operand::storage("R0"), 0, 1);
//! b.compare_ne(v, Operand::literal(0, 1));
//! let trace = b.build().unwrap();
//!
//! let map = MemoryMap::new();
//! let listing = FunctionAnalysis::new("f", &map, AnalysisConfig::default())
//!     .run(&trace)
//!     .unwrap();
//! println!("{}", listing);
//! ```
//!
//! [`DataType`]: tyrecon_types::DataType
//! [`MemoryMap`]: tyrecon_core::MemoryMap

pub mod aggregate;
pub mod annotation;
pub mod collector;
pub mod config;
pub mod constraint;
pub mod equivalence;
pub mod error;
pub mod listing;
pub mod pipeline;
pub mod program;
pub mod resolver;
pub mod signature;
pub mod store;

pub use annotation::Annotation;
pub use config::AnalysisConfig;
pub use constraint::{CallSiteConstraint, Constraint, ConstraintKind, FieldConstraint};
pub use equivalence::{ClassState, EquivalenceClass, TypeArena};
pub use error::{AnalysisError, Result};
pub use listing::{ClassEntry, Declaration, Listing, VariableEntry};
pub use pipeline::FunctionAnalysis;
pub use program::{analyze_program, FunctionFailure, FunctionTrace, GlobalEntry, ProgramReport};
pub use store::{TypeVariable, UseSite};

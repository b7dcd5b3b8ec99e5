//! # tyrecon-types
//!
//! High-level types recovered by the tyrecon engine.
//!
//! This crate provides:
//! - [`DataType`], the closed set of types a class can resolve to
//! - the lattice join used when evidence or call sites are merged
//! - [`TypeShape`], a class-free summary used to compare facts across
//!   functions
//!
//! # Example
//!
//! ```
//! use tyrecon_types::DataType;
//!
//! let byte = DataType::byte();
//! let word = DataType::integer(2);
//! assert_eq!(byte.join(&word), word);
//! assert_eq!(DataType::array(byte, Some(3)).to_string(), "byte[3]");
//! ```

pub mod shape;
pub mod types;

pub use shape::TypeShape;
pub use types::*;

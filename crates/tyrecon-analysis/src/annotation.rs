//! Diagnostics attached to resolved classes.
//!
//! Annotations record recoverable conflicts and ambiguities. They never stop
//! an analysis; downstream consumers use them to decide how much to trust a
//! type.

use serde::{Deserialize, Serialize};
use std::fmt;
use tyrecon_core::{ClassId, TypeVarId};

/// A diagnostic about one class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    /// Scalar and pointer evidence met in one class; resolved to a union.
    KindConflict {
        class: ClassId,
        scalar_at: usize,
        pointer_at: usize,
    },
    /// Several types were accessed at one offset.
    FieldUnion {
        class: ClassId,
        offset: i64,
        alternatives: usize,
    },
    /// Two field ranges intersect without starting at the same offset.
    OverlappingFields {
        class: ClassId,
        first: i64,
        second: i64,
    },
    /// A field would contain its own aggregate by value.
    RecursiveLayout { class: ClassId, offset: i64 },
    /// Call sites disagree on the number of arguments.
    DivergentArity { class: ClassId, arities: Vec<usize> },
    /// Call sites pass conflicting types for one parameter.
    ParamConflict { class: ClassId, index: usize },
    /// A class is both called and accessed as data.
    MixedCodeData { class: ClassId },
    /// A synthesized variable whose class received no evidence.
    Unassigned { variable: TypeVarId, class: ClassId },
    /// A pointer advanced by more than one byte at a time.
    StridedPointer { class: ClassId, step: i64 },
}

impl Annotation {
    /// Class the annotation is about.
    pub fn class(&self) -> ClassId {
        match self {
            Annotation::KindConflict { class, .. }
            | Annotation::FieldUnion { class, .. }
            | Annotation::OverlappingFields { class, .. }
            | Annotation::RecursiveLayout { class, .. }
            | Annotation::DivergentArity { class, .. }
            | Annotation::ParamConflict { class, .. }
            | Annotation::MixedCodeData { class }
            | Annotation::Unassigned { class, .. }
            | Annotation::StridedPointer { class, .. } => *class,
        }
    }

    /// Sorts annotations by class, then kind.
    pub fn sort(annotations: &mut [Annotation]) {
        annotations.sort_by(|a, b| a.class().cmp(&b.class()).then_with(|| a.cmp(b)));
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::KindConflict {
                class,
                scalar_at,
                pointer_at,
            } => write!(
                f,
                "{}: scalar use at #{} conflicts with pointer use at #{}",
                class, scalar_at, pointer_at
            ),
            Annotation::FieldUnion {
                class,
                offset,
                alternatives,
            } => write!(
                f,
                "{}: {} alternatives at offset {:#x}",
                class, alternatives, offset
            ),
            Annotation::OverlappingFields {
                class,
                first,
                second,
            } => write!(
                f,
                "{}: fields at {:#x} and {:#x} overlap",
                class, first, second
            ),
            Annotation::RecursiveLayout { class, offset } => {
                write!(f, "{}: recursive field at {:#x} flattened", class, offset)
            }
            Annotation::DivergentArity { class, arities } => {
                write!(f, "{}: call sites pass {:?} arguments", class, arities)
            }
            Annotation::ParamConflict { class, index } => {
                write!(f, "{}: conflicting types for parameter {}", class, index)
            }
            Annotation::MixedCodeData { class } => {
                write!(f, "{}: called and accessed as data", class)
            }
            Annotation::Unassigned { variable, class } => {
                write!(f, "{}: {} has no evidence", class, variable)
            }
            Annotation::StridedPointer { class, step } => {
                write!(f, "{}: pointer advanced by {}", class, step)
            }
        }
    }
}

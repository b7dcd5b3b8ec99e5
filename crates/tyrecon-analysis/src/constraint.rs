//! Constraints: evidence about a value's representation.
//!
//! Constraints are attached to the class of their subject variable and move
//! with it when classes merge. Each carries the trace position that produced
//! it and a global emission sequence number, which orders constraints within
//! a class independently of how the class was assembled.

use serde::{Deserialize, Serialize};
use tyrecon_core::TypeVarId;

/// A value accessed at a fixed offset of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldConstraint {
    /// Byte offset from the aggregate's start.
    pub offset: i64,
    /// Access width in bytes.
    pub width: u8,
    /// Variable of the value read or written.
    pub value: TypeVarId,
}

/// One call through a code class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSiteConstraint {
    /// Argument variables, in order.
    pub args: Vec<TypeVarId>,
    /// Result variable, absent when the caller discards the result.
    pub ret: Option<TypeVarId>,
}

/// What a constraint says.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Accessed or produced with this width.
    Size { width: u8 },
    /// Holds a non-zero literal.
    Constant { width: u8 },
    /// Used in a bitwise operation.
    Bitwise { width: u8 },
    /// Compared against a literal.
    Discriminant { width: u8 },
    /// Used in an ordered comparison.
    Ordered { signed: bool },
    /// Result of a comparison.
    Boolean,
    /// Dereferenced or called; `target` is the pointee.
    PointsTo { target: TypeVarId },
    /// Advanced by pointer arithmetic.
    Step { size: i64 },
    /// Used as an array index.
    Counter,
    /// Accessed at a fixed offset through a pointer.
    Field(FieldConstraint),
    /// Accessed at a variable index through a pointer.
    Element {
        offset: i64,
        stride: u32,
        width: u8,
        value: TypeVarId,
    },
    /// Known total size (segment bounds).
    Extent { size: u64 },
    /// Called.
    CallSite(CallSiteConstraint),
}

impl ConstraintKind {
    /// Returns the width this constraint implies for a scalar, if any.
    pub fn scalar_width(&self) -> Option<u8> {
        match self {
            ConstraintKind::Size { width }
            | ConstraintKind::Constant { width }
            | ConstraintKind::Bitwise { width }
            | ConstraintKind::Discriminant { width } => Some(*width),
            _ => None,
        }
    }

    /// Returns true for evidence that rules out a pointer.
    pub fn is_strong_scalar(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Constant { .. } | ConstraintKind::Bitwise { .. }
        )
    }

    /// Returns true for field or element evidence.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Field(_) | ConstraintKind::Element { .. }
        )
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::Size { .. } => "size",
            ConstraintKind::Constant { .. } => "constant",
            ConstraintKind::Bitwise { .. } => "bitwise",
            ConstraintKind::Discriminant { .. } => "discriminant",
            ConstraintKind::Ordered { .. } => "ordered",
            ConstraintKind::Boolean => "boolean",
            ConstraintKind::PointsTo { .. } => "points-to",
            ConstraintKind::Step { .. } => "step",
            ConstraintKind::Counter => "counter",
            ConstraintKind::Field(_) => "field",
            ConstraintKind::Element { .. } => "element",
            ConstraintKind::Extent { .. } => "extent",
            ConstraintKind::CallSite(_) => "call-site",
        }
    }
}

/// A timestamped piece of evidence about one variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// Trace position that produced the constraint.
    pub position: usize,
    /// Emission order across the whole analysis.
    pub seq: u64,
    /// Variable the evidence is about.
    pub subject: TypeVarId,
    pub kind: ConstraintKind,
}

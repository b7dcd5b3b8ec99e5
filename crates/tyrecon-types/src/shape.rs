//! Class-free type summaries.
//!
//! Class identifiers are local to one function analysis, so types that refer
//! to classes cannot be compared across functions. A [`TypeShape`] erases
//! the class references and keeps only what two analyses can agree on.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{DataType, Signedness};

/// Summary of a [`DataType`] without class references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeShape {
    Unknown,
    Boolean,
    Integer { width: u8, sign: Signedness },
    Pointer,
    Code,
    Array {
        element: Box<TypeShape>,
        length: Option<u64>,
    },
    Aggregate { size: u64 },
    Union(Vec<TypeShape>),
}

impl TypeShape {
    /// Erases class references from a type.
    pub fn of(ty: &DataType) -> Self {
        match ty {
            DataType::Void => TypeShape::Unknown,
            DataType::Boolean => TypeShape::Boolean,
            DataType::Integer { width, sign } => TypeShape::Integer {
                width: *width,
                sign: *sign,
            },
            DataType::Pointer(_) => TypeShape::Pointer,
            DataType::Function(_) => TypeShape::Code,
            DataType::Array { element, length } => TypeShape::Array {
                element: Box::new(TypeShape::of(element)),
                length: *length,
            },
            DataType::Struct(s) => TypeShape::Aggregate { size: s.size },
            DataType::Union(u) => {
                TypeShape::Union(u.alternatives.iter().map(TypeShape::of).collect())
            }
        }
    }

    fn join_compatible(&self, other: &TypeShape) -> Option<TypeShape> {
        match (self, other) {
            (TypeShape::Unknown, s) | (s, TypeShape::Unknown) => Some(s.clone()),
            (a, b) if a == b => Some(a.clone()),
            (
                TypeShape::Integer { width: w1, sign: s1 },
                TypeShape::Integer { width: w2, sign: s2 },
            ) => Some(TypeShape::Integer {
                width: (*w1).max(*w2),
                sign: s1.merge(*s2),
            }),
            (TypeShape::Boolean, i @ TypeShape::Integer { .. })
            | (i @ TypeShape::Integer { .. }, TypeShape::Boolean) => Some(i.clone()),
            (
                TypeShape::Array {
                    element: e1,
                    length: l1,
                },
                TypeShape::Array {
                    element: e2,
                    length: l2,
                },
            ) => Some(TypeShape::Array {
                element: Box::new(e1.join_compatible(e2)?),
                length: if l1 == l2 { *l1 } else { None },
            }),
            (TypeShape::Aggregate { size: a }, TypeShape::Aggregate { size: b }) => {
                Some(TypeShape::Aggregate { size: (*a).max(*b) })
            }
            _ => None,
        }
    }

    /// Least upper bound, with the same precedence as [`DataType::join`].
    pub fn join(&self, other: &TypeShape) -> TypeShape {
        let mut acc: Vec<TypeShape> = Vec::new();
        for shape in [self, other] {
            push_alternative(&mut acc, shape.clone());
        }
        match acc.len() {
            0 => TypeShape::Unknown,
            1 => acc.pop().unwrap_or(TypeShape::Unknown),
            _ => TypeShape::Union(acc),
        }
    }

    /// Returns true for unions.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TypeShape::Union(_))
    }
}

fn push_alternative(acc: &mut Vec<TypeShape>, shape: TypeShape) {
    match shape {
        TypeShape::Union(alts) => {
            for alt in alts {
                push_alternative(acc, alt);
            }
        }
        TypeShape::Unknown => {}
        shape => {
            for existing in acc.iter_mut() {
                if let Some(joined) = existing.join_compatible(&shape) {
                    *existing = joined;
                    return;
                }
            }
            acc.push(shape);
        }
    }
}

impl fmt::Display for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeShape::Unknown => write!(f, "?"),
            TypeShape::Boolean => write!(f, "bool"),
            TypeShape::Integer { width, sign } => {
                write!(f, "{}", DataType::Integer {
                    width: *width,
                    sign: *sign
                })
            }
            TypeShape::Pointer => write!(f, "ptr"),
            TypeShape::Code => write!(f, "code"),
            TypeShape::Array { element, length } => match length {
                Some(n) => write!(f, "{}[{}]", element, n),
                None => write!(f, "{}[]", element),
            },
            TypeShape::Aggregate { size } => write!(f, "struct({})", size),
            TypeShape::Union(alts) => {
                write!(f, "union {{ ")?;
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", alt)?;
                }
                write!(f, " }}")
            }
        }
    }
}

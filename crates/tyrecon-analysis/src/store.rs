//! Type variable store.
//!
//! One variable per observed use, numbered densely in first-use order.
//! Identifiers are never reused within an analysis.

use serde::{Deserialize, Serialize};
use std::fmt;
use tyrecon_core::TypeVarId;
use tyrecon_types::DataType;

/// Where a type variable comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseSite {
    /// Named storage; one variable per distinct name.
    Storage { name: String },
    /// A literal occurrence.
    Literal { position: usize, value: i64 },
    /// The value produced by an operation.
    Expression { position: usize, text: String },
    /// A fixed address used as a value.
    Address { address: u64 },
    /// Base pointer of a memory segment.
    Segment { name: String },
    /// Storage a pointer variable points into.
    Pointee { of: TypeVarId },
}

impl fmt::Display for UseSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseSite::Storage { name } => write!(f, "{}", name),
            UseSite::Literal { value, .. } => {
                if *value < 0 {
                    write!(f, "-{:#x}", value.unsigned_abs())
                } else {
                    write!(f, "{:#x}", value)
                }
            }
            UseSite::Expression { text, .. } => write!(f, "{}", text),
            UseSite::Address { address } => write!(f, "@{:#x}", address),
            UseSite::Segment { name } => write!(f, "segment {}", name),
            UseSite::Pointee { of } => write!(f, "*{}", of),
        }
    }
}

/// A type variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeVariable {
    pub id: TypeVarId,
    pub site: UseSite,
    /// Type implied by the first direct evidence, kept after widening.
    pub original: Option<DataType>,
}

/// Dense storage of type variables.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    variables: Vec<TypeVariable>,
}

impl VariableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next variable.
    pub fn push(&mut self, site: UseSite) -> TypeVarId {
        let id = TypeVarId::new(self.variables.len() as u32);
        self.variables.push(TypeVariable {
            id,
            site,
            original: None,
        });
        id
    }

    /// Returns a variable.
    pub fn get(&self, id: TypeVarId) -> Option<&TypeVariable> {
        self.variables.get(id.index())
    }

    /// Records the original type unless one is already set.
    pub fn set_original(&mut self, id: TypeVarId, ty: DataType) {
        if let Some(var) = self.variables.get_mut(id.index()) {
            var.original.get_or_insert(ty);
        }
    }

    /// Returns all variables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeVariable> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Drops every variable.
    pub fn clear(&mut self) {
        self.variables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense() {
        let mut store = VariableStore::new();
        let a = store.push(UseSite::Storage { name: "R0".into() });
        let b = store.push(UseSite::Address { address: 0x20 });
        assert_eq!(a, TypeVarId::new(0));
        assert_eq!(b, TypeVarId::new(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(b).unwrap().site.to_string(), "@0x20");
    }

    #[test]
    fn test_original_is_first_evidence() {
        let mut store = VariableStore::new();
        let v = store.push(UseSite::Storage { name: "A".into() });
        store.set_original(v, DataType::byte());
        store.set_original(v, DataType::integer(2));
        assert_eq!(store.get(v).unwrap().original, Some(DataType::byte()));
    }

    #[test]
    fn test_site_display() {
        assert_eq!(
            UseSite::Pointee {
                of: TypeVarId::new(3)
            }
            .to_string(),
            "*T_3"
        );
        assert_eq!(
            UseSite::Literal {
                position: 0,
                value: -1
            }
            .to_string(),
            "-0x1"
        );
    }
}

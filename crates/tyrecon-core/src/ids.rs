//! Dense identifiers for type variables and equivalence classes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a type variable.
///
/// Allocated in first-use order of the trace, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeVarId(pub u32);

impl TypeVarId {
    /// Creates a new type variable ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the dense index of this variable.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T_{}", self.0)
    }
}

/// Identifier of an equivalence class.
///
/// Every type variable is created together with a singleton class carrying
/// the same number, so `T_n` starts out in `Eq_n`. Identifiers are never
/// reused after a class is absorbed by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Creates a new class ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the dense index of this class.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Eq_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(TypeVarId::new(3).to_string(), "T_3");
        assert_eq!(ClassId::new(12).to_string(), "Eq_12");
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&(TypeVarId(4), ClassId(7))).unwrap();
        assert_eq!(json, "[4,7]");
    }
}

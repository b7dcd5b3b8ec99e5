//! Analysis output.
//!
//! A [`Listing`] is the complete, deterministic result of one function
//! analysis: every class with its type and members, every variable with its
//! use site and original type, the declarations worth emitting and the
//! annotations. It serializes to JSON and renders as a plain-text dump; both
//! are byte-identical for identical input.

use serde::{Deserialize, Serialize};
use std::fmt;
use tyrecon_core::{ClassId, TypeVarId};
use tyrecon_types::DataType;

use crate::annotation::Annotation;
use crate::equivalence::{ClassState, TypeArena};
use crate::error::Result;
use crate::store::UseSite;

/// One equivalence class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub id: ClassId,
    pub state: ClassState,
    pub data_type: DataType,
    pub members: Vec<TypeVarId>,
}

/// One type variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    pub id: TypeVarId,
    pub site: UseSite,
    pub class: ClassId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<DataType>,
}

/// A class whose type deserves a declaration of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub class: ClassId,
    pub data_type: DataType,
}

/// Result of analyzing one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub function: String,
    pub classes: Vec<ClassEntry>,
    pub variables: Vec<VariableEntry>,
    pub declarations: Vec<Declaration>,
    pub annotations: Vec<Annotation>,
}

impl Listing {
    /// Finalizes every live class of the arena and captures the result.
    pub fn emit(function: &str, arena: &mut TypeArena, mut annotations: Vec<Annotation>) -> Self {
        arena.finalize_all();
        let arena = &*arena;
        // Types recorded before later merges may name absorbed classes.
        let live = |class: ClassId| arena.representative(class).unwrap_or(class);

        let classes: Vec<ClassEntry> = arena
            .live_classes()
            .map(|c| ClassEntry {
                id: c.id(),
                state: c.state(),
                data_type: c
                    .data_type()
                    .map_or(DataType::Void, |ty| ty.map_classes(&live)),
                members: c.members().to_vec(),
            })
            .collect();

        let variables = arena
            .variables()
            .map(|v| VariableEntry {
                id: v.id,
                site: v.site.clone(),
                class: arena.class_of(v.id),
                original: v.original.as_ref().map(|ty| ty.map_classes(&live)),
            })
            .collect();

        let declarations = classes
            .iter()
            .filter(|c| {
                matches!(
                    c.data_type,
                    DataType::Struct(_)
                        | DataType::Union(_)
                        | DataType::Pointer(_)
                        | DataType::Array { .. }
                        | DataType::Function(_)
                )
            })
            .map(|c| Declaration {
                class: c.id,
                data_type: c.data_type.clone(),
            })
            .collect();

        Annotation::sort(&mut annotations);
        annotations.dedup();

        Self {
            function: function.to_string(),
            classes,
            variables,
            declarations,
            annotations,
        }
    }

    /// Returns a class by id.
    pub fn class(&self, id: ClassId) -> Option<&ClassEntry> {
        self.classes
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|idx| &self.classes[idx])
    }

    /// Returns a variable by id.
    pub fn variable(&self, id: TypeVarId) -> Option<&VariableEntry> {
        self.variables.get(id.index())
    }

    /// Returns the class holding a variable.
    pub fn class_of(&self, var: TypeVarId) -> Option<ClassId> {
        self.variable(var).map(|v| v.class)
    }

    /// Returns the resolved type of a variable.
    pub fn type_of(&self, var: TypeVarId) -> Option<&DataType> {
        self.class(self.class_of(var)?).map(|c| &c.data_type)
    }

    /// Returns the variable of a named storage location.
    pub fn storage(&self, name: &str) -> Option<TypeVarId> {
        self.variables
            .iter()
            .find(|v| matches!(&v.site, UseSite::Storage { name: n } if n == name))
            .map(|v| v.id)
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a listing from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// {}", self.function)?;

        writeln!(f, "// Equivalence classes")?;
        for class in &self.classes {
            writeln!(f, "{}: {}", class.id, class.data_type)?;
            for member in &class.members {
                if let Some(var) = self.variable(*member) {
                    writeln!(f, "\t{} (in {})", var.id, var.site)?;
                }
            }
        }

        writeln!(f, "// Type Variables")?;
        for var in &self.variables {
            match &var.original {
                Some(original) => writeln!(f, "{}: (in {} : {})", var.id, var.site, original)?,
                None => writeln!(f, "{}: (in {})", var.id, var.site)?,
            }
            writeln!(f, "  Class: {}", var.class)?;
            if let Some(class) = self.class(var.class) {
                writeln!(f, "  DataType: {}", class.data_type)?;
            }
            if let Some(original) = &var.original {
                writeln!(f, "  OrigDataType: {}", original)?;
            }
        }

        if !self.declarations.is_empty() {
            writeln!(f, "// Declarations")?;
            for decl in &self.declarations {
                writeln!(f, "{} := {}", decl.class, decl.data_type)?;
            }
        }

        if !self.annotations.is_empty() {
            writeln!(f, "// Annotations")?;
            for note in &self.annotations {
                writeln!(f, "{}", note)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintKind;

    fn small_listing() -> Listing {
        let mut arena = TypeArena::new();
        let r = arena.new_variable(UseSite::Storage { name: "R0".into() });
        let t = arena.new_variable(UseSite::Pointee { of: r });
        arena
            .add_constraint(r, 0, ConstraintKind::PointsTo { target: t })
            .unwrap();
        arena.set_type(arena.class_of(r), DataType::Pointer(ClassId::new(1))).unwrap();
        arena.set_type(arena.class_of(t), DataType::Void).unwrap();
        Listing::emit("f", &mut arena, Vec::new())
    }

    #[test]
    fn test_emit_finalizes() {
        let listing = small_listing();
        assert!(listing
            .classes
            .iter()
            .all(|c| c.state == ClassState::Finalized));
        assert_eq!(listing.declarations.len(), 1);
        assert_eq!(listing.declarations[0].class, ClassId::new(0));
        assert_eq!(listing.storage("R0"), Some(TypeVarId::new(0)));
        assert_eq!(
            listing.type_of(TypeVarId::new(0)),
            Some(&DataType::Pointer(ClassId::new(1)))
        );
    }

    #[test]
    fn test_text_dump() {
        let text = small_listing().to_string();
        let expected = "\
// f
// Equivalence classes
Eq_0: Eq_1*
\tT_0 (in R0)
Eq_1: void
\tT_1 (in *T_0)
// Type Variables
T_0: (in R0 : Eq_1*)
  Class: Eq_0
  DataType: Eq_1*
  OrigDataType: Eq_1*
T_1: (in *T_0)
  Class: Eq_1
  DataType: void
// Declarations
Eq_0 := Eq_1*
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_json_round_trip() {
        let listing = small_listing();
        let json = listing.to_json().unwrap();
        assert_eq!(Listing::from_json(&json).unwrap(), listing);
    }
}

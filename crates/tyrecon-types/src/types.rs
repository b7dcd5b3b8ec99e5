//! Reconstructed type representation.
//!
//! Pointers refer to equivalence classes rather than embedding their target,
//! so recursive structures need no boxing cycles and a pointer type stays
//! valid while its target class is still being resolved.

use serde::{Deserialize, Serialize};
use std::fmt;
use tyrecon_core::ClassId;

/// Signedness of an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signedness {
    /// No evidence either way.
    #[default]
    Unknown,
    Signed,
    Unsigned,
}

impl Signedness {
    /// Combines two signedness facts. Known beats unknown; a disagreement
    /// yields unknown.
    pub fn merge(self, other: Signedness) -> Signedness {
        match (self, other) {
            (Signedness::Unknown, s) | (s, Signedness::Unknown) => s,
            (a, b) if a == b => a,
            _ => Signedness::Unknown,
        }
    }
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// No evidence, or a function returning nothing.
    Void,

    /// Result of a comparison.
    Boolean,

    /// Integer of `width` bytes.
    Integer {
        width: u8,
        #[serde(default)]
        sign: Signedness,
    },

    /// Pointer into another equivalence class.
    Pointer(ClassId),

    /// Array of elements, with unknown length when `length` is `None`.
    Array {
        element: Box<DataType>,
        length: Option<u64>,
    },

    /// Structure with fields at fixed offsets.
    Struct(StructType),

    /// Overlapping alternatives.
    Union(UnionType),

    /// Code.
    Function(FunctionType),
}

impl DataType {
    /// Creates an integer of unknown signedness.
    pub fn integer(width: u8) -> Self {
        Self::Integer {
            width,
            sign: Signedness::Unknown,
        }
    }

    /// Creates a signed integer.
    pub fn signed(width: u8) -> Self {
        Self::Integer {
            width,
            sign: Signedness::Signed,
        }
    }

    /// Creates an unsigned integer.
    pub fn unsigned(width: u8) -> Self {
        Self::Integer {
            width,
            sign: Signedness::Unsigned,
        }
    }

    /// A one-byte integer of unknown signedness.
    pub fn byte() -> Self {
        Self::integer(1)
    }

    /// Creates a pointer to a class.
    pub fn pointer(target: ClassId) -> Self {
        Self::Pointer(target)
    }

    /// Creates an array type.
    pub fn array(element: DataType, length: Option<u64>) -> Self {
        Self::Array {
            element: Box::new(element),
            length,
        }
    }

    /// Creates a union from alternatives.
    ///
    /// Nested unions are flattened, compatible alternatives are joined and
    /// the first-seen order is kept. A single surviving alternative is
    /// returned as is; no alternatives at all give `Void`.
    pub fn union(alternatives: impl IntoIterator<Item = DataType>) -> Self {
        let mut acc: Vec<DataType> = Vec::new();
        for alt in alternatives {
            push_alternative(&mut acc, alt);
        }
        match acc.len() {
            0 => DataType::Void,
            1 => acc.pop().unwrap_or(DataType::Void),
            _ => DataType::Union(UnionType { alternatives: acc }),
        }
    }

    /// Returns the size in bytes, if known.
    ///
    /// Functions, unbounded arrays and arrays whose size overflows have
    /// no size.
    pub fn size(&self, pointer_width: u8) -> Option<u64> {
        match self {
            DataType::Void | DataType::Function(_) => None,
            DataType::Boolean => Some(1),
            DataType::Integer { width, .. } => Some(u64::from(*width)),
            DataType::Pointer(_) => Some(u64::from(pointer_width)),
            DataType::Array { element, length } => {
                let elem = element.size(pointer_width)?;
                elem.checked_mul((*length)?)
            }
            DataType::Struct(s) => Some(s.size),
            DataType::Union(u) => u
                .alternatives
                .iter()
                .filter_map(|alt| alt.size(pointer_width))
                .max(),
        }
    }

    /// Rewrites every class reference, however deeply nested.
    pub fn map_classes<F: Fn(ClassId) -> ClassId>(&self, f: &F) -> DataType {
        match self {
            DataType::Pointer(target) => DataType::Pointer(f(*target)),
            DataType::Array { element, length } => DataType::Array {
                element: Box::new(element.map_classes(f)),
                length: *length,
            },
            DataType::Struct(s) => DataType::Struct(StructType {
                size: s.size,
                fields: s
                    .fields
                    .iter()
                    .map(|field| Field {
                        offset: field.offset,
                        ty: field.ty.map_classes(f),
                        padding: field.padding,
                    })
                    .collect(),
            }),
            DataType::Union(u) => DataType::Union(UnionType {
                alternatives: u.alternatives.iter().map(|a| a.map_classes(f)).collect(),
            }),
            DataType::Function(func) => DataType::Function(FunctionType {
                params: func.params.iter().map(|p| p.map_classes(f)).collect(),
                ret: Box::new(func.ret.map_classes(f)),
                untyped: func.untyped,
            }),
            DataType::Void | DataType::Boolean | DataType::Integer { .. } => self.clone(),
        }
    }

    /// Returns a short name for the variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataType::Void => "void",
            DataType::Boolean => "boolean",
            DataType::Integer { .. } => "integer",
            DataType::Pointer(_) => "pointer",
            DataType::Array { .. } => "array",
            DataType::Struct(_) => "struct",
            DataType::Union(_) => "union",
            DataType::Function(_) => "function",
        }
    }

    /// Returns true for `Void`.
    pub fn is_void(&self) -> bool {
        matches!(self, DataType::Void)
    }

    /// Returns true if this type is a pointer.
    pub fn is_pointer(&self) -> bool {
        matches!(self, DataType::Pointer(_))
    }

    /// Returns true for booleans and integers.
    pub fn is_scalar(&self) -> bool {
        matches!(self, DataType::Boolean | DataType::Integer { .. })
    }

    /// Returns true for structs, arrays and unions.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            DataType::Struct(_) | DataType::Array { .. } | DataType::Union(_)
        )
    }

    /// Joins two types without introducing a union.
    ///
    /// Returns `None` when the only common upper bound is a union.
    pub fn join_compatible(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (DataType::Void, t) | (t, DataType::Void) => Some(t.clone()),
            (a, b) if a == b => Some(a.clone()),
            (
                DataType::Integer { width: w1, sign: s1 },
                DataType::Integer { width: w2, sign: s2 },
            ) => Some(DataType::Integer {
                width: (*w1).max(*w2),
                sign: s1.merge(*s2),
            }),
            (DataType::Boolean, i @ DataType::Integer { .. })
            | (i @ DataType::Integer { .. }, DataType::Boolean) => Some(i.clone()),
            // First seen wins; the caller unifies the targets when it can.
            (DataType::Pointer(a), DataType::Pointer(_)) => Some(DataType::Pointer(*a)),
            (
                DataType::Array {
                    element: e1,
                    length: l1,
                },
                DataType::Array {
                    element: e2,
                    length: l2,
                },
            ) => {
                let element = e1.join_compatible(e2)?;
                let length = if l1 == l2 { *l1 } else { None };
                Some(DataType::array(element, length))
            }
            (DataType::Function(f1), DataType::Function(f2)) => {
                if f1.untyped || f2.untyped || f1.params.len() != f2.params.len() {
                    return Some(DataType::Function(FunctionType::untyped()));
                }
                let params = f1
                    .params
                    .iter()
                    .zip(&f2.params)
                    .map(|(a, b)| a.join(b))
                    .collect();
                Some(DataType::Function(FunctionType::new(
                    params,
                    f1.ret.join(&f2.ret),
                )))
            }
            _ => None,
        }
    }

    /// Least upper bound of two types.
    ///
    /// Precedence follows the lattice: `Void` is the bottom, integers absorb
    /// booleans and narrower integers, and anything else that cannot be
    /// reconciled becomes a union with `self` first.
    pub fn join(&self, other: &DataType) -> DataType {
        match (self, other) {
            (DataType::Union(_), _) | (_, DataType::Union(_)) => {
                DataType::union([self.clone(), other.clone()])
            }
            _ => self
                .join_compatible(other)
                .unwrap_or_else(|| DataType::union([self.clone(), other.clone()])),
        }
    }
}

fn push_alternative(acc: &mut Vec<DataType>, alt: DataType) {
    match alt {
        DataType::Union(u) => {
            for inner in u.alternatives {
                push_alternative(acc, inner);
            }
        }
        DataType::Void => {}
        alt => {
            for existing in acc.iter_mut() {
                if let Some(joined) = existing.join_compatible(&alt) {
                    *existing = joined;
                    return;
                }
            }
            acc.push(alt);
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Void => write!(f, "void"),
            DataType::Boolean => write!(f, "bool"),
            DataType::Integer { width, sign } => {
                let bits = u32::from(*width) * 8;
                match sign {
                    Signedness::Unknown if *width == 1 => write!(f, "byte"),
                    Signedness::Unknown => write!(f, "word{}", bits),
                    Signedness::Signed => write!(f, "int{}", bits),
                    Signedness::Unsigned => write!(f, "uint{}", bits),
                }
            }
            DataType::Pointer(target) => write!(f, "{}*", target),
            DataType::Array { element, length } => match length {
                Some(n) => write!(f, "{}[{}]", element, n),
                None => write!(f, "{}[]", element),
            },
            DataType::Struct(s) => write!(f, "{}", s),
            DataType::Union(u) => write!(f, "{}", u),
            DataType::Function(func) => write!(f, "{}", func),
        }
    }
}

/// A structure field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Byte offset from the start of the structure.
    pub offset: i64,
    /// Field type.
    pub ty: DataType,
    /// Filler between observed fields.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub padding: bool,
}

impl Field {
    /// Creates an observed field.
    pub fn new(offset: i64, ty: DataType) -> Self {
        Self {
            offset,
            ty,
            padding: false,
        }
    }

    /// Creates a `byte[len]` padding field.
    pub fn padding(offset: i64, len: u64) -> Self {
        Self {
            offset,
            ty: DataType::array(DataType::byte(), Some(len)),
            padding: true,
        }
    }
}

/// Structure layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StructType {
    /// Total size in bytes.
    pub size: u64,
    /// Fields ordered by offset.
    pub fields: Vec<Field>,
}

impl StructType {
    /// Creates a struct from fields.
    pub fn new(size: u64, fields: Vec<Field>) -> Self {
        Self { size, fields }
    }

    /// Returns the observed (non-padding) fields.
    pub fn observed_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.padding)
    }

    /// Returns the field starting at an offset.
    pub fn field_at(&self, offset: i64) -> Option<&Field> {
        self.fields.iter().find(|f| f.offset == offset)
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct {{")?;
        for field in &self.fields {
            if field.offset < 0 {
                write!(f, " -{:#x}: {};", field.offset.unsigned_abs(), field.ty)?;
            } else {
                write!(f, " {:#x}: {};", field.offset, field.ty)?;
            }
        }
        write!(f, " }}")
    }
}

/// Union alternatives, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnionType {
    pub alternatives: Vec<DataType>,
}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "union {{ ")?;
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{}", alt)?;
        }
        write!(f, " }}")
    }
}

/// Function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<DataType>,
    pub ret: Box<DataType>,
    /// Call sites disagreed on arity; parameters are unknown.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub untyped: bool,
}

impl FunctionType {
    /// Creates a signature.
    pub fn new(params: Vec<DataType>, ret: DataType) -> Self {
        Self {
            params,
            ret: Box::new(ret),
            untyped: false,
        }
    }

    /// Creates a signature with unknown parameters.
    pub fn untyped() -> Self {
        Self {
            params: Vec::new(),
            ret: Box::new(DataType::Void),
            untyped: true,
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.untyped {
            return write!(f, "{} (...)", self.ret);
        }
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_display() {
        assert_eq!(DataType::byte().to_string(), "byte");
        assert_eq!(DataType::integer(2).to_string(), "word16");
        assert_eq!(DataType::unsigned(1).to_string(), "uint8");
        assert_eq!(DataType::signed(4).to_string(), "int32");
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::Void.size(8), None);
        assert_eq!(DataType::pointer(ClassId::new(3)).size(2), Some(2));
        assert_eq!(DataType::array(DataType::integer(2), Some(4)).size(8), Some(8));
        assert_eq!(DataType::array(DataType::byte(), None).size(8), None);
        let u = DataType::union([DataType::byte(), DataType::pointer(ClassId::new(1))]);
        assert_eq!(u.size(2), Some(2));
    }

    #[test]
    fn test_oversized_array_has_no_size() {
        let huge = DataType::array(DataType::integer(4), Some(u64::MAX / 2));
        assert_eq!(huge.size(8), None);
        let row = DataType::array(DataType::byte(), Some(1 << 40));
        let nested = DataType::array(row, Some(1 << 40));
        assert_eq!(nested.size(8), None);
    }

    #[test]
    fn test_map_classes_reaches_nested_pointers() {
        let ty = DataType::Struct(StructType::new(
            4,
            vec![
                Field::new(0, DataType::pointer(ClassId::new(4))),
                Field::new(
                    2,
                    DataType::union([DataType::byte(), DataType::pointer(ClassId::new(5))]),
                ),
            ],
        ));
        let mapped = ty.map_classes(&|c| if c.0 > 3 { ClassId::new(c.0 - 3) } else { c });
        assert_eq!(
            mapped.to_string(),
            "struct { 0x0: Eq_1*; 0x2: union { byte | Eq_2* }; }"
        );
        let func = DataType::Function(FunctionType::new(
            vec![DataType::pointer(ClassId::new(7))],
            DataType::Void,
        ));
        assert_eq!(
            func.map_classes(&|_| ClassId::new(0)),
            DataType::Function(FunctionType::new(
                vec![DataType::pointer(ClassId::new(0))],
                DataType::Void,
            ))
        );
    }

    #[test]
    fn test_join_void_is_bottom() {
        let t = DataType::integer(4);
        assert_eq!(DataType::Void.join(&t), t);
        assert_eq!(t.join(&DataType::Void), t);
    }

    #[test]
    fn test_join_integers() {
        let joined = DataType::unsigned(1).join(&DataType::integer(2));
        assert_eq!(joined, DataType::unsigned(2));
        let joined = DataType::signed(1).join(&DataType::unsigned(1));
        assert_eq!(joined, DataType::byte());
        assert_eq!(DataType::Boolean.join(&DataType::byte()), DataType::byte());
    }

    #[test]
    fn test_join_scalar_and_pointer_is_union() {
        let ptr = DataType::pointer(ClassId::new(7));
        let joined = DataType::byte().join(&ptr);
        assert_eq!(
            joined,
            DataType::Union(UnionType {
                alternatives: vec![DataType::byte(), ptr.clone()]
            })
        );
        assert_eq!(joined.to_string(), "union { byte | Eq_7* }");
    }

    #[test]
    fn test_union_flattens_and_merges() {
        let ptr = DataType::pointer(ClassId::new(2));
        let u = DataType::union([DataType::byte(), ptr.clone()]);
        let widened = u.join(&DataType::integer(2));
        assert_eq!(
            widened,
            DataType::Union(UnionType {
                alternatives: vec![DataType::integer(2), ptr]
            })
        );
        assert_eq!(DataType::union([DataType::byte()]), DataType::byte());
        assert_eq!(DataType::union(Vec::new()), DataType::Void);
    }

    #[test]
    fn test_join_functions() {
        let f1 = DataType::Function(FunctionType::new(vec![DataType::byte()], DataType::Void));
        let f2 = DataType::Function(FunctionType::new(
            vec![DataType::integer(2)],
            DataType::Void,
        ));
        assert_eq!(
            f1.join(&f2),
            DataType::Function(FunctionType::new(
                vec![DataType::integer(2)],
                DataType::Void
            ))
        );
        let f3 = DataType::Function(FunctionType::new(Vec::new(), DataType::Void));
        assert_eq!(f1.join(&f3), DataType::Function(FunctionType::untyped()));
    }

    #[test]
    fn test_struct_display() {
        let s = StructType::new(
            4,
            vec![
                Field::new(0, DataType::byte()),
                Field::padding(1, 1),
                Field::new(2, DataType::integer(2)),
            ],
        );
        assert_eq!(
            DataType::Struct(s.clone()).to_string(),
            "struct { 0x0: byte; 0x1: byte[1]; 0x2: word16; }"
        );
        assert_eq!(s.observed_fields().count(), 2);
        assert!(s.field_at(1).unwrap().padding);
    }

    #[test]
    fn test_function_display() {
        let f = FunctionType::new(Vec::new(), DataType::Void);
        assert_eq!(f.to_string(), "void ()");
        assert_eq!(FunctionType::untyped().to_string(), "void (...)");
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&DataType::pointer(ClassId::new(5))).unwrap();
        assert_eq!(json, r#"{"pointer":5}"#);
        let back: DataType = serde_json::from_str(r#"{"integer":{"width":2}}"#).unwrap();
        assert_eq!(back, DataType::integer(2));
    }
}

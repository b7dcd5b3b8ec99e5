//! Aggregate synthesis.
//!
//! Turns the field and element accesses seen through pointers into a class
//! into a layout. Accesses are grouped by offset; a single type at an offset
//! becomes a field, several become a union field. Variably indexed accesses
//! become arrays bounded by the next field or by the class extent. Gaps are
//! filled with `byte[n]` padding.
//!
//! A few shapes are recognized before falling back to a struct:
//! - a lone offset-0 field is the pointee itself, not a one-field struct
//! - a lone offset-0 unit-stride element is the element type
//! - uniform contiguous fields from offset 0 are an array

use std::collections::BTreeMap;

use tyrecon_core::{ClassId, TypeVarId};
use tyrecon_types::{DataType, Field, StructType, UnionType};

use crate::annotation::Annotation;
use crate::constraint::FieldConstraint;
use crate::error::Result;
use crate::resolver::Resolver;

/// A variably indexed access: `base[offset + i * stride]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementAccess {
    pub offset: i64,
    pub stride: u32,
    pub width: u8,
    pub value: TypeVarId,
}

/// Layout evidence of one class.
#[derive(Debug, Clone, Default)]
pub struct AggregateEvidence {
    /// Fixed-offset accesses, in emission order.
    pub fields: Vec<FieldConstraint>,
    /// Indexed accesses, in emission order.
    pub elements: Vec<ElementAccess>,
    /// Known total size.
    pub extent: Option<u64>,
}

impl AggregateEvidence {
    /// Returns true if there is no field or element access.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.elements.is_empty()
    }
}

/// Types seen at one offset.
#[derive(Debug, Default)]
struct Slot {
    alternatives: Vec<DataType>,
    /// Widest access at this offset.
    width: u8,
}

impl Slot {
    fn add(&mut self, ty: DataType, width: u8) {
        if !self.alternatives.contains(&ty) {
            self.alternatives.push(ty);
        }
        self.width = self.width.max(width);
    }
}

/// Element type of an indexed access and its stride.
#[derive(Debug)]
struct ArraySlot {
    element: DataType,
    stride: u32,
}

/// Synthesizes the type of an aggregate class.
pub fn synthesize(
    resolver: &mut Resolver<'_>,
    class: ClassId,
    ev: &AggregateEvidence,
) -> Result<DataType> {
    let pointer_width = resolver.config().pointer_width;

    let mut slots: BTreeMap<i64, Slot> = BTreeMap::new();
    let mut seen = Vec::new();
    for f in &ev.fields {
        if seen.contains(&(f.offset, f.width)) {
            continue;
        }
        seen.push((f.offset, f.width));
        let ty = value_type(resolver, class, f.offset, f.value, f.width)?;
        slots.entry(f.offset).or_default().add(ty, f.width);
    }

    let mut arrays: BTreeMap<i64, Vec<ArraySlot>> = BTreeMap::new();
    let mut seen = Vec::new();
    for e in &ev.elements {
        if seen.contains(&(e.offset, e.stride, e.width)) {
            continue;
        }
        seen.push((e.offset, e.stride, e.width));
        let ty = value_type(resolver, class, e.offset, e.value, e.width)?;
        let element = if u64::from(e.stride) > u64::from(e.width) {
            DataType::Struct(StructType::new(
                u64::from(e.stride),
                vec![
                    Field::new(0, ty),
                    Field::padding(i64::from(e.width), u64::from(e.stride - u32::from(e.width))),
                ],
            ))
        } else {
            ty
        };
        arrays.entry(e.offset).or_default().push(ArraySlot {
            element,
            stride: e.stride,
        });
    }

    if ev.extent.is_none() {
        if arrays.is_empty() && slots.len() == 1 && slots.contains_key(&0) {
            let slot = slots.remove(&0).unwrap_or_default();
            return Ok(slot_type(resolver, class, 0, slot.alternatives));
        }

        if slots.is_empty() && arrays.len() == 1 {
            if let Some(group) = arrays.get(&0).filter(|g| g.len() == 1) {
                let only = &group[0];
                let unit = only.element.size(pointer_width) == Some(u64::from(only.stride));
                return Ok(if unit {
                    only.element.clone()
                } else {
                    DataType::array(only.element.clone(), None)
                });
            }
        }
    }

    if let Some(array) = uniform_array(resolver, &slots, &arrays, ev.extent) {
        return Ok(array);
    }

    Ok(layout(resolver, class, slots, arrays, ev.extent))
}

/// Resolves the type of a value stored in the aggregate.
fn value_type(
    resolver: &mut Resolver<'_>,
    class: ClassId,
    offset: i64,
    value: TypeVarId,
    width: u8,
) -> Result<DataType> {
    match resolver.resolve_var(value)? {
        Some(DataType::Void) => Ok(DataType::integer(width)),
        Some(ty) => Ok(ty),
        // The value's class is still being resolved: it contains this
        // aggregate by value.
        None => {
            resolver.annotate(Annotation::RecursiveLayout { class, offset });
            Ok(DataType::integer(width))
        }
    }
}

fn slot_type(
    resolver: &mut Resolver<'_>,
    class: ClassId,
    offset: i64,
    mut alternatives: Vec<DataType>,
) -> DataType {
    if alternatives.len() == 1 {
        return alternatives.pop().unwrap_or(DataType::Void);
    }
    resolver.annotate(Annotation::FieldUnion {
        class,
        offset,
        alternatives: alternatives.len(),
    });
    DataType::Union(UnionType { alternatives })
}

fn uniform_array(
    resolver: &Resolver<'_>,
    slots: &BTreeMap<i64, Slot>,
    arrays: &BTreeMap<i64, Vec<ArraySlot>>,
    extent: Option<u64>,
) -> Option<DataType> {
    let config = resolver.config();
    if !config.collapse_uniform_arrays || !arrays.is_empty() {
        return None;
    }
    if slots.len() < config.min_array_elements.max(2) {
        return None;
    }

    let first = slots.get(&0)?;
    let [element] = first.alternatives.as_slice() else {
        return None;
    };
    let width = first.width;
    if element.size(config.pointer_width) != Some(u64::from(width)) {
        return None;
    }
    for (i, (offset, slot)) in slots.iter().enumerate() {
        let expected = i as i64 * i64::from(width);
        if *offset != expected || slot.width != width || slot.alternatives.len() != 1 {
            return None;
        }
        if &slot.alternatives[0] != element {
            return None;
        }
    }

    let length = slots.len() as u64;
    if extent.is_some_and(|e| e != length * u64::from(width)) {
        return None;
    }
    Some(DataType::array(element.clone(), Some(length)))
}

fn layout(
    resolver: &mut Resolver<'_>,
    class: ClassId,
    mut slots: BTreeMap<i64, Slot>,
    mut arrays: BTreeMap<i64, Vec<ArraySlot>>,
    extent: Option<u64>,
) -> DataType {
    let pointer_width = resolver.config().pointer_width;
    let mut offsets: Vec<i64> = slots.keys().chain(arrays.keys()).copied().collect();
    offsets.sort_unstable();
    offsets.dedup();

    let start = offsets.first().copied().unwrap_or(0).min(0);
    let end_bound = extent.map(|e| e as i64);
    let mut cursor = start;
    let mut previous: Option<i64> = None;
    let mut fields = Vec::new();

    for (i, &offset) in offsets.iter().enumerate() {
        let bound = offsets.get(i + 1).copied().or(end_bound.filter(|&e| e > offset));

        let slot = slots.remove(&offset).unwrap_or_default();
        let mut alternatives = slot.alternatives;
        let mut size = u64::from(slot.width);
        for array in arrays.remove(&offset).unwrap_or_default() {
            let length = bound
                .map(|b| (b - offset) as u64 / u64::from(array.stride))
                .filter(|&n| n > 0);
            let ty = DataType::array(array.element, length);
            size = size.max(ty.size(pointer_width).unwrap_or(u64::from(array.stride)));
            if !alternatives.contains(&ty) {
                alternatives.push(ty);
            }
        }
        let ty = slot_type(resolver, class, offset, alternatives);
        let size = ty.size(pointer_width).unwrap_or(0).max(size);

        if offset > cursor {
            fields.push(Field::padding(cursor, (offset - cursor) as u64));
        } else if offset < cursor {
            if let Some(prev) = previous {
                resolver.annotate(Annotation::OverlappingFields {
                    class,
                    first: prev,
                    second: offset,
                });
            }
        }
        fields.push(Field::new(offset, ty));
        cursor = cursor.max(offset + size as i64);
        previous = Some(offset);
    }

    if let Some(end) = end_bound.filter(|&e| e > cursor) {
        fields.push(Field::padding(cursor, (end - cursor) as u64));
        cursor = end;
    }

    DataType::Struct(StructType::new((cursor - start) as u64, fields))
}

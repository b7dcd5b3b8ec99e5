//! Constraint collection.
//!
//! Walks a trace once, in order, allocating type variables for every use and
//! attaching evidence to their classes:
//!
//! | operation            | evidence                                              |
//! |----------------------|-------------------------------------------------------|
//! | literal              | `Constant` (non-zero) or `Size` (zero)                |
//! | load / store         | `Size` on the value, `PointsTo` on the base, `Field` on the pointee |
//! | indexed load         | as above with `Element`, `Counter` on the index       |
//! | `x ± k`              | unify `x` with the result, `Step` and `Size`          |
//! | comparison           | `Boolean` result, `Discriminant` / `Ordered` operands |
//! | bitwise              | `Bitwise` on result and variable operands             |
//! | call                 | `PointsTo` on the target, `CallSite` on the code      |
//!
//! Accesses through a fixed address are attributed to the segment holding
//! that address: the segment gets one pointer variable, and its pointee
//! collects the accesses as fields at segment-relative offsets.

use indexmap::IndexMap;
use tracing::{debug, trace};
use tyrecon_core::{ArithOp, ClassId, MemoryMap, OpKind, Operand, Operation, Trace, TypeVarId};

use crate::constraint::{CallSiteConstraint, ConstraintKind, FieldConstraint};
use crate::equivalence::TypeArena;
use crate::error::{AnalysisError, Result};
use crate::store::UseSite;

/// What collection learned beyond the constraints themselves.
#[derive(Debug, Clone, Default)]
pub struct CollectedFacts {
    /// Storage names and their variables, in first-use order.
    pub storage: IndexMap<String, TypeVarId>,
    /// Segment names and their base pointer variables, in first-use order.
    pub segments: IndexMap<String, TypeVarId>,
    /// Variables synthesized as pointees.
    pub pointees: Vec<TypeVarId>,
}

/// Builds constraints for one function.
pub struct ConstraintCollector<'a> {
    arena: &'a mut TypeArena,
    memory: &'a MemoryMap,
    addresses: IndexMap<u64, TypeVarId>,
    results: Vec<Option<TypeVarId>>,
    facts: CollectedFacts,
}

impl<'a> ConstraintCollector<'a> {
    /// Creates a collector writing into `arena`.
    pub fn new(arena: &'a mut TypeArena, memory: &'a MemoryMap) -> Self {
        Self {
            arena,
            memory,
            addresses: IndexMap::new(),
            results: Vec::new(),
            facts: CollectedFacts::default(),
        }
    }

    /// Collects constraints for every operation of the trace.
    pub fn collect(mut self, trace: &Trace) -> Result<CollectedFacts> {
        for op in trace.operations() {
            let result = self.operation(op)?;
            trace!(position = op.position, op = %op, ?result, "collected");
            self.results.push(result);
        }
        debug!(
            operations = trace.len(),
            variables = self.arena.variable_count(),
            classes = self.arena.live_class_count(),
            "constraint collection done"
        );
        Ok(self.facts)
    }

    fn operation(&mut self, op: &Operation) -> Result<Option<TypeVarId>> {
        let position = op.position;
        let result = match &op.kind {
            OpKind::Literal { value, width } => Some(self.literal(position, *value, *width)?),
            OpKind::Copy { src } => {
                let src = self.operand(position, src)?;
                let result = self.expression(op);
                self.arena.unify(result, src)?;
                Some(result)
            }
            OpKind::Load {
                base,
                offset,
                width,
            } => {
                let (pointee, offset) = self.access_base(position, base, *offset)?;
                let result = self.expression(op);
                self.constrain(result, position, ConstraintKind::Size { width: *width })?;
                self.constrain(
                    pointee,
                    position,
                    ConstraintKind::Field(FieldConstraint {
                        offset,
                        width: *width,
                        value: result,
                    }),
                )?;
                Some(result)
            }
            OpKind::Store {
                base,
                offset,
                width,
                value,
            } => {
                let value = self.operand(position, value)?;
                self.constrain(value, position, ConstraintKind::Size { width: *width })?;
                let (pointee, offset) = self.access_base(position, base, *offset)?;
                self.constrain(
                    pointee,
                    position,
                    ConstraintKind::Field(FieldConstraint {
                        offset,
                        width: *width,
                        value,
                    }),
                )?;
                None
            }
            OpKind::Index {
                base,
                index,
                offset,
                stride,
                width,
            } => {
                let index = self.operand(position, index)?;
                self.constrain(index, position, ConstraintKind::Counter)?;
                let (pointee, offset) = self.access_base(position, base, *offset)?;
                let result = self.expression(op);
                self.constrain(result, position, ConstraintKind::Size { width: *width })?;
                self.constrain(
                    pointee,
                    position,
                    ConstraintKind::Element {
                        offset,
                        stride: *stride,
                        width: *width,
                        value: result,
                    },
                )?;
                Some(result)
            }
            OpKind::PointerArith {
                op: arith,
                operand,
                step,
                width,
            } => {
                let operand = self.operand(position, operand)?;
                let result = self.expression(op);
                self.arena.unify(result, operand)?;
                let size = match arith {
                    ArithOp::Add => *step,
                    ArithOp::Sub => step.wrapping_neg(),
                };
                self.constrain(result, position, ConstraintKind::Step { size })?;
                self.constrain(result, position, ConstraintKind::Size { width: *width })?;
                Some(result)
            }
            OpKind::Compare {
                op: cmp,
                lhs: lhs_op,
                rhs: rhs_op,
            } => {
                let lhs = self.operand(position, lhs_op)?;
                let rhs = self.operand(position, rhs_op)?;
                let result = self.expression(op);
                self.constrain(result, position, ConstraintKind::Boolean)?;
                for (var, this, other) in [(lhs, lhs_op, rhs_op), (rhs, rhs_op, lhs_op)] {
                    if this.is_literal() {
                        continue;
                    }
                    if let Operand::Literal { width, .. } = other {
                        self.constrain(var, position, ConstraintKind::Discriminant { width: *width })?;
                    }
                    if let Some(signed) = cmp.signedness() {
                        self.constrain(var, position, ConstraintKind::Ordered { signed })?;
                    }
                }
                Some(result)
            }
            OpKind::Bitwise {
                lhs: lhs_op,
                rhs: rhs_op,
                width,
                ..
            } => {
                let lhs = self.operand(position, lhs_op)?;
                let rhs = self.operand(position, rhs_op)?;
                let result = self.expression(op);
                let kind = ConstraintKind::Bitwise { width: *width };
                self.constrain(result, position, kind.clone())?;
                for (var, operand) in [(lhs, lhs_op), (rhs, rhs_op)] {
                    if !operand.is_literal() {
                        self.constrain(var, position, kind.clone())?;
                    }
                }
                Some(result)
            }
            OpKind::Call {
                target,
                args,
                result_used,
            } => {
                let target = self.operand(position, target)?;
                let code = self.pointee_of(target, position)?;
                let args = args
                    .iter()
                    .map(|arg| self.operand(position, arg))
                    .collect::<Result<Vec<_>>>()?;
                let result = self.expression(op);
                let ret = result_used.then_some(result);
                self.constrain(
                    code,
                    position,
                    ConstraintKind::CallSite(CallSiteConstraint { args, ret }),
                )?;
                Some(result)
            }
        };

        if let (Some(dst), Some(result)) = (&op.dst, result) {
            let dst = self.storage(dst);
            self.arena.unify(dst, result)?;
        }
        Ok(result)
    }

    fn constrain(&mut self, var: TypeVarId, position: usize, kind: ConstraintKind) -> Result<()> {
        self.arena.add_constraint(var, position, kind)
    }

    fn expression(&mut self, op: &Operation) -> TypeVarId {
        self.arena.new_variable(UseSite::Expression {
            position: op.position,
            text: op.to_string(),
        })
    }

    fn storage(&mut self, name: &str) -> TypeVarId {
        if let Some(var) = self.facts.storage.get(name) {
            return *var;
        }
        let var = self.arena.new_variable(UseSite::Storage {
            name: name.to_string(),
        });
        self.facts.storage.insert(name.to_string(), var);
        var
    }

    fn literal(&mut self, position: usize, value: i64, width: u8) -> Result<TypeVarId> {
        let var = self.arena.new_variable(UseSite::Literal { position, value });
        let kind = if value == 0 {
            ConstraintKind::Size { width }
        } else {
            ConstraintKind::Constant { width }
        };
        self.constrain(var, position, kind)?;
        Ok(var)
    }

    fn operand(&mut self, position: usize, operand: &Operand) -> Result<TypeVarId> {
        match operand {
            Operand::Storage(name) => Ok(self.storage(name)),
            Operand::Literal { value, width } => self.literal(position, *value, *width),
            Operand::Address(address) => {
                if let Some(var) = self.addresses.get(address) {
                    return Ok(*var);
                }
                let var = self.arena.new_variable(UseSite::Address { address: *address });
                self.addresses.insert(*address, var);
                Ok(var)
            }
            Operand::Result(target) => self
                .results
                .get(*target)
                .copied()
                .flatten()
                .ok_or(AnalysisError::Trace(tyrecon_core::Error::UnknownOperand {
                    position,
                    target: *target,
                })),
        }
    }

    /// Resolves the base of a memory access to the pointee receiving the
    /// field and the offset within it.
    fn access_base(
        &mut self,
        position: usize,
        base: &Operand,
        offset: i64,
    ) -> Result<(TypeVarId, i64)> {
        match base {
            Operand::Address(start) => {
                let address = start.wrapping_add(offset as u64);
                let location = self.memory.locate(address);
                let local = i64::try_from(location.offset)
                    .map_err(|_| AnalysisError::AddressOutOfRange { position, address })?;
                let (segment, size) = (location.segment.to_string(), location.size);
                let (pointer, fresh) = match self.facts.segments.get(&segment) {
                    Some(var) => (*var, false),
                    None => {
                        let var = self.arena.new_variable(UseSite::Segment {
                            name: segment.clone(),
                        });
                        self.facts.segments.insert(segment, var);
                        (var, true)
                    }
                };
                let pointee = self.pointee_of(pointer, position)?;
                if let (true, Some(size)) = (fresh, size) {
                    self.constrain(pointee, position, ConstraintKind::Extent { size })?;
                }
                Ok((pointee, local))
            }
            other => {
                let pointer = self.operand(position, other)?;
                let pointee = self.pointee_of(pointer, position)?;
                Ok((pointee, offset))
            }
        }
    }

    /// Returns the pointee of a pointer variable, creating it on first use,
    /// and records the dereference.
    fn pointee_of(&mut self, pointer: TypeVarId, position: usize) -> Result<TypeVarId> {
        let existing = self
            .arena
            .class_for(pointer)
            .constraints()
            .iter()
            .find_map(|c| match c.kind {
                ConstraintKind::PointsTo { target } => Some(target),
                _ => None,
            });
        let target = match existing {
            Some(target) => target,
            None => {
                let var = self.arena.new_variable(UseSite::Pointee { of: pointer });
                self.facts.pointees.push(var);
                var
            }
        };
        self.constrain(pointer, position, ConstraintKind::PointsTo { target })?;
        Ok(target)
    }
}

/// Class of the pointee of a segment's base pointer, if the segment was
/// accessed.
pub fn segment_pointee(arena: &TypeArena, pointer: TypeVarId) -> Option<ClassId> {
    arena
        .class_for(pointer)
        .constraints()
        .iter()
        .find_map(|c| match c.kind {
            ConstraintKind::PointsTo { target } => Some(arena.class_of(target)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tyrecon_core::{Segment, TraceBuilder};

    fn collect(trace: &Trace, memory: &MemoryMap) -> (TypeArena, CollectedFacts) {
        let mut arena = TypeArena::new();
        let facts = ConstraintCollector::new(&mut arena, memory)
            .collect(trace)
            .unwrap();
        (arena, facts)
    }

    fn kinds(arena: &TypeArena, var: TypeVarId) -> Vec<&'static str> {
        arena
            .class_for(var)
            .constraints()
            .iter()
            .map(|c| c.kind.name())
            .collect()
    }

    #[test]
    fn test_storage_shares_variable() {
        let mut b = TraceBuilder::new();
        b.copy(Operand::storage("R0"));
        b.copy(Operand::storage("R0"));
        let (arena, facts) = collect(&b.build().unwrap(), &MemoryMap::new());
        assert_eq!(facts.storage.len(), 1);
        // R0, %0, %1 all end up together.
        assert_eq!(arena.live_class_count(), 1);
        assert_eq!(arena.variable_count(), 3);
    }

    #[test]
    fn test_load_creates_field_on_pointee() {
        let mut b = TraceBuilder::new();
        b.load(Operand::storage("p"), 4, 2);
        let (arena, facts) = collect(&b.build().unwrap(), &MemoryMap::new());
        let p = facts.storage["p"];
        assert_eq!(kinds(&arena, p), ["points-to"]);
        let pointee = facts.pointees[0];
        let field = &arena.class_for(pointee).constraints()[0];
        assert!(matches!(
            field.kind,
            ConstraintKind::Field(FieldConstraint {
                offset: 4,
                width: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_dereferences_share_pointee() {
        let mut b = TraceBuilder::new();
        b.load(Operand::storage("p"), 0, 1);
        b.load(Operand::storage("p"), 1, 1);
        let (_, facts) = collect(&b.build().unwrap(), &MemoryMap::new());
        assert_eq!(facts.pointees.len(), 1);
    }

    #[test]
    fn test_fixed_address_goes_to_segment() {
        let memory = MemoryMap::with_segments([Segment::new("__data", 0x100, 0x80)]).unwrap();
        let mut b = TraceBuilder::new();
        b.load(Operand::address(0x104), 0, 1);
        b.store(Operand::address(0x100), 2, 1, Operand::literal(1, 1));
        let (arena, facts) = collect(&b.build().unwrap(), &memory);
        let segment = facts.segments["__data"];
        let pointee = segment_pointee(&arena, segment).unwrap();
        let offsets: Vec<_> = arena
            .class(pointee)
            .unwrap()
            .constraints()
            .iter()
            .filter_map(|c| match c.kind {
                ConstraintKind::Field(f) => Some(f.offset),
                ConstraintKind::Extent { size } => {
                    assert_eq!(size, 0x80);
                    None
                }
                _ => None,
            })
            .collect();
        assert_eq!(offsets, [4, 2]);
    }

    #[test]
    fn test_unmapped_address_beyond_offset_range_fails() {
        let mut b = TraceBuilder::new();
        b.load(Operand::address(0x8000_0000_0000_0010), 0, 1);
        let mut arena = TypeArena::new();
        let memory = MemoryMap::new();
        let err = ConstraintCollector::new(&mut arena, &memory)
            .collect(&b.build().unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::AddressOutOfRange {
                position: 0,
                address: 0x8000_0000_0000_0010
            }
        ));
    }

    #[test]
    fn test_compare_marks_discriminant_and_sign() {
        let mut b = TraceBuilder::new();
        let v = b.copy(Operand::storage("x"));
        b.compare(tyrecon_core::CompareOp::Lt, v, Operand::literal(10, 2));
        let (arena, facts) = collect(&b.build().unwrap(), &MemoryMap::new());
        let x = facts.storage["x"];
        assert_eq!(kinds(&arena, x), ["discriminant", "ordered"]);
    }

    #[test]
    fn test_call_through_same_address_shares_code_class() {
        let mut b = TraceBuilder::new();
        b.call(Operand::address(0x3), Vec::new(), false);
        b.call(Operand::address(0x3), Vec::new(), false);
        let (arena, facts) = collect(&b.build().unwrap(), &MemoryMap::new());
        assert_eq!(facts.pointees.len(), 1);
        let sites = arena
            .class_for(facts.pointees[0])
            .constraints()
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::CallSite(_)))
            .count();
        assert_eq!(sites, 2);
    }
}

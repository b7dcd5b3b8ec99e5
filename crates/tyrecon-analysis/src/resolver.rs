//! Lattice resolution.
//!
//! Resolution runs in two phases:
//!
//! 1. **Unification.** Repeatedly merges the targets of all pointers in a
//!    class, and the values of fields (and elements) sharing an access key,
//!    until a round performs no merge. Every merge removes a class, so the
//!    loop terminates.
//! 2. **Verdicts.** Each live class gets a type from its evidence, most
//!    specific first: code, aggregate, scalar/pointer conflict, pointer,
//!    integer, boolean, counter, void.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, trace};
use tyrecon_core::{ClassId, TypeVarId};
use tyrecon_types::{DataType, Signedness};

use crate::aggregate::{self, AggregateEvidence, ElementAccess};
use crate::annotation::Annotation;
use crate::config::AnalysisConfig;
use crate::constraint::{CallSiteConstraint, ConstraintKind};
use crate::equivalence::{ClassState, TypeArena};
use crate::error::Result;
use crate::signature;

/// Runs the unification fixed point. Returns the number of merges.
pub fn unify_fixed_point(arena: &mut TypeArena) -> Result<usize> {
    let mut total = 0;
    let mut round = 0;
    loop {
        round += 1;
        let mut merged = 0;
        for id in arena.live_class_ids() {
            let Some(class) = arena.class(id).filter(|c| c.is_live()) else {
                continue;
            };

            let mut groups: Vec<Vec<TypeVarId>> = Vec::new();
            let mut targets = Vec::new();
            let mut fields: BTreeMap<(i64, u8), Vec<TypeVarId>> = BTreeMap::new();
            let mut elements: BTreeMap<(i64, u32, u8), Vec<TypeVarId>> = BTreeMap::new();
            for c in class.constraints() {
                match &c.kind {
                    ConstraintKind::PointsTo { target } => targets.push(*target),
                    ConstraintKind::Field(f) => {
                        fields.entry((f.offset, f.width)).or_default().push(f.value)
                    }
                    ConstraintKind::Element {
                        offset,
                        stride,
                        width,
                        value,
                    } => elements
                        .entry((*offset, *stride, *width))
                        .or_default()
                        .push(*value),
                    _ => {}
                }
            }
            groups.push(targets);
            groups.extend(fields.into_values());
            groups.extend(elements.into_values());

            for group in groups {
                let Some((&first, rest)) = group.split_first() else {
                    continue;
                };
                for &other in rest {
                    if arena.class_of(first) != arena.class_of(other) {
                        arena.unify(first, other)?;
                        merged += 1;
                    }
                }
            }
        }
        total += merged;
        trace!(round, merged, "unification round");
        if merged == 0 {
            break;
        }
    }
    debug!(rounds = round, merges = total, "unification reached fixed point");
    Ok(total)
}

/// Everything a class's constraints say, grouped by kind.
#[derive(Debug, Default)]
struct Evidence {
    call_sites: Vec<CallSiteConstraint>,
    aggregate: AggregateEvidence,
    pointer: Option<(u64, usize, TypeVarId)>,
    strong_scalar: Option<(u64, usize)>,
    width: Option<u8>,
    signed_votes: usize,
    unsigned_votes: usize,
    boolean: bool,
    counter: bool,
    steps: Vec<i64>,
}

impl Evidence {
    fn gather(arena: &TypeArena, class: ClassId) -> Self {
        let mut ev = Evidence::default();
        let Some(record) = arena.class(class) else {
            return ev;
        };
        for c in record.constraints() {
            if let Some(w) = c.kind.scalar_width() {
                ev.width = Some(ev.width.map_or(w, |cur| cur.max(w)));
            }
            if c.kind.is_strong_scalar() && ev.strong_scalar.is_none() {
                ev.strong_scalar = Some((c.seq, c.position));
            }
            match &c.kind {
                ConstraintKind::Bitwise { .. } => ev.unsigned_votes += 1,
                ConstraintKind::Ordered { signed: true } => ev.signed_votes += 1,
                ConstraintKind::Ordered { signed: false } => ev.unsigned_votes += 1,
                ConstraintKind::Boolean => ev.boolean = true,
                ConstraintKind::Counter => ev.counter = true,
                ConstraintKind::Step { size } => ev.steps.push(*size),
                ConstraintKind::PointsTo { target } => {
                    if ev.pointer.is_none() {
                        ev.pointer = Some((c.seq, c.position, *target));
                    }
                }
                ConstraintKind::Field(f) => ev.aggregate.fields.push(*f),
                ConstraintKind::Element {
                    offset,
                    stride,
                    width,
                    value,
                } => ev.aggregate.elements.push(ElementAccess {
                    offset: *offset,
                    stride: *stride,
                    width: *width,
                    value: *value,
                }),
                ConstraintKind::Extent { size } => {
                    ev.aggregate.extent = Some(ev.aggregate.extent.map_or(*size, |e| e.max(*size)))
                }
                ConstraintKind::CallSite(site) => ev.call_sites.push(site.clone()),
                ConstraintKind::Size { .. }
                | ConstraintKind::Constant { .. }
                | ConstraintKind::Discriminant { .. } => {}
            }
        }
        ev
    }

    fn sign(&self) -> Signedness {
        match (self.signed_votes, self.unsigned_votes) {
            (0, 0) => Signedness::Unknown,
            (_, 0) => Signedness::Signed,
            (0, _) => Signedness::Unsigned,
            _ => Signedness::Unknown,
        }
    }

    fn is_empty(&self) -> bool {
        self.call_sites.is_empty()
            && self.aggregate.is_empty()
            && self.pointer.is_none()
            && self.width.is_none()
            && !self.boolean
            && !self.counter
            && self.steps.is_empty()
            && self.signed_votes == 0
            && self.unsigned_votes == 0
    }
}

/// Per-class resolution.
pub struct Resolver<'a> {
    arena: &'a mut TypeArena,
    config: &'a AnalysisConfig,
    annotations: Vec<Annotation>,
    in_progress: HashSet<ClassId>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over an arena.
    pub fn new(arena: &'a mut TypeArena, config: &'a AnalysisConfig) -> Self {
        Self {
            arena,
            config,
            annotations: Vec::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Resolves every live class in id order and returns the annotations.
    pub fn resolve_all(mut self) -> Result<Vec<Annotation>> {
        for id in self.arena.live_class_ids() {
            self.resolve(id)?;
        }
        debug!(
            classes = self.arena.live_class_count(),
            annotations = self.annotations.len(),
            "resolution done"
        );
        Ok(self.annotations)
    }

    pub(crate) fn config(&self) -> &AnalysisConfig {
        self.config
    }

    pub(crate) fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Resolves the class of a variable, or `None` if that class is already
    /// being resolved further up the stack.
    pub(crate) fn resolve_var(&mut self, var: TypeVarId) -> Result<Option<DataType>> {
        let class = self.arena.class_of(var);
        if self.in_progress.contains(&class) {
            return Ok(None);
        }
        self.resolve(class).map(Some)
    }

    /// Resolves one class, reusing an earlier verdict.
    pub fn resolve(&mut self, class: ClassId) -> Result<DataType> {
        let class = self.arena.find(class)?;
        if let Some(record) = self.arena.class(class) {
            if matches!(record.state(), ClassState::Resolved | ClassState::Finalized) {
                if let Some(ty) = record.data_type() {
                    return Ok(ty.clone());
                }
            }
        }

        self.in_progress.insert(class);
        let verdict = self.verdict(class);
        self.in_progress.remove(&class);
        let ty = verdict?;

        trace!(%class, ty = %ty, "resolved");
        self.arena.set_type(class, ty.clone())?;
        Ok(ty)
    }

    fn verdict(&mut self, class: ClassId) -> Result<DataType> {
        let ev = Evidence::gather(self.arena, class);

        if !ev.call_sites.is_empty() {
            if !ev.aggregate.is_empty() {
                self.annotate(Annotation::MixedCodeData { class });
            }
            let func = signature::recover(self, class, &ev.call_sites)?;
            return Ok(DataType::Function(func));
        }

        if !ev.aggregate.is_empty() {
            return aggregate::synthesize(self, class, &ev.aggregate);
        }

        let word = self.config.word_width;
        let scalar = || DataType::Integer {
            width: ev.width.unwrap_or(word),
            sign: ev.sign(),
        };

        if let Some((pointer_seq, pointer_at, target)) = ev.pointer {
            let pointer = DataType::Pointer(self.arena.class_of(target));
            if let Some(&step) = ev.steps.iter().find(|s| s.unsigned_abs() > 1) {
                self.annotate(Annotation::StridedPointer { class, step });
            }
            if let Some((scalar_seq, scalar_at)) = ev.strong_scalar {
                self.annotate(Annotation::KindConflict {
                    class,
                    scalar_at,
                    pointer_at,
                });
                let alternatives = if scalar_seq < pointer_seq {
                    vec![scalar(), pointer]
                } else {
                    vec![pointer, scalar()]
                };
                return Ok(DataType::Union(tyrecon_types::UnionType { alternatives }));
            }
            return Ok(pointer);
        }

        if ev.width.is_some() {
            return Ok(scalar());
        }
        if ev.boolean {
            return Ok(DataType::Boolean);
        }
        let ordered = ev.signed_votes > 0 || ev.unsigned_votes > 0;
        if ev.counter || !ev.steps.is_empty() || ordered {
            return Ok(scalar());
        }

        debug_assert!(ev.is_empty());
        Ok(DataType::Void)
    }
}

/// Returns true if a class has no evidence at all.
pub fn has_no_evidence(arena: &TypeArena, class: ClassId) -> bool {
    Evidence::gather(arena, class).is_empty()
}

//! Equivalence engine.
//!
//! A union-find over dense class indices. The tree shape is driven by rank
//! and path compression; a separate leader table names each set by its
//! lowest [`ClassId`], so the surviving class of a merge does not depend on
//! the tree. Class payloads (members and constraints) live in an arena
//! indexed by class id and are moved into the survivor on every merge, kept
//! sorted so the result is independent of merge order.

use serde::{Deserialize, Serialize};
use tracing::trace;
use tyrecon_core::{ClassId, TypeVarId};
use tyrecon_types::{DataType, Signedness};

use crate::constraint::{Constraint, ConstraintKind};
use crate::error::{AnalysisError, Result};
use crate::store::{TypeVariable, UseSite, VariableStore};

/// Lifecycle of an equivalence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassState {
    /// No constraints yet.
    Unresolved,
    /// Constraints present, no verdict.
    Constrained,
    /// A type has been assigned; further merges can reopen it.
    Resolved,
    /// Emitted. Immutable.
    Finalized,
}

/// A set of type variables sharing one representation.
#[derive(Debug, Clone)]
pub struct EquivalenceClass {
    id: ClassId,
    members: Vec<TypeVarId>,
    constraints: Vec<Constraint>,
    state: ClassState,
    data_type: Option<DataType>,
    absorbed_into: Option<ClassId>,
}

impl EquivalenceClass {
    fn singleton(id: ClassId, member: TypeVarId) -> Self {
        Self {
            id,
            members: vec![member],
            constraints: Vec::new(),
            state: ClassState::Unresolved,
            data_type: None,
            absorbed_into: None,
        }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Members, sorted by id.
    pub fn members(&self) -> &[TypeVarId] {
        &self.members
    }

    /// Constraints, in emission order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn state(&self) -> ClassState {
        self.state
    }

    /// Resolved type, if resolution has run.
    pub fn data_type(&self) -> Option<&DataType> {
        self.data_type.as_ref()
    }

    /// Returns true unless the class was absorbed by a merge.
    pub fn is_live(&self) -> bool {
        self.absorbed_into.is_none()
    }

    /// Class this one was merged into.
    pub fn absorbed_into(&self) -> Option<ClassId> {
        self.absorbed_into
    }
}

/// Owner of all variables and classes of one analysis.
#[derive(Debug, Default)]
pub struct TypeArena {
    store: VariableStore,
    parent: Vec<u32>,
    rank: Vec<u8>,
    leader: Vec<ClassId>,
    classes: Vec<EquivalenceClass>,
    next_seq: u64,
}

impl TypeArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all variables and classes. Numbering restarts at zero.
    pub fn reset(&mut self) {
        self.store.clear();
        self.parent.clear();
        self.rank.clear();
        self.leader.clear();
        self.classes.clear();
        self.next_seq = 0;
    }

    /// Creates a variable together with its singleton class.
    ///
    /// `T_n` always starts out in `Eq_n`.
    pub fn new_variable(&mut self, site: UseSite) -> TypeVarId {
        let var = self.store.push(site);
        let class = ClassId::new(var.0);
        self.parent.push(var.0);
        self.rank.push(0);
        self.leader.push(class);
        self.classes.push(EquivalenceClass::singleton(class, var));
        var
    }

    /// Returns a variable.
    pub fn variable(&self, id: TypeVarId) -> Option<&TypeVariable> {
        self.store.get(id)
    }

    /// Returns all variables in id order.
    pub fn variables(&self) -> impl Iterator<Item = &TypeVariable> {
        self.store.iter()
    }

    pub fn variable_count(&self) -> usize {
        self.store.len()
    }

    fn root(&mut self, idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] as usize != root {
            root = self.parent[root] as usize;
        }
        // Path compression.
        let mut cur = idx;
        while self.parent[cur] as usize != root {
            let next = self.parent[cur] as usize;
            self.parent[cur] = root as u32;
            cur = next;
        }
        root
    }

    fn root_of(&self, idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] as usize != root {
            root = self.parent[root] as usize;
        }
        root
    }

    /// Returns the representative of a class, compressing the path.
    pub fn find(&mut self, class: ClassId) -> Result<ClassId> {
        self.check_class(class)?;
        let root = self.root(class.index());
        Ok(self.leader[root])
    }

    /// Returns the representative of a class without mutating the forest.
    pub fn representative(&self, class: ClassId) -> Option<ClassId> {
        (class.index() < self.parent.len()).then(|| self.leader[self.root_of(class.index())])
    }

    /// Returns the class currently holding a variable.
    ///
    /// `var` must come from this arena.
    pub fn class_of(&self, var: TypeVarId) -> ClassId {
        self.leader[self.root_of(var.index())]
    }

    /// Merges the classes of two variables.
    pub fn unify(&mut self, a: TypeVarId, b: TypeVarId) -> Result<ClassId> {
        self.check_variable(a)?;
        self.check_variable(b)?;
        self.union(ClassId::new(a.0), ClassId::new(b.0))
    }

    /// Merges two classes into the one with the lower id.
    ///
    /// Fails if either class is unknown or finalized. A merge drops any
    /// earlier verdict: the survivor is `Constrained` if the merged set
    /// carries constraints and `Unresolved` otherwise.
    pub fn union(&mut self, a: ClassId, b: ClassId) -> Result<ClassId> {
        self.check_class(a)?;
        self.check_class(b)?;
        let ra = self.root(a.index());
        let rb = self.root(b.index());
        let (la, lb) = (self.leader[ra], self.leader[rb]);
        if ra == rb {
            return Ok(la);
        }
        if self.classes[la.index()].state == ClassState::Finalized
            || self.classes[lb.index()].state == ClassState::Finalized
        {
            return Err(AnalysisError::FinalizedMerge { a: la, b: lb });
        }

        let root = match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => {
                self.parent[ra] = rb as u32;
                rb
            }
            std::cmp::Ordering::Greater => {
                self.parent[rb] = ra as u32;
                ra
            }
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra as u32;
                self.rank[ra] += 1;
                ra
            }
        };

        let (survivor, absorbed) = if la < lb { (la, lb) } else { (lb, la) };
        self.leader[root] = survivor;

        let gone = &mut self.classes[absorbed.index()];
        let members = std::mem::take(&mut gone.members);
        let constraints = std::mem::take(&mut gone.constraints);
        gone.absorbed_into = Some(survivor);
        gone.data_type = None;

        let keep = &mut self.classes[survivor.index()];
        keep.members = merge_sorted(std::mem::take(&mut keep.members), members, |v| *v);
        keep.constraints =
            merge_sorted(std::mem::take(&mut keep.constraints), constraints, |c| c.seq);
        keep.data_type = None;
        keep.state = if keep.constraints.is_empty() {
            ClassState::Unresolved
        } else {
            ClassState::Constrained
        };

        trace!(%survivor, %absorbed, "merged classes");
        Ok(survivor)
    }

    /// Attaches a constraint to the class of its subject.
    pub fn add_constraint(
        &mut self,
        subject: TypeVarId,
        position: usize,
        kind: ConstraintKind,
    ) -> Result<()> {
        self.check_variable(subject)?;
        let class = self.class_of(subject);
        if self.classes[class.index()].state == ClassState::Finalized {
            return Err(AnalysisError::FinalizedClass(class));
        }

        if let Some(original) = self.direct_evidence(&kind) {
            self.store.set_original(subject, original);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let record = &mut self.classes[class.index()];
        record.constraints.push(Constraint {
            position,
            seq,
            subject,
            kind,
        });
        record.state = ClassState::Constrained;
        Ok(())
    }

    fn direct_evidence(&self, kind: &ConstraintKind) -> Option<DataType> {
        match kind {
            ConstraintKind::Size { width }
            | ConstraintKind::Constant { width }
            | ConstraintKind::Discriminant { width } => Some(DataType::integer(*width)),
            ConstraintKind::Bitwise { width } => Some(DataType::Integer {
                width: *width,
                sign: Signedness::Unsigned,
            }),
            ConstraintKind::Boolean => Some(DataType::Boolean),
            ConstraintKind::PointsTo { target } => {
                Some(DataType::Pointer(self.class_of(*target)))
            }
            _ => None,
        }
    }

    /// Records the resolved type of a live class.
    pub fn set_type(&mut self, class: ClassId, ty: DataType) -> Result<()> {
        let class = self.find(class)?;
        let record = &mut self.classes[class.index()];
        if record.state == ClassState::Finalized {
            return Err(AnalysisError::FinalizedClass(class));
        }
        record.data_type = Some(ty);
        record.state = ClassState::Resolved;
        Ok(())
    }

    /// Freezes a class.
    pub fn finalize(&mut self, class: ClassId) -> Result<()> {
        let class = self.find(class)?;
        self.classes[class.index()].state = ClassState::Finalized;
        Ok(())
    }

    /// Freezes every live class.
    pub fn finalize_all(&mut self) {
        for class in self.classes.iter_mut().filter(|c| c.is_live()) {
            class.state = ClassState::Finalized;
        }
    }

    /// Returns the class record with exactly this id, live or not.
    pub fn class(&self, id: ClassId) -> Option<&EquivalenceClass> {
        self.classes.get(id.index())
    }

    /// Returns the live class currently holding a variable.
    pub fn class_for(&self, var: TypeVarId) -> &EquivalenceClass {
        &self.classes[self.class_of(var).index()]
    }

    /// Resolved type of the class holding a variable.
    pub fn type_of(&self, var: TypeVarId) -> Option<&DataType> {
        self.class_for(var).data_type()
    }

    /// Live classes in id order.
    pub fn live_classes(&self) -> impl Iterator<Item = &EquivalenceClass> {
        self.classes.iter().filter(|c| c.is_live())
    }

    /// Ids of the live classes in id order.
    pub fn live_class_ids(&self) -> Vec<ClassId> {
        self.live_classes().map(|c| c.id).collect()
    }

    pub fn live_class_count(&self) -> usize {
        self.live_classes().count()
    }

    fn check_variable(&self, var: TypeVarId) -> Result<()> {
        if var.index() < self.store.len() {
            Ok(())
        } else {
            Err(AnalysisError::UnknownVariable(var))
        }
    }

    fn check_class(&self, class: ClassId) -> Result<()> {
        if class.index() < self.parent.len() {
            Ok(())
        } else {
            Err(AnalysisError::UnknownClass(class))
        }
    }
}

fn merge_sorted<T, K: Ord>(a: Vec<T>, b: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => key(x) <= key(y),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { a.next() } else { b.next() };
        out.extend(next);
    }
    out
}

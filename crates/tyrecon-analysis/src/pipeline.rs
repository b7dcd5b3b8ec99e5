//! Per-function analysis driver.

use tracing::{debug, info_span};
use tyrecon_core::{MemoryMap, Trace, TraceRecord};

use crate::annotation::Annotation;
use crate::collector::ConstraintCollector;
use crate::config::AnalysisConfig;
use crate::equivalence::TypeArena;
use crate::error::Result;
use crate::listing::Listing;
use crate::resolver::{self, Resolver};
use crate::store::UseSite;

/// Runs type reconstruction for one function.
///
/// The analysis owns its arena; every [`run`](Self::run) starts from an
/// empty one, so an instance can be reused for several traces.
pub struct FunctionAnalysis<'a> {
    name: String,
    memory: &'a MemoryMap,
    config: AnalysisConfig,
    arena: TypeArena,
}

impl<'a> FunctionAnalysis<'a> {
    pub fn new(name: &str, memory: &'a MemoryMap, config: AnalysisConfig) -> Self {
        Self {
            name: name.to_string(),
            memory,
            config,
            arena: TypeArena::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The arena of the last run.
    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    /// Collects, unifies, resolves and emits.
    pub fn run(&mut self, trace: &Trace) -> Result<Listing> {
        let span = info_span!("function", name = %self.name);
        let _enter = span.enter();

        self.arena.reset();
        let facts = ConstraintCollector::new(&mut self.arena, self.memory).collect(trace)?;
        let merged = resolver::unify_fixed_point(&mut self.arena)?;
        debug!(merged, pointees = facts.pointees.len(), "unification done");

        let mut annotations = Resolver::new(&mut self.arena, &self.config).resolve_all()?;
        annotations.extend(self.unassigned());

        let listing = Listing::emit(&self.name, &mut self.arena, annotations);
        debug!(
            classes = listing.classes.len(),
            annotations = listing.annotations.len(),
            "listing emitted"
        );
        Ok(listing)
    }

    /// Validates raw records and runs them.
    pub fn run_records(&mut self, records: Vec<TraceRecord>) -> Result<Listing> {
        let trace = Trace::ingest(records)?;
        self.run(&trace)
    }

    /// Parses a JSON trace and runs it.
    pub fn run_json(&mut self, json: &str) -> Result<Listing> {
        let trace = Trace::from_json(json)?;
        self.run(&trace)
    }

    /// Classes that got no evidence at all and hold only variables the
    /// analysis synthesized; evidence-free named storage is plain `void`.
    fn unassigned(&self) -> Vec<Annotation> {
        self.arena
            .live_classes()
            .filter(|c| resolver::has_no_evidence(&self.arena, c.id()))
            .filter(|c| {
                c.members().iter().all(|m| {
                    self.arena
                        .variable(*m)
                        .is_some_and(|v| !matches!(v.site, UseSite::Storage { .. }))
                })
            })
            .filter_map(|c| {
                Some(Annotation::Unassigned {
                    variable: *c.members().first()?,
                    class: c.id(),
                })
            })
            .collect()
    }
}

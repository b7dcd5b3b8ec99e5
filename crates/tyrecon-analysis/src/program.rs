//! Whole-program driver.
//!
//! Functions are analyzed independently and in parallel, each with its own
//! arena. What they observe about global memory is then merged per location
//! in function order, so the report does not depend on scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use tyrecon_core::{ClassId, MemoryMap, Trace};
use tyrecon_types::{DataType, TypeShape};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::listing::Listing;
use crate::pipeline::FunctionAnalysis;
use crate::store::UseSite;

/// A named function trace.
#[derive(Debug, Clone)]
pub struct FunctionTrace {
    pub name: String,
    pub trace: Trace,
}

impl FunctionTrace {
    pub fn new(name: impl Into<String>, trace: Trace) -> Self {
        Self {
            name: name.into(),
            trace,
        }
    }
}

/// A function whose analysis failed.
#[derive(Debug)]
pub struct FunctionFailure {
    pub function: String,
    pub error: AnalysisError,
}

/// What the program knows about one global location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEntry {
    pub segment: String,
    pub offset: i64,
    pub shape: TypeShape,
    /// Functions that touched the location, in input order.
    pub functions: Vec<String>,
}

impl GlobalEntry {
    /// True if functions disagree about the kind of value stored here.
    pub fn is_conflict(&self) -> bool {
        self.shape.is_conflict()
    }
}

/// Result of analyzing a set of functions.
#[derive(Debug, Default)]
pub struct ProgramReport {
    /// Listings of the functions that succeeded, in input order.
    pub listings: Vec<Listing>,
    /// Functions that failed, in input order.
    pub failures: Vec<FunctionFailure>,
    /// Global locations ordered by segment and offset.
    pub globals: Vec<GlobalEntry>,
}

impl ProgramReport {
    pub fn listing(&self, function: &str) -> Option<&Listing> {
        self.listings.iter().find(|l| l.function == function)
    }

    pub fn global(&self, segment: &str, offset: i64) -> Option<&GlobalEntry> {
        self.globals
            .iter()
            .find(|g| g.segment == segment && g.offset == offset)
    }
}

type GlobalKey = (String, i64);

/// Analyzes every function and merges their view of global memory.
///
/// A failing function is reported and skipped; the others still complete.
pub fn analyze_program(
    memory: &MemoryMap,
    functions: &[FunctionTrace],
    config: &AnalysisConfig,
) -> ProgramReport {
    let results: Vec<Result<Listing, AnalysisError>> = functions
        .par_iter()
        .map(|f| FunctionAnalysis::new(&f.name, memory, config.clone()).run(&f.trace))
        .collect();

    let mut report = ProgramReport::default();
    let mut observed: Vec<(usize, BTreeMap<GlobalKey, TypeShape>)> = Vec::new();
    for (index, (function, result)) in functions.iter().zip(results).enumerate() {
        match result {
            Ok(listing) => {
                observed.push((index, global_facts(&listing)));
                report.listings.push(listing);
            }
            Err(error) => {
                warn!(function = %function.name, %error, "function analysis failed");
                report.failures.push(FunctionFailure {
                    function: function.name.clone(),
                    error,
                });
            }
        }
    }

    let mut globals: BTreeMap<GlobalKey, GlobalEntry> = BTreeMap::new();
    for key in observed.iter().flat_map(|(_, facts)| facts.keys()) {
        globals.entry(key.clone()).or_insert_with(|| GlobalEntry {
            segment: key.0.clone(),
            offset: key.1,
            shape: TypeShape::Unknown,
            functions: Vec::new(),
        });
    }

    globals.par_iter_mut().for_each(|(key, entry)| {
        for (index, facts) in &observed {
            if let Some(shape) = facts.get(key) {
                entry.shape = entry.shape.join(shape);
                entry.functions.push(functions[*index].name.clone());
            }
        }
    });

    report.globals = globals.into_values().collect();
    debug!(
        functions = functions.len(),
        failures = report.failures.len(),
        globals = report.globals.len(),
        "program analysis done"
    );
    report
}

/// Shapes a listing assigns to global locations, keyed by segment and
/// segment-relative offset.
fn global_facts(listing: &Listing) -> BTreeMap<GlobalKey, TypeShape> {
    let mut facts = BTreeMap::new();
    for var in &listing.variables {
        let UseSite::Segment { name } = &var.site else {
            continue;
        };
        let Some(target) = listing
            .class(var.class)
            .and_then(|c| pointer_target(&c.data_type))
        else {
            continue;
        };
        let Some(pointee) = listing.class(target) else {
            continue;
        };
        match &pointee.data_type {
            DataType::Struct(layout) => {
                for field in layout.observed_fields() {
                    facts.insert((name.clone(), field.offset), TypeShape::of(&field.ty));
                }
            }
            DataType::Void => {}
            other => {
                facts.insert((name.clone(), 0), TypeShape::of(other));
            }
        }
    }
    facts
}

fn pointer_target(ty: &DataType) -> Option<ClassId> {
    match ty {
        DataType::Pointer(target) => Some(*target),
        DataType::Union(u) => u.alternatives.iter().find_map(pointer_target),
        _ => None,
    }
}

//! Segment model of the analyzed program's address space.
//!
//! The memory map is built once, before any function is analyzed, and is
//! read-only afterwards. Fixed-address accesses in a trace are attributed to
//! the segment that contains them; addresses outside every segment fall into
//! the pseudo segment [`GLOBALS_SEGMENT`], which starts at address zero.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the pseudo segment holding unmapped addresses.
pub const GLOBALS_SEGMENT: &str = "globals";

/// A named, contiguous address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment name (e.g. `__data`).
    pub name: String,
    /// First address of the segment.
    pub start: u64,
    /// Size in bytes.
    pub size: u64,
}

impl Segment {
    /// Creates a new segment.
    pub fn new(name: impl Into<String>, start: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            start,
            size,
        }
    }

    /// Returns the end address (exclusive).
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    /// Checks if an address lies within this segment.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// Where a fixed address lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'a> {
    /// Name of the containing segment.
    pub segment: &'a str,
    /// Offset from the segment start.
    pub offset: u64,
    /// Segment size, if the address is mapped.
    pub size: Option<u64>,
}

/// The set of segments, sorted by start address.
///
/// Serializes as a plain segment array; deserializing applies the same
/// checks as [`MemoryMap::add_segment`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Segment>", into = "Vec<Segment>")]
pub struct MemoryMap {
    segments: Vec<Segment>,
}

impl TryFrom<Vec<Segment>> for MemoryMap {
    type Error = Error;

    fn try_from(segments: Vec<Segment>) -> Result<Self> {
        Self::with_segments(segments)
    }
}

impl From<MemoryMap> for Vec<Segment> {
    fn from(map: MemoryMap) -> Self {
        map.segments
    }
}

impl MemoryMap {
    /// Creates an empty memory map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a memory map from segments, rejecting empty or overlapping ones.
    pub fn with_segments(segments: impl IntoIterator<Item = Segment>) -> Result<Self> {
        let mut map = Self::new();
        for segment in segments {
            map.add_segment(segment)?;
        }
        Ok(map)
    }

    /// Loads a memory map from a JSON array of segments.
    pub fn from_json(json: &str) -> Result<Self> {
        let segments: Vec<Segment> = serde_json::from_str(json)?;
        Self::with_segments(segments)
    }

    /// Adds a segment, keeping the map sorted.
    pub fn add_segment(&mut self, segment: Segment) -> Result<()> {
        if segment.size == 0 {
            return Err(Error::EmptySegment(segment.name));
        }

        let idx = self.segments.partition_point(|s| s.start < segment.start);
        let (start, end) = (segment.start, segment.end());
        let clashes = |other: &Segment| other.start < end && start < other.end();
        for neighbor in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
            if let Some(other) = self.segments.get(neighbor) {
                if clashes(other) {
                    return Err(Error::OverlappingSegments {
                        first: other.name.clone(),
                        second: segment.name,
                    });
                }
            }
        }

        self.segments.insert(idx, segment);
        Ok(())
    }

    /// Returns the segment containing an address.
    pub fn segment_for(&self, addr: u64) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.start <= addr);
        let candidate = self.segments.get(idx.checked_sub(1)?)?;
        candidate.contains(addr).then_some(candidate)
    }

    /// Resolves an address to a segment-relative location.
    pub fn locate(&self, addr: u64) -> Location<'_> {
        match self.segment_for(addr) {
            Some(segment) => Location {
                segment: &segment.name,
                offset: addr - segment.start,
                size: Some(segment.size),
            },
            None => Location {
                segment: GLOBALS_SEGMENT,
                offset: addr,
                size: None,
            },
        }
    }

    /// Returns all segments in address order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if no segment is mapped.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

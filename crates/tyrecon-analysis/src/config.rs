//! Analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Knobs for one analysis run.
///
/// Target properties come first; the remaining fields tune how aggressively
/// aggregates are recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pointer size in bytes.
    pub pointer_width: u8,
    /// Native word size in bytes, used for counters with no width evidence.
    pub word_width: u8,
    /// Turn runs of same-typed contiguous fields into arrays.
    pub collapse_uniform_arrays: bool,
    /// Minimum number of uniform fields before they become an array.
    pub min_array_elements: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::lp64()
    }
}

impl AnalysisConfig {
    /// 64-bit target.
    pub fn lp64() -> Self {
        Self {
            pointer_width: 8,
            word_width: 8,
            collapse_uniform_arrays: true,
            min_array_elements: 2,
        }
    }

    /// 32-bit target.
    pub fn ilp32() -> Self {
        Self {
            pointer_width: 4,
            word_width: 4,
            ..Self::lp64()
        }
    }

    /// 8-bit microcontroller with 16-bit addresses (8051, AVR).
    pub fn micro8() -> Self {
        Self {
            pointer_width: 2,
            word_width: 1,
            ..Self::lp64()
        }
    }

    /// Looks up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "lp64" | "64" | "x86_64" | "aarch64" => Some(Self::lp64()),
            "ilp32" | "32" | "x86" | "arm" => Some(Self::ilp32()),
            "micro8" | "8" | "i8051" | "avr" => Some(Self::micro8()),
            _ => None,
        }
    }

    /// Loads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the pointer width.
    pub fn with_pointer_width(mut self, width: u8) -> Self {
        self.pointer_width = width;
        self
    }

    /// Sets the word width.
    pub fn with_word_width(mut self, width: u8) -> Self {
        self.word_width = width;
        self
    }

    /// Enables or disables array collapsing.
    pub fn with_array_collapsing(mut self, enabled: bool) -> Self {
        self.collapse_uniform_arrays = enabled;
        self
    }

    /// Sets the array threshold.
    pub fn with_min_array_elements(mut self, n: usize) -> Self {
        self.min_array_elements = n.max(1);
        self
    }
}

//! Patch Module
//!
//! Bundles a voice's birth composition — its generator array, modulator
//! list, and the owning channel's vibrato settings — into a single value a
//! host can snapshot to JSON and restore later (spec.md §6's generator and
//! modulator serialization). Mirrors the teacher's `ProjectManager::to_json`
//! / `from_json` pair in `project.rs`: `serde_json::to_string_pretty` for
//! save, `serde_json::from_str` for load, both folding serde errors into
//! this crate's own error type rather than leaking `serde_json::Error`.

use serde::{Deserialize, Serialize};

use crate::channel::ChannelVibrato;
use crate::error::SynthError;
use crate::generator::Generators;
use crate::modulator::ModulatorSpec;

/// A self-contained snapshot of the parameters needed to reconstruct a
/// voice: its birth generators, its attached modulators, and the channel
/// vibrato it was playing under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePatch {
    pub generators: Generators,
    pub modulators: Vec<ModulatorSpec>,
    pub vibrato: ChannelVibrato,
}

impl VoicePatch {
    /// Serializes this patch to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String, SynthError> {
        serde_json::to_string_pretty(self).map_err(|e| SynthError::Serialization(e.to_string()))
    }

    /// Parses a patch back out of a JSON string produced by [`Self::to_json`].
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        serde_json::from_str(json).map_err(|e| SynthError::Serialization(e.to_string()))
    }
}

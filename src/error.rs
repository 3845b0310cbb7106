//! Error Module
//!
//! The render path is total: every malformed input the control surface can
//! receive is clamped or silently ignored rather than propagated (spec.md
//! §7). [`SynthError`] exists for the narrow handful of construction-time
//! and patch-serialization failures that genuinely cannot be shrugged off.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SynthError {
    #[error("sample rate must be greater than zero, got {0}")]
    InvalidSampleRate(f32),
    #[error("outputs amount must be at least 1, got {0}")]
    InvalidOutputsAmount(usize),
    #[error("patch serialization failed: {0}")]
    Serialization(String),
}

//! Modulation Envelope Module
//!
//! A DAHDSR envelope producing a unitless `0..1` value that drives pitch
//! and filter-cutoff modulation (spec.md §4.7). Shaped like the teacher's
//! `AdsrEnvelope` state machine (delay → attack → hold → decay → sustain,
//! with a separate release branch), but computed from absolute start/now
//! timestamps rather than a per-sample advancing counter, since a voice's
//! envelope must be resumable from any point without replaying history.

use std::sync::OnceLock;

use crate::generator::{gen, GeneratorType, Generators};
use crate::unit_converter::timecents_to_seconds;

/// Resolution of the attack segment's convex-curve lookup table.
pub const MODULATION_ENVELOPE_CONVEX_LENGTH: usize = 1000;

/// Below this release time (in timecents) the release is treated as
/// instantaneous rather than ramped.
const INSTANT_RELEASE_THRESHOLD_TIMECENTS: i32 = -7199;

/// Precomputed absolute phase boundaries and derived quantities for one
/// voice's modulation envelope, valid until the voice's generators change.
#[derive(Debug, Clone, Copy)]
pub struct ModEnvTimes {
    delay_end: f64,
    attack_end: f64,
    hold_end: f64,
    decay_end: f64,
    attack: f64,
    decay: f64,
    sustain_level: f32,
    pub release: f64,
}

impl ModEnvTimes {
    /// Derives phase boundaries from a voice's generator array, the key it
    /// was played at (for hold/decay key-tracking), and the block-relative
    /// start time.
    pub fn compute(generators: &Generators, midi_note: u8, start_time: f64) -> Self {
        let key_offset = 60.0 - midi_note as f32;

        let delay = timecents_to_seconds(gen(generators, GeneratorType::DelayModEnv) as f32) as f64;
        let attack = timecents_to_seconds(gen(generators, GeneratorType::AttackModEnv) as f32) as f64;

        // Key-tracking term is added in timecents before conversion to
        // seconds: timecentsToSeconds(a) * 2^(b/1200) == timecentsToSeconds(a+b).
        let hold_tc = gen(generators, GeneratorType::HoldModEnv) as f32
            + key_offset * gen(generators, GeneratorType::KeyNumToModEnvHold) as f32;
        let hold = timecents_to_seconds(hold_tc) as f64;

        let decay_tc = gen(generators, GeneratorType::DecayModEnv) as f32
            + key_offset * gen(generators, GeneratorType::KeyNumToModEnvDecay) as f32;
        let decay = timecents_to_seconds(decay_tc) as f64;

        let sustain_level = 1.0 - gen(generators, GeneratorType::SustainModEnv) as f32 / 1000.0;
        let release = timecents_to_seconds(gen(generators, GeneratorType::ReleaseModEnv) as f32) as f64;

        let delay_end = start_time + delay;
        let attack_end = delay_end + attack;
        let hold_end = attack_end + hold;
        let decay_end = hold_end + decay;

        Self {
            delay_end,
            attack_end,
            hold_end,
            decay_end,
            attack,
            decay,
            sustain_level,
            release,
        }
    }

    /// Value while the voice has not yet entered release.
    pub fn non_release_value(&self, t: f64) -> f32 {
        if t < self.delay_end {
            0.0
        } else if t < self.attack_end {
            let elapsed = 1.0 - (self.attack_end - t) / self.attack.max(f64::EPSILON);
            convex_attack(elapsed as f32)
        } else if t < self.hold_end {
            1.0
        } else if t < self.decay_end {
            let elapsed = 1.0 - (self.decay_end - t) / self.decay.max(f64::EPSILON);
            1.0 + (self.sustain_level - 1.0) * elapsed as f32
        } else {
            self.sustain_level
        }
    }

    /// Value once the voice is in release, given the captured value and
    /// time at which release began, and the raw release generator amount
    /// (to detect the "effectively instantaneous" case).
    pub fn release_value(&self, release_gen_timecents: i32, release_start_time: f64, release_start_value: f32, t: f64) -> f32 {
        if release_gen_timecents < INSTANT_RELEASE_THRESHOLD_TIMECENTS {
            return release_start_value;
        }
        let elapsed = ((t - release_start_time) / self.release.max(f64::EPSILON)).min(1.0);
        (1.0 - elapsed as f32) * release_start_value
    }
}

fn convex_attack(elapsed: f32) -> f32 {
    let n = MODULATION_ENVELOPE_CONVEX_LENGTH;
    let arg = (elapsed * (n - 1) as f32).clamp(0.0, (n - 1) as f32);
    attack_table()[arg.round() as usize]
}

fn attack_table() -> &'static [f32] {
    static TABLE: OnceLock<Vec<f32>> = OnceLock::new();
    TABLE.get_or_init(|| crate::modulator::concave_convex_tables(MODULATION_ENVELOPE_CONVEX_LENGTH).1)
}

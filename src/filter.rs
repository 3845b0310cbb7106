//! Low-pass Filter Module
//!
//! A single Robert Bristow-Johnson (RBJ) biquad low-pass filter per voice,
//! recomputing its coefficients only when cutoff or resonance actually
//! change from one block to the next (spec.md §4.5, §9 "Biquad coefficient
//! dirtiness"). The state layout mirrors the teacher's `BiquadFilter`
//! (direct-form history kept as two sample pairs, coefficients recomputed
//! lazily), but the coefficient derivation follows the SF2/FluidSynth
//! convention — resonance expressed in centibels with a `+3.01 dB` offset
//! baked into the Q-to-gain mapping — rather than a flat Q factor, and only
//! the low-pass response is implemented; the teacher's other filter types
//! have no SoundFont counterpart.

use std::f32::consts::PI;

use crate::unit_converter::{abs_cents_to_hz, db_to_gain};

/// Cutoff-cents above which the filter is considered fully open and is
/// bypassed entirely (spec.md §4.5). SoundFont reserves this range to mean
/// "filter disabled".
pub const CUTOFF_BYPASS_THRESHOLD_CENTS: f32 = 13490.0;

/// A per-voice biquad low-pass filter.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    sample_rate: f32,

    // Normalized coefficients (b0/a0, b1/a0, b2/a0, a1/a0, a2/a0).
    coeff_a0: f32,
    coeff_a1: f32,
    coeff_a2: f32,
    coeff_a3: f32,
    coeff_a4: f32,

    // Direct-form history.
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,

    // Cached inputs that produced the current coefficients; `None` forces
    // a recompute on the first call.
    last_cutoff_cents: Option<f32>,
    last_resonance_cb: Option<f32>,

    /// Bumped every time coefficients are actually recomputed. Exists for
    /// tests that assert the dirty-check is doing its job; not read by the
    /// render path.
    recompute_count: u32,
}

impl LowPassFilter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            coeff_a0: 1.0,
            coeff_a1: 0.0,
            coeff_a2: 0.0,
            coeff_a3: 0.0,
            coeff_a4: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            last_cutoff_cents: None,
            last_resonance_cb: None,
            recompute_count: 0,
        }
    }

    /// Filters `buffer` in place at the given cutoff (absolute cents) and
    /// resonance (centibels). Above [`CUTOFF_BYPASS_THRESHOLD_CENTS`] the
    /// buffer is left untouched and filter history is not updated, so the
    /// filter re-engages cleanly if the cutoff later drops back down.
    pub fn process(&mut self, cutoff_cents: f32, resonance_cb: f32, buffer: &mut [f32]) {
        if cutoff_cents > CUTOFF_BYPASS_THRESHOLD_CENTS {
            return;
        }

        if self.last_cutoff_cents != Some(cutoff_cents) || self.last_resonance_cb != Some(resonance_cb) {
            self.recompute_coefficients(cutoff_cents, resonance_cb);
            self.last_cutoff_cents = Some(cutoff_cents);
            self.last_resonance_cb = Some(resonance_cb);
        }

        for sample in buffer.iter_mut() {
            let input = *sample;
            let output = self.coeff_a0 * input + self.coeff_a1 * self.x1 + self.coeff_a2 * self.x2
                - self.coeff_a3 * self.y1
                - self.coeff_a4 * self.y2;
            self.x2 = self.x1;
            self.x1 = input;
            self.y2 = self.y1;
            self.y1 = output;
            *sample = output;
        }
    }

    fn recompute_coefficients(&mut self, cutoff_cents: f32, resonance_cb: f32) {
        let cutoff_hz = abs_cents_to_hz(cutoff_cents);
        // SF2/FluidSynth convention: +3.01 dB offset on the Q-derived gain.
        let resonance_gain = db_to_gain(-(resonance_cb / 10.0 - 3.01));

        let omega = 2.0 * PI * cutoff_hz / self.sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * resonance_gain);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        self.coeff_a0 = b0 / a0;
        self.coeff_a1 = b1 / a0;
        self.coeff_a2 = b2 / a0;
        self.coeff_a3 = a1 / a0;
        self.coeff_a4 = a2 / a0;
        self.recompute_count += 1;
    }

    /// Resets filter history to silence, keeping cached coefficients.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    #[cfg(test)]
    pub fn recompute_count(&self) -> u32 {
        self.recompute_count
    }
}

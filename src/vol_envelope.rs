//! Volume Envelope Module
//!
//! Drives per-sample gain across a render block (spec.md §4.8). Unlike the
//! modulation envelope's single `0..1` value per block, this one advances
//! an explicit `{delay, attack, hold, decay, sustain}` state machine one
//! sample at a time so gain can change smoothly within a block — the
//! teacher's `AdsrEnvelope::process_sample` does the same per-sample
//! advance, though here the unit is decibels of attenuation rather than a
//! linear level.

use crate::generator::{gen, GeneratorType, Generators};
use crate::unit_converter::{db_to_gain, timecents_to_seconds};

/// Sentinel "silent" attenuation, in dB, used during the delay phase and as
/// the release ramp's endpoint.
pub const DB_SILENCE: f32 = 100.0;
/// Below this linear gain a voice in release is considered finished.
pub const GAIN_SILENCE: f32 = 0.005;

/// Precomputed absolute phase boundaries and derived dB levels for one
/// voice's volume envelope.
#[derive(Debug, Clone, Copy)]
pub struct VolEnvTimes {
    delay_end: f64,
    attack_end: f64,
    hold_end: f64,
    decay_end: f64,
    attack: f64,
    decay: f64,
    attenuation_db: f32,
    sustain_db: f32,
    pub release: f64,
}

impl VolEnvTimes {
    pub fn compute(generators: &Generators, midi_note: u8, start_time: f64) -> Self {
        let key_offset = 60.0 - midi_note as f32;

        let delay = timecents_to_seconds(gen(generators, GeneratorType::DelayVolEnv) as f32) as f64;
        let attack = timecents_to_seconds(gen(generators, GeneratorType::AttackVolEnv) as f32) as f64;

        let hold_tc = gen(generators, GeneratorType::HoldVolEnv) as f32
            + key_offset * gen(generators, GeneratorType::KeyNumToVolEnvHold) as f32;
        let hold = timecents_to_seconds(hold_tc) as f64;

        let decay_tc = gen(generators, GeneratorType::DecayVolEnv) as f32
            + key_offset * gen(generators, GeneratorType::KeyNumToVolEnvDecay) as f32;
        let decay = timecents_to_seconds(decay_tc) as f64;

        let attenuation_db = gen(generators, GeneratorType::InitialAttenuation) as f32 / 10.0;
        let sustain_db = attenuation_db + gen(generators, GeneratorType::SustainVolEnv) as f32 / 10.0;
        let release = timecents_to_seconds(gen(generators, GeneratorType::ReleaseVolEnv) as f32) as f64;

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
            attenuation_db,
            sustain_db,
            release,
        }
    }

    /// Linear gain at absolute time `t`, not yet in release.
    /// `centibel_offset` (from modulation-LFO-to-volume) is folded in
    /// before the dB-to-gain conversion, uniformly across phases.
    fn non_release_gain(&self, t: f64, centibel_offset: f32) -> f32 {
        if t < self.delay_end {
            0.0
        } else if t < self.attack_end {
            let elapsed = (self.attack_end - t) / self.attack.max(f64::EPSILON);
            let peak_gain = db_to_gain(self.attenuation_db + centibel_offset);
            (1.0 - elapsed as f32) * peak_gain
        } else if t < self.hold_end {
            db_to_gain(self.attenuation_db + centibel_offset)
        } else if t < self.decay_end {
            let elapsed = (self.decay_end - t) / self.decay.max(f64::EPSILON);
            let db = (1.0 - elapsed as f32) * (self.sustain_db - self.attenuation_db) + self.attenuation_db;
            db_to_gain(db + centibel_offset)
        } else {
            db_to_gain(self.sustain_db + centibel_offset)
        }
    }

    /// Captures the dB level to ramp down from when release begins at `t`,
    /// reading whichever phase is active at that instant.
    pub fn capture_release_db(&self, t: f64, centibel_offset: f32) -> f32 {
        if t < self.attack_end {
            if t < self.delay_end {
                return self.attenuation_db;
            }
            let elapsed = (self.attack_end - t) / self.attack.max(f64::EPSILON);
            let peak_gain = db_to_gain(self.attenuation_db + centibel_offset);
            let attack_gain = ((1.0 - elapsed as f32) * peak_gain).max(1e-9);
            -20.0 * attack_gain.log10()
        } else if t < self.hold_end {
            self.attenuation_db
        } else if t < self.decay_end {
            let elapsed = (self.decay_end - t) / self.decay.max(f64::EPSILON);
            (1.0 - elapsed as f32) * (self.sustain_db - self.attenuation_db) + self.attenuation_db
        } else {
            self.sustain_db
        }
    }

    /// Linear gain at absolute time `t` given release began at
    /// `release_start_time` with captured level `release_start_db`.
    fn release_gain(&self, release_start_time: f64, release_start_db: f32, t: f64, centibel_offset: f32) -> f32 {
        let elapsed = ((t - release_start_time) / self.release.max(f64::EPSILON)) as f32;
        let db = (1.0 - elapsed) * release_start_db + elapsed * DB_SILENCE;
        db_to_gain(db + centibel_offset)
    }

    /// Applies this envelope to one block of `output`, multiplying each
    /// sample by the envelope's gain at its instant and advancing `t` by
    /// `sample_time` per frame. Returns `true` iff the voice should be
    /// marked finished (only possible while in release).
    #[allow(clippy::too_many_arguments)]
    pub fn render_block(
        &self,
        output: &mut [f32],
        t: &mut f64,
        sample_time: f64,
        centibel_offset: f32,
        release: Option<(f64, f32)>,
    ) -> bool {
        let mut last_gain = 1.0f32;
        for sample in output.iter_mut() {
            let gain = match release {
                Some((release_start_time, release_start_db)) => {
                    self.release_gain(release_start_time, release_start_db, *t, centibel_offset)
                }
                None => self.non_release_gain(*t, centibel_offset),
            };
            *sample *= gain;
            last_gain = gain;
            *t += sample_time;
        }
        release.is_some() && last_gain <= GAIN_SILENCE
    }
}

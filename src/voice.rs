//! Voice Module
//!
//! One playing note: the sample-playback cursor, the per-voice filter, the
//! generator/modulator composition, and the envelope timelines, all
//! orchestrated once per render block (spec.md §4.10). Grounded in the
//! teacher's `Voice` (its oscillator+envelope+age bundle, synth.rs) and
//! `Sampler`'s `KeyZone`/loop-point bookkeeping (sampler.rs), generalized
//! from a parametric-waveform note into a full SF2 playback chain.

use crate::channel::ChannelVibrato;
use crate::filter::LowPassFilter;
use crate::generator::{gen, GeneratorType, Generators, LoopingMode};
use crate::lfo::triangle;
use crate::mod_envelope::ModEnvTimes;
use crate::modulator::{
    compute_modulated_generators, ModulatorSpec, MIDI_CONTROLLER_TABLE_SIZE, NONCC_CHANNEL_TRANSPOSE,
    NONCC_CHANNEL_TUNING, NONCC_PITCH_WHEEL, NONCC_PITCH_WHEEL_RANGE,
};
use crate::oscillator::{fill_buffer, is_looped};
use crate::panner;
use crate::sample_store::SampleStore;
use crate::unit_converter::{abs_cents_to_hz, timecents_to_seconds};
use crate::vol_envelope::VolEnvTimes;

/// The minimum audible duration of a note before release is allowed to
/// begin, so a rapid note-off doesn't produce an inaudible click.
pub const MINIMUM_NOTE_LENGTH: f64 = 0.03;
/// Above this attenuation (in centibels) a voice is considered inaudible
/// and its block is skipped outright.
const SILENT_ATTENUATION_CENTIBELS: i32 = 2500;

/// Per-voice playback state over a shared [`crate::sample_store::StoredSample`].
#[derive(Debug, Clone)]
pub struct VoiceSample {
    pub sample_id: usize,
    pub root_key: u8,
    pub playback_rate: f64,
    pub cursor: f64,
    pub loop_start: usize,
    pub loop_end: usize,
    pub end: usize,
    pub looping_mode: LoopingMode,
}

/// Mutable output destinations one voice's render mixes additively into.
pub struct OutputBuses<'a> {
    pub dry_l: &'a mut [f32],
    pub dry_r: &'a mut [f32],
    pub reverb_l: &'a mut [f32],
    pub reverb_r: &'a mut [f32],
    pub chorus_l: &'a mut [f32],
    pub chorus_r: &'a mut [f32],
}

/// One playing note, owned by exactly one channel for its entire lifetime
/// from note-on to finished-and-reaped.
#[derive(Debug, Clone)]
pub struct Voice {
    pub sample: VoiceSample,
    filter: LowPassFilter,
    modulators: Vec<ModulatorSpec>,
    generators: Generators,
    modulated_generators: Generators,
    pub midi_note: u8,
    velocity: u8,
    target_key: u8,
    pub start_time: f64,
    pub release_start_time: f64,
    pub is_in_release: bool,
    mod_env_times: ModEnvTimes,
    vol_env_times: VolEnvTimes,
    current_mod_env_value: f32,
    release_start_mod_env: f32,
    release_start_vol_db: f32,
    current_tuning_cents: f32,
    current_tuning_calculated: f32,
    pub finished: bool,
    present_at_birth: bool,
}

impl Voice {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        midi_note: u8,
        velocity: u8,
        target_key: u8,
        root_key: u8,
        start_time: f64,
        sample_id: usize,
        playback_rate: f64,
        loop_start: usize,
        loop_end: usize,
        sample_start: usize,
        sample_end: usize,
        looping_mode: LoopingMode,
        generators: Generators,
        modulators: Vec<ModulatorSpec>,
        controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE],
        sample_rate: f32,
        present_at_birth: bool,
    ) -> Self {
        let modulated_generators =
            compute_modulated_generators(&generators, &modulators, controller_table, velocity, midi_note);
        let mod_env_times = ModEnvTimes::compute(&modulated_generators, midi_note, start_time);
        let vol_env_times = VolEnvTimes::compute(&modulated_generators, midi_note, start_time);

        Self {
            sample: VoiceSample {
                sample_id,
                root_key,
                playback_rate,
                cursor: sample_start as f64,
                loop_start,
                loop_end,
                end: sample_end,
                looping_mode,
            },
            filter: LowPassFilter::new(sample_rate),
            modulators,
            generators,
            modulated_generators,
            midi_note,
            velocity,
            target_key,
            start_time,
            release_start_time: f64::INFINITY,
            is_in_release: false,
            mod_env_times,
            vol_env_times,
            current_mod_env_value: 0.0,
            release_start_mod_env: 0.0,
            release_start_vol_db: 0.0,
            current_tuning_cents: f32::NAN,
            current_tuning_calculated: 1.0,
            finished: false,
            present_at_birth,
        }
    }

    /// The generator composition this voice was built from, before any
    /// modulator contribution.
    pub fn generators(&self) -> &Generators {
        &self.generators
    }

    /// Exposed for debug/observability only; does not affect rendering.
    pub fn is_silent_for_missing_sample(&self) -> bool {
        !self.present_at_birth
    }

    pub fn exclusive_class(&self) -> i32 {
        gen(&self.generators, GeneratorType::ExclusiveClass)
    }

    /// Recomputes `modulatedGenerators` and the envelope timelines derived
    /// from it. Called at voice birth and whenever a channel controller
    /// changes (spec.md §4.11).
    pub fn recompute_modulators(&mut self, controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE]) {
        self.modulated_generators =
            compute_modulated_generators(&self.generators, &self.modulators, controller_table, self.velocity, self.midi_note);
        self.mod_env_times = ModEnvTimes::compute(&self.modulated_generators, self.midi_note, self.start_time);
        self.vol_env_times = VolEnvTimes::compute(&self.modulated_generators, self.midi_note, self.start_time);
    }

    /// Schedules release, enforcing the minimum audible note length.
    pub fn release_at(&mut self, now: f64) {
        self.release_start_time = (self.start_time + MINIMUM_NOTE_LENGTH).max(now);
    }

    /// Forces a fast release (used for exclusive-class choking), overriding
    /// the release generator to ~22 ms and recomputing the envelope
    /// timeline so the change takes effect this block.
    pub fn force_fast_release(&mut self, now: f64, controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE]) {
        const FAST_RELEASE_TIMECENTS: i16 = -7900;
        self.generators[GeneratorType::ReleaseVolEnv.index()] = FAST_RELEASE_TIMECENTS;
        self.recompute_modulators(controller_table);
        if !self.is_in_release {
            self.release_at(now);
        }
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Reacts to a deferred sample finally being dumped into the store:
    /// recomputes this voice's `end` from the generator offsets and fast-
    /// forwards its cursor to where it would be had the sample been present
    /// since birth, matching a no-loop/looped voice's termination and
    /// wraparound rules respectively.
    pub fn adjust_for_dumped_sample(&mut self, sample_id: usize, length: usize, now: f64, sample_rate: f32) {
        if self.sample.sample_id != sample_id {
            return;
        }

        let end_addr_offset = gen(&self.generators, GeneratorType::EndAddrOffset) as i64;
        let end_addr_coarse = gen(&self.generators, GeneratorType::EndAddrsCoarseOffset) as i64;
        let new_end = length as i64 - 1 + end_addr_offset + 32768 * end_addr_coarse;
        self.sample.end = new_end.max(0) as usize;

        self.sample.cursor = self.sample.playback_rate * sample_rate as f64 * (now - self.start_time);

        let looped = is_looped(self.sample.looping_mode, self.is_in_release);
        if !looped {
            if self.sample.cursor >= self.sample.end as f64 {
                self.finished = true;
            }
        } else {
            let loop_len = (self.sample.loop_end as f64 - self.sample.loop_start as f64).max(1.0);
            if self.sample.cursor >= self.sample.loop_end as f64 {
                let past = self.sample.cursor - self.sample.loop_start as f64;
                self.sample.cursor = self.sample.loop_start as f64 + past.rem_euclid(loop_len);
            }
        }
    }

    /// Renders one block, advancing all per-voice state and mixing into
    /// `buses`. No-ops (without advancing state) if this voice's sample is
    /// not yet present in the store.
    #[allow(clippy::too_many_arguments)]
    pub fn render_block(
        &mut self,
        sample_store: &SampleStore,
        controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE],
        channel_vibrato: &ChannelVibrato,
        now: f64,
        sample_time: f64,
        scratch: &mut [f32],
        buses: OutputBuses<'_>,
    ) {
        let view = sample_store.get(self.sample.sample_id);
        if !view.present {
            return;
        }

        if !self.is_in_release && now >= self.release_start_time {
            self.release_start_mod_env = self.current_mod_env_value;
            self.release_start_vol_db = self.vol_env_times.capture_release_db(self.release_start_time, 0.0);
            self.is_in_release = true;
        }

        if gen(&self.modulated_generators, GeneratorType::InitialAttenuation) > SILENT_ATTENUATION_CENTIBELS {
            if self.is_in_release {
                self.finished = true;
            }
            return;
        }

        let mut cent_tuning = self.compute_base_tuning_cents(controller_table);

        let vib_depth = gen(&self.modulated_generators, GeneratorType::VibLfoToPitch);
        if vib_depth != 0 {
            let delay = timecents_to_seconds(gen(&self.modulated_generators, GeneratorType::DelayVibLfo) as f32) as f64;
            let freq = abs_cents_to_hz(gen(&self.modulated_generators, GeneratorType::FreqVibLfo) as f32);
            cent_tuning += vib_depth as f32 * triangle(self.start_time + delay, freq, now);
        }

        let mut cutoff_cents = gen(&self.modulated_generators, GeneratorType::InitialFilterFc) as f32;
        let mut centibel_offset = 0.0f32;

        let mod_pitch_depth = gen(&self.modulated_generators, GeneratorType::ModLfoToPitch);
        let mod_filter_depth = gen(&self.modulated_generators, GeneratorType::ModLfoToFilterFc);
        let mod_volume_depth = gen(&self.modulated_generators, GeneratorType::ModLfoToVolume);
        if mod_pitch_depth != 0 || mod_filter_depth != 0 || mod_volume_depth != 0 {
            let delay = timecents_to_seconds(gen(&self.modulated_generators, GeneratorType::DelayModLfo) as f32) as f64;
            let freq = abs_cents_to_hz(gen(&self.modulated_generators, GeneratorType::FreqModLfo) as f32);
            let lfo_val = triangle(self.start_time + delay, freq, now);
            cent_tuning += mod_pitch_depth as f32 * lfo_val;
            cutoff_cents += mod_filter_depth as f32 * lfo_val;
            centibel_offset += mod_volume_depth as f32 * lfo_val;
        }

        if channel_vibrato.depth_cents != 0.0 {
            let lfo_val = triangle(self.start_time + channel_vibrato.delay_seconds, channel_vibrato.frequency_hz, now);
            cent_tuning += channel_vibrato.depth_cents * lfo_val;
        }

        let mod_env_value = if self.is_in_release {
            let release_gen_tc = gen(&self.modulated_generators, GeneratorType::ReleaseModEnv);
            self.mod_env_times
                .release_value(release_gen_tc, self.release_start_time, self.release_start_mod_env, now)
        } else {
            let v = self.mod_env_times.non_release_value(now);
            self.current_mod_env_value = v;
            v
        };
        cent_tuning += gen(&self.modulated_generators, GeneratorType::ModEnvToPitch) as f32 * mod_env_value;
        cutoff_cents += gen(&self.modulated_generators, GeneratorType::ModEnvToFilterFc) as f32 * mod_env_value;

        let cent_tuning_final = cent_tuning + 100.0 * gen(&self.modulated_generators, GeneratorType::CoarseTune) as f32;
        if self.current_tuning_cents.is_nan() || (cent_tuning_final - self.current_tuning_cents).abs() > f32::EPSILON {
            self.current_tuning_calculated = 2f32.powf(cent_tuning_final / 1200.0);
            self.current_tuning_cents = cent_tuning_final;
        }

        let pan_raw = gen(&self.modulated_generators, GeneratorType::Pan).clamp(-500, 500);
        let pan = (pan_raw as f32 + 500.0) / 1000.0;

        let data = view.data.unwrap_or(&[]);
        let looped = is_looped(self.sample.looping_mode, self.is_in_release);
        let playable_len = self.sample.end.saturating_add(1).min(view.length);
        let finished_by_sample = fill_buffer(
            scratch,
            data,
            playable_len,
            &mut self.sample.cursor,
            self.sample.playback_rate,
            self.current_tuning_calculated as f64,
            self.sample.loop_start,
            self.sample.loop_end,
            looped,
        );
        if finished_by_sample {
            self.finished = true;
        }

        let resonance_cb = gen(&self.modulated_generators, GeneratorType::InitialFilterQ) as f32;
        self.filter.process(cutoff_cents, resonance_cb, scratch);

        let release_info = self.is_in_release.then_some((self.release_start_time, self.release_start_vol_db));
        let mut envelope_t = now;
        let finished_by_silence = self
            .vol_env_times
            .render_block(scratch, &mut envelope_t, sample_time, centibel_offset, release_info);
        if finished_by_silence {
            self.finished = true;
        }

        let reverb_send = gen(&self.modulated_generators, GeneratorType::ReverbEffectsSend) as f32;
        let chorus_send = gen(&self.modulated_generators, GeneratorType::ChorusEffectsSend) as f32;
        panner::mix(
            scratch,
            pan,
            reverb_send,
            chorus_send,
            buses.dry_l,
            buses.dry_r,
            buses.reverb_l,
            buses.reverb_r,
            buses.chorus_l,
            buses.chorus_r,
        );
    }

    fn compute_base_tuning_cents(&self, controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE]) -> f32 {
        let fine_tune = gen(&self.modulated_generators, GeneratorType::FineTune) as f32;

        let pitch_wheel_raw = controller_table[NONCC_PITCH_WHEEL] as f32;
        let pitch_wheel_range_raw = controller_table[NONCC_PITCH_WHEEL_RANGE] as f32;
        let bend_fraction = (pitch_wheel_raw - 8192.0) / 8192.0;
        let pitch_bend_cents = bend_fraction * (pitch_wheel_range_raw / 128.0) * 100.0;

        let channel_tuning = controller_table[NONCC_CHANNEL_TUNING] as f32;
        let channel_transpose = controller_table[NONCC_CHANNEL_TRANSPOSE] as f32;

        let scale_tuning = gen(&self.modulated_generators, GeneratorType::ScaleTuning) as f32;
        let key_scaling = (self.target_key as f32 - self.sample.root_key as f32) * scale_tuning;

        fine_tune + pitch_bend_cents + channel_tuning + channel_transpose + key_scaling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelVibrato;
    use std::sync::Arc;

    fn empty_controllers() -> [u16; MIDI_CONTROLLER_TABLE_SIZE] {
        let mut table = [0u16; MIDI_CONTROLLER_TABLE_SIZE];
        table[NONCC_PITCH_WHEEL] = 8192;
        table[NONCC_PITCH_WHEEL_RANGE] = 256;
        table
    }

    fn make_voice(generators: Generators, sample_len: usize) -> (Voice, SampleStore) {
        let mut store = SampleStore::new(1);
        let data: Arc<[f32]> = (0..sample_len).map(|i| (i as f32) * 0.01).collect::<Vec<_>>().into();
        store.dump(0, data, sample_len);
        let controller_table = empty_controllers();
        let voice = Voice::new(
            60,
            100,
            60,
            60,
            0.0,
            0,
            1.0,
            0,
            0,
            0,
            sample_len,
            LoopingMode::NoLoop,
            generators,
            Vec::new(),
            &controller_table,
            44100.0,
            true,
        );
        (voice, store)
    }

    #[test]
    fn silent_for_missing_sample_does_not_advance_cursor() {
        let generators: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
        let (mut voice, _store) = make_voice(generators, 100);
        let empty_store = SampleStore::new(1); // sample never dumped into this one
        let controller_table = empty_controllers();
        let vibrato = ChannelVibrato::default();
        let mut scratch = vec![0.0f32; 16];
        let mut dry_l = vec![0.0f32; 16];
        let mut dry_r = vec![0.0f32; 16];
        let mut rl = vec![0.0f32; 16];
        let mut rr = vec![0.0f32; 16];
        let mut cl = vec![0.0f32; 16];
        let mut cr = vec![0.0f32; 16];
        let cursor_before = voice.sample.cursor;
        voice.render_block(
            &empty_store,
            &controller_table,
            &vibrato,
            0.01,
            1.0 / 44100.0,
            &mut scratch,
            OutputBuses {
                dry_l: &mut dry_l,
                dry_r: &mut dry_r,
                reverb_l: &mut rl,
                reverb_r: &mut rr,
                chorus_l: &mut cl,
                chorus_r: &mut cr,
            },
        );
        assert_eq!(voice.sample.cursor, cursor_before);
        assert!(dry_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn excessive_attenuation_skips_rendering() {
        let mut generators: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
        generators[GeneratorType::InitialAttenuation.index()] = 3000; // > 2500
        let (mut voice, store) = make_voice(generators, 1000);
        let controller_table = empty_controllers();
        let vibrato = ChannelVibrato::default();
        let mut scratch = vec![0.0f32; 8];
        let mut dry_l = vec![0.0f32; 8];
        let mut dry_r = vec![0.0f32; 8];
        let mut rl = vec![0.0f32; 8];
        let mut rr = vec![0.0f32; 8];
        let mut cl = vec![0.0f32; 8];
        let mut cr = vec![0.0f32; 8];
        voice.render_block(
            &store,
            &controller_table,
            &vibrato,
            0.01,
            1.0 / 44100.0,
            &mut scratch,
            OutputBuses {
                dry_l: &mut dry_l,
                dry_r: &mut dry_r,
                reverb_l: &mut rl,
                reverb_r: &mut rr,
                chorus_l: &mut cl,
                chorus_r: &mut cr,
            },
        );
        assert!(dry_l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn release_at_respects_minimum_note_length() {
        let generators: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
        let (mut voice, _store) = make_voice(generators, 1000);
        voice.release_at(0.001); // note-off almost immediately
        assert!(voice.release_start_time >= MINIMUM_NOTE_LENGTH);
    }

    #[test]
    fn force_fast_release_sets_negative_release_generator() {
        let generators: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
        let (mut voice, _store) = make_voice(generators, 1000);
        let controller_table = empty_controllers();
        voice.force_fast_release(0.5, &controller_table);
        assert_eq!(voice.generators[GeneratorType::ReleaseVolEnv.index()], -7900);
        assert!(voice.is_in_release);
    }
}

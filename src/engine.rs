//! Engine Module
//!
//! The top-level facade (spec.md §4.12): owns the sample store and the
//! ordered list of channels, and fans `renderAudio` out across them into
//! host-supplied output buses. Everything else in this crate is reached
//! only through this surface or through a [`Channel`] obtained from it.
//! Grounded in the teacher's `Synth`, which played the same facade role
//! for its single flat voice pool (synth.rs) — generalized here into a
//! bank of independently addressable channels.

use std::sync::Arc;

use crate::channel::Channel;
use crate::error::SynthError;
use crate::generator::{Generators, LoopingMode};
use crate::modulator::ModulatorSpec;
use crate::sample_store::SampleStore;
use crate::voice::Voice;

/// Top-level synthesizer instance: one sample store, one bank of channels,
/// one configured sample rate and dry output count.
pub struct Engine {
    sample_store: SampleStore,
    channels: Vec<Channel>,
    sample_rate: f32,
    outputs_amount: usize,
    scratch: Vec<f32>,
}

impl Engine {
    /// Builds an engine with `outputs_amount` dry output buses and a sample
    /// store sized for `total_samples` slots, all initially absent. No
    /// channels are created yet; call [`Engine::add_new_channel`].
    pub fn new(outputs_amount: usize, sample_rate: f32, total_samples: usize) -> Result<Self, SynthError> {
        if sample_rate <= 0.0 {
            return Err(SynthError::InvalidSampleRate(sample_rate));
        }
        if outputs_amount == 0 {
            return Err(SynthError::InvalidOutputsAmount(outputs_amount));
        }
        Ok(Self {
            sample_store: SampleStore::new(total_samples),
            channels: Vec::new(),
            sample_rate,
            outputs_amount,
            scratch: Vec::new(),
        })
    }

    pub fn add_new_channel(&mut self) {
        self.channels.push(Channel::new());
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn get_voices_amount(&self, channel: usize) -> usize {
        self.channels.get(channel).map(|c| c.voices_amount()).unwrap_or(0)
    }

    pub fn controller_change(&mut self, channel: usize, cc_index: usize, value14bit: u16, now: f64) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.controller_change(cc_index, value14bit, now);
        }
    }

    pub fn note_off(&mut self, channel: usize, midi_note: u8, now: f64) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.note_off(midi_note, now);
        }
    }

    pub fn mute_channel(&mut self, channel: usize, is_muted: bool) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.set_muted(is_muted);
        }
    }

    pub fn set_channel_vibrato(&mut self, channel: usize, rate_hz: f32, delay_sec: f64, depth_cents: f32) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.set_channel_vibrato(rate_hz, delay_sec, depth_cents);
        }
    }

    pub fn reset_controllers(&mut self, channel: usize) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.reset_controllers();
        }
    }

    /// Builds a new voice and adds it to `channel`. `generators` is a full
    /// 60-slot SF2 generator array; `serialized_modulators` is the flat
    /// `5n`-length array described in spec.md §6.
    #[allow(clippy::too_many_arguments)]
    pub fn create_voice(
        &mut self,
        channel: usize,
        midi_note: u8,
        velocity: u8,
        target_key: u8,
        root_key: u8,
        now: f64,
        sample_id: usize,
        playback_rate: f64,
        loop_start: usize,
        loop_end: usize,
        sample_start: usize,
        sample_end: usize,
        looping_mode_raw: i32,
        generators: Generators,
        serialized_modulators: &[i32],
    ) {
        let Some(ch) = self.channels.get_mut(channel) else {
            return;
        };
        let modulators = ModulatorSpec::from_flat(serialized_modulators);
        let looping_mode = LoopingMode::from_generator(looping_mode_raw);
        let present_at_birth = self.sample_store.get(sample_id).present;

        let voice = Voice::new(
            midi_note,
            velocity,
            target_key,
            root_key,
            now,
            sample_id,
            playback_rate,
            loop_start,
            loop_end,
            sample_start,
            sample_end,
            looping_mode,
            generators,
            modulators,
            ch.controller_table(),
            self.sample_rate,
            present_at_birth,
        );
        ch.add_voice(voice, now);
    }

    /// Delivers a sample payload into the store, then lets every channel
    /// reposition voices that were constructed against this sample before
    /// it arrived.
    pub fn dump_sample(&mut self, data: Arc<[f32]>, length: usize, id: usize, now: f64) {
        self.sample_store.dump(id, data, length);
        for ch in self.channels.iter_mut() {
            ch.adjust_voices(id, length, now, self.sample_rate);
        }
    }

    pub fn clear_dumped_samples(&mut self, total: usize) {
        self.sample_store.clear_dumped_samples(total);
    }

    /// Steals the `amount` voices with the lowest velocity across every
    /// channel, marking them finished so they are reaped on the next
    /// render. Ties are broken by leaving insertion order intact (a stable
    /// sort never reorders equal-velocity voices).
    pub fn kill_voices(&mut self, amount: usize) {
        let mut all: Vec<&mut Voice> = self.channels.iter_mut().flat_map(|c| c.voices_mut()).collect();
        all.sort_by_key(|v| v.velocity());
        for voice in all.into_iter().take(amount) {
            voice.finished = true;
        }
    }

    pub fn stop_all(&mut self, force: bool, now: f64) {
        for ch in self.channels.iter_mut() {
            ch.stop_all(force, now);
        }
    }

    /// Renders `buffer_length` samples starting at `now` into the
    /// host-supplied output buses. `outputs_left[0]`/`[1]` and
    /// `outputs_right[0]`/`[1]` are the reverb and chorus aux sends; dry
    /// buses begin at index 2. Channel `i` is routed to dry bus
    /// `i % outputs_amount + 2`. Buffers are mixed into additively, never
    /// cleared.
    pub fn render_audio(
        &mut self,
        buffer_length: usize,
        now: f64,
        outputs_left: &mut [&mut [f32]],
        outputs_right: &mut [&mut [f32]],
    ) {
        if self.scratch.len() != buffer_length {
            self.scratch = vec![0.0; buffer_length];
        }

        let (reverb_l, rest_l) = outputs_left.split_first_mut().expect("outputs_left must carry reverb+chorus+dry buses");
        let (chorus_l, dry_l) = rest_l.split_first_mut().expect("outputs_left must carry reverb+chorus+dry buses");
        let (reverb_r, rest_r) = outputs_right.split_first_mut().expect("outputs_right must carry reverb+chorus+dry buses");
        let (chorus_r, dry_r) = rest_r.split_first_mut().expect("outputs_right must carry reverb+chorus+dry buses");

        let sample_time = 1.0 / self.sample_rate as f64;

        for (i, channel) in self.channels.iter_mut().enumerate() {
            let dry_idx = i % self.outputs_amount;
            channel.render_audio(
                &self.sample_store,
                now,
                sample_time,
                &mut self.scratch[..buffer_length],
                &mut *dry_l[dry_idx],
                &mut *dry_r[dry_idx],
                &mut *reverb_l,
                &mut *reverb_r,
                &mut *chorus_l,
                &mut *chorus_r,
            );
        }
    }
}

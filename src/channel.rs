//! Channel Module
//!
//! A MIDI channel's voice container: the controller table, hold-pedal
//! sustain bookkeeping, and the channel-wide vibrato LFO (spec.md §4.11).
//! Grounded in the teacher's `Synth` (synth.rs) — which owned a flat `Vec`
//! of voices plus a `HashMap` of active notes — generalized from one
//! global instrument into one of many independently-addressable channels,
//! each with its own controller state.

use serde::{Deserialize, Serialize};

use crate::modulator::{CC_SUSTAIN_PEDAL, MIDI_CONTROLLER_TABLE_SIZE, NONCC_CHANNEL_PRESSURE, NONCC_CHANNEL_TUNING, NONCC_PITCH_WHEEL, NONCC_PITCH_WHEEL_RANGE};
use crate::sample_store::SampleStore;
use crate::voice::{OutputBuses, Voice};

/// A channel's vibrato LFO: rate, onset delay, and pitch depth. Applied
/// uniformly to every voice on the channel, on top of each voice's own
/// per-note vibrato (spec.md §4.10 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelVibrato {
    pub depth_cents: f32,
    pub delay_seconds: f64,
    pub frequency_hz: f32,
}

fn default_controller_table() -> [u16; MIDI_CONTROLLER_TABLE_SIZE] {
    let mut table = [0u16; MIDI_CONTROLLER_TABLE_SIZE];
    table[7] = 100 * 128; // MainVolume
    table[11] = 127 * 128; // Expression
    table[10] = 64 * 128; // Pan
    table[72] = 64 * 128; // ReleaseTime
    table[74] = 64 * 128; // Brightness
    table[NONCC_PITCH_WHEEL] = 8192;
    table[NONCC_PITCH_WHEEL_RANGE] = 2 * 128;
    table[NONCC_CHANNEL_PRESSURE] = 127 * 128;
    table[NONCC_CHANNEL_TUNING] = 0;
    table
}

/// One MIDI channel's voice pool and controller state.
pub struct Channel {
    controller_table: [u16; MIDI_CONTROLLER_TABLE_SIZE],
    reset_array: [u16; MIDI_CONTROLLER_TABLE_SIZE],
    hold_pedal: bool,
    is_muted: bool,
    channel_vibrato: ChannelVibrato,
    voices: Vec<Voice>,
    sustained_voices: Vec<Voice>,
}

impl Channel {
    pub fn new() -> Self {
        let reset_array = default_controller_table();
        Self {
            controller_table: reset_array,
            reset_array,
            hold_pedal: false,
            is_muted: false,
            channel_vibrato: ChannelVibrato::default(),
            voices: Vec::new(),
            sustained_voices: Vec::new(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.is_muted = muted;
    }

    pub fn voices_amount(&self) -> usize {
        self.voices.len() + self.sustained_voices.len()
    }

    pub fn controller_table(&self) -> &[u16; MIDI_CONTROLLER_TABLE_SIZE] {
        &self.controller_table
    }

    /// Every live voice across both pools, for cross-channel operations
    /// like global voice stealing.
    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut().chain(self.sustained_voices.iter_mut())
    }

    pub fn mark_finished_by_ref(&mut self, matches: impl Fn(&Voice) -> bool) {
        for voice in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
            if matches(voice) {
                voice.finished = true;
            }
        }
    }

    /// Writes a new controller value, then reprocesses every live voice's
    /// modulated generators. Sustain pedal (CC 64) is special-cased: going
    /// low releases every currently-sustained voice.
    pub fn controller_change(&mut self, cc_index: usize, value14bit: u16, now: f64) {
        if cc_index == CC_SUSTAIN_PEDAL {
            if value14bit >= 64 {
                self.hold_pedal = true;
            } else {
                self.hold_pedal = false;
                for mut voice in self.sustained_voices.drain(..) {
                    voice.release_at(now);
                    self.voices.push(voice);
                }
            }
        }

        if let Some(slot) = self.controller_table.get_mut(cc_index) {
            *slot = value14bit;
        }

        for voice in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
            voice.recompute_modulators(&self.controller_table);
        }
    }

    /// Releases (or defers release of, under the hold pedal) every live
    /// voice matching `midi_note` that is not already in release.
    pub fn note_off(&mut self, midi_note: u8, now: f64) {
        if self.hold_pedal {
            let mut i = 0;
            while i < self.voices.len() {
                if self.voices[i].midi_note == midi_note && !self.voices[i].is_in_release {
                    let voice = self.voices.remove(i);
                    self.sustained_voices.push(voice);
                } else {
                    i += 1;
                }
            }
        } else {
            for voice in self.voices.iter_mut() {
                if voice.midi_note == midi_note && !voice.is_in_release {
                    voice.release_at(now);
                }
            }
        }
    }

    /// Adds a newly constructed voice, first choking any pre-existing
    /// voice sharing its (nonzero) exclusive class.
    pub fn add_voice(&mut self, mut voice: Voice, now: f64) {
        let exclusive_class = voice.exclusive_class();
        if exclusive_class != 0 {
            let new_start_time = voice.start_time;
            for existing in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
                if existing.exclusive_class() == exclusive_class && existing.start_time != new_start_time {
                    existing.force_fast_release(now, &self.controller_table);
                }
            }
        }
        voice.recompute_modulators(&self.controller_table);
        self.voices.push(voice);
    }

    /// Renders every live voice into the supplied buses, then compacts out
    /// finished voices. No-ops entirely if the channel is muted.
    #[allow(clippy::too_many_arguments)]
    pub fn render_audio(
        &mut self,
        sample_store: &SampleStore,
        now: f64,
        sample_time: f64,
        scratch: &mut [f32],
        dry_l: &mut [f32],
        dry_r: &mut [f32],
        reverb_l: &mut [f32],
        reverb_r: &mut [f32],
        chorus_l: &mut [f32],
        chorus_r: &mut [f32],
    ) {
        if self.is_muted {
            return;
        }

        for voice in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
            voice.render_block(
                sample_store,
                &self.controller_table,
                &self.channel_vibrato,
                now,
                sample_time,
                &mut *scratch,
                OutputBuses {
                    dry_l: &mut *dry_l,
                    dry_r: &mut *dry_r,
                    reverb_l: &mut *reverb_l,
                    reverb_r: &mut *reverb_r,
                    chorus_l: &mut *chorus_l,
                    chorus_r: &mut *chorus_r,
                },
            );
        }

        self.voices.retain(|v| !v.finished);
        self.sustained_voices.retain(|v| !v.finished);
    }

    pub fn reset_controllers(&mut self) {
        self.controller_table = self.reset_array;
    }

    /// Reacts to a deferred sample finally arriving: every voice built
    /// against `sample_id` repositions its cursor as if the sample had
    /// been present since birth.
    pub fn adjust_voices(&mut self, sample_id: usize, length: usize, now: f64, sample_rate: f32) {
        for voice in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
            voice.adjust_for_dumped_sample(sample_id, length, now, sample_rate);
        }
    }

    /// `force`: hard-drop every voice. Otherwise, schedule release for all.
    pub fn stop_all(&mut self, force: bool, now: f64) {
        if force {
            self.voices.clear();
            self.sustained_voices.clear();
            return;
        }
        for voice in self.voices.iter_mut().chain(self.sustained_voices.iter_mut()) {
            if !voice.is_in_release {
                voice.release_at(now);
            }
        }
    }

    pub fn set_channel_vibrato(&mut self, rate_hz: f32, delay_sec: f64, depth_cents: f32) {
        self.channel_vibrato = ChannelVibrato {
            depth_cents,
            delay_seconds: delay_sec,
            frequency_hz: rate_hz,
        };
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

//! sfcore - Realtime SoundFont 2 Synthesis Engine
//!
//! This crate provides a realtime, polyphonic, sample-based (wavetable)
//! synthesis engine compatible with the SoundFont 2 (SF2/SF3) synthesis
//! model. It renders audio for a bank of MIDI channels into host-supplied
//! stereo output buses at a fixed sample rate, driven by a stream of
//! control events (note-on/off, controller change, pitch bend, channel
//! vibrato).
//!
//! # Architecture
//!
//! Components, in dependency order:
//! - **Unit Converter**: timecents/absolute-cents/decibel lookup tables.
//! - **Sample Store**: owns raw sample buffers, keyed by sample ID.
//! - **LFO**: stateless triangle-wave oscillator with delayed start.
//! - **Oscillator**: linear-interpolating wavetable resampler.
//! - **Filter**: biquad low-pass with SF2 cutoff/resonance semantics.
//! - **Modulator**: SF2 modulator evaluation into generator deltas.
//! - **Mod Envelope** / **Vol Envelope**: DAHDSR envelopes.
//! - **Panner**: equal-power stereo pan with reverb/chorus aux sends.
//! - **Voice**: per-note orchestration of the above.
//! - **Channel**: voice container, controller table, sustain, vibrato.
//! - **Engine**: facade fanning render across channels.
//! - **Patch**: JSON snapshot/restore of a voice's construction parameters.
//!
//! # Example
//!
//! ```rust
//! use sfcore::Engine;
//!
//! let mut engine = Engine::new(1, 44100.0, 16).unwrap();
//! engine.add_new_channel();
//! ```

pub mod channel;
pub mod engine;
pub mod error;
pub mod filter;
pub mod generator;
pub mod lfo;
pub mod mod_envelope;
pub mod modulator;
pub mod oscillator;
pub mod panner;
pub mod patch;
pub mod sample_store;
pub mod unit_converter;
pub mod voice;
pub mod vol_envelope;

pub use channel::{Channel, ChannelVibrato};
pub use engine::Engine;
pub use error::SynthError;
pub use generator::{GeneratorType, Generators, LoopingMode};
pub use modulator::ModulatorSpec;
pub use patch::VoicePatch;
pub use sample_store::SampleStore;
pub use voice::Voice;

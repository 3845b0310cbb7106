//! Unit Converter Module
//!
//! Precomputed lookup tables translating SoundFont's logarithmic units
//! (timecents, absolute cents, centibels) into the seconds/Hz/linear-gain
//! values the render path actually consumes. Built once behind a
//! process-wide [`OnceLock`](std::sync::OnceLock) and never mutated
//! afterward, so every rendering agent can share the tables without
//! locking.

use std::sync::OnceLock;

const TIMECENT_MIN: i32 = -15000;
const TIMECENT_MAX: i32 = 15000;
const TIMECENT_TABLE_LEN: usize = 30001;

const ABS_CENT_MIN: i32 = -20000;
const ABS_CENT_MAX: i32 = 16500;
const ABS_CENT_TABLE_LEN: usize = 36501;

/// Decibel domain covered by the gain lookup table, in tenths of a dB
/// (100 points per dB, matching spec.md §4.1).
const DB_MIN_TENTHS: i32 = -16600;
const DB_MAX_TENTHS: i32 = 16000;

struct UnitConverterTables {
    timecent_to_seconds: Vec<f32>,
    abs_cent_to_hz: Vec<f32>,
    db_to_gain: Vec<f32>,
}

impl UnitConverterTables {
    fn build() -> Self {
        let timecent_to_seconds = (0..TIMECENT_TABLE_LEN)
            .map(|i| {
                let tc = TIMECENT_MIN + i as i32;
                2f32.powf(tc as f32 / 1200.0)
            })
            .collect();

        let abs_cent_to_hz = (0..ABS_CENT_TABLE_LEN)
            .map(|i| {
                let c = ABS_CENT_MIN + i as i32;
                440.0 * 2f32.powf((c as f32 - 6900.0) / 1200.0)
            })
            .collect();

        let db_points = ((DB_MAX_TENTHS - DB_MIN_TENTHS) + 1) as usize;
        let db_to_gain = (0..db_points)
            .map(|i| {
                let db_tenths = DB_MIN_TENTHS + i as i32;
                let db = db_tenths as f32 / 10.0;
                10f32.powf(-db / 20.0)
            })
            .collect();

        Self {
            timecent_to_seconds,
            abs_cent_to_hz,
            db_to_gain,
        }
    }
}

fn tables() -> &'static UnitConverterTables {
    static TABLES: OnceLock<UnitConverterTables> = OnceLock::new();
    TABLES.get_or_init(UnitConverterTables::build)
}

/// Converts timecents to seconds: `2^(tc/1200)`. Out-of-domain inputs are
/// clamped to `[-15000, 15000]` before lookup.
pub fn timecents_to_seconds(timecents: f32) -> f32 {
    let clamped = timecents.clamp(TIMECENT_MIN as f32, TIMECENT_MAX as f32);
    let idx = (clamped.round() as i32 - TIMECENT_MIN) as usize;
    tables().timecent_to_seconds[idx.min(TIMECENT_TABLE_LEN - 1)]
}

/// Converts absolute cents to Hz, with A4 (440 Hz) at 6900 cents. Out-of-
/// domain inputs are clamped to `[-20000, 16500]` before lookup.
pub fn abs_cents_to_hz(abs_cents: f32) -> f32 {
    let clamped = abs_cents.clamp(ABS_CENT_MIN as f32, ABS_CENT_MAX as f32);
    let idx = (clamped.round() as i32 - ABS_CENT_MIN) as usize;
    tables().abs_cent_to_hz[idx.min(ABS_CENT_TABLE_LEN - 1)]
}

/// Converts a decibel attenuation (larger = quieter) to a linear gain
/// factor: `10^(-db/20)`. Domain is clamped to `[-1660, 1600]` dB.
pub fn db_to_gain(db: f32) -> f32 {
    let db_tenths = (db * 10.0).round().clamp(DB_MIN_TENTHS as f32, DB_MAX_TENTHS as f32) as i32;
    let idx = (db_tenths - DB_MIN_TENTHS) as usize;
    tables().db_to_gain[idx]
}

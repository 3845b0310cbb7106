//! Modulator Module
//!
//! Evaluates SF2 modulators: each one reads two controller-derived sources,
//! shapes them through a precomputed curve table, multiplies them together,
//! and scales by a transform amount to produce an integer delta that gets
//! added into a voice's working generator array (spec.md §4.6). Grounded in
//! the teacher's `modulation/mod_matrix.rs` routing-matrix concept, but
//! replaces its free-form per-parameter modulation routing with SF2's fixed
//! bit-packed source encoding and curve semantics.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::generator::Generators;

/// Size of the per-channel controller table (spec.md §6).
pub const MIDI_CONTROLLER_TABLE_SIZE: usize = 147;
/// Offset at which non-CC ports begin within the controller table.
pub const NON_CC_INDEX_OFFSET: usize = 128;
/// Resolution of the precomputed curve-transform tables.
pub const MODULATOR_TRANSFORM_PRECOMPUTED_LENGTH: usize = 16384;

// Named controller-table slots used directly by voice/channel orchestration
// (as opposed to generic modulator sources, which address the table by raw
// index). CC numbers index the table directly; NONCC_* add the offset.
pub const CC_PAN: usize = 10;
pub const CC_MAIN_VOLUME: usize = 7;
pub const CC_EXPRESSION: usize = 11;
pub const CC_SUSTAIN_PEDAL: usize = 64;
pub const CC_RELEASE_TIME: usize = 72;
pub const CC_BRIGHTNESS: usize = 74;

pub const NONCC_CHANNEL_PRESSURE: usize = NON_CC_INDEX_OFFSET + 13;
pub const NONCC_PITCH_WHEEL: usize = NON_CC_INDEX_OFFSET + 14;
pub const NONCC_PITCH_WHEEL_RANGE: usize = NON_CC_INDEX_OFFSET + 16;
pub const NONCC_CHANNEL_TUNING: usize = NON_CC_INDEX_OFFSET + 17;
pub const NONCC_CHANNEL_TRANSPOSE: usize = NON_CC_INDEX_OFFSET + 18;

/// A fully decoded SF2 modulator source enum: bits 0..6 index, bit 7
/// `usesCC`, bit 8 direction, bit 9 polarity, bits 10..11 curve type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEnum {
    pub index: u8,
    pub uses_cc: bool,
    pub direction: u8,
    pub polarity: u8,
    pub curve_type: u8,
}

impl SourceEnum {
    pub fn decode(raw: u16) -> Self {
        Self {
            index: (raw & 0x7F) as u8,
            uses_cc: (raw >> 7) & 1 != 0,
            direction: ((raw >> 8) & 1) as u8,
            polarity: ((raw >> 9) & 1) as u8,
            curve_type: ((raw >> 10) & 0b11) as u8,
        }
    }
}

/// One modulator attached to a voice. Immutable for the voice's lifetime.
/// Fields mirror the flat serialization order used on the control surface
/// ({sourceEnum, secSourceEnum, destination, transformAmount,
/// transformType}), and the whole struct round-trips through JSON so a
/// host can snapshot a voice's modulator list alongside its generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulatorSpec {
    pub source_enum: u16,
    pub sec_source_enum: u16,
    pub destination: u16,
    pub transform_amount: i16,
    /// 0 = linear, 2 = absolute value.
    pub transform_type: u8,
}

impl ModulatorSpec {
    /// Decodes a flat `5n`-length integer array (spec.md §6's
    /// "Modulator serialization") into a list of specs.
    pub fn from_flat(flat: &[i32]) -> Vec<ModulatorSpec> {
        flat.chunks_exact(5)
            .map(|c| ModulatorSpec {
                source_enum: c[0] as u16,
                sec_source_enum: c[1] as u16,
                destination: c[2] as u16,
                transform_amount: c[3] as i16,
                transform_type: c[4] as u8,
            })
            .collect()
    }
}

enum Acquired {
    Value(u16),
    Unsupported,
}

fn acquire_raw(
    source: &SourceEnum,
    controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE],
    velocity: u8,
    midi_note: u8,
    is_secondary: bool,
) -> Acquired {
    if source.uses_cc {
        return Acquired::Value(
            controller_table.get(source.index as usize).copied().unwrap_or(0),
        );
    }
    match source.index {
        0 => {
            if is_secondary {
                // noController is the multiplicative identity for the
                // secondary source rather than a skip.
                Acquired::Value(16383)
            } else {
                Acquired::Unsupported
            }
        }
        2 => Acquired::Value((velocity as u16) << 7),
        3 => Acquired::Value((midi_note as u16) << 7),
        // Poly pressure is approximated with note-on velocity.
        10 => Acquired::Value((velocity as u16) << 7),
        127 => Acquired::Unsupported, // linked modulators are unsupported
        other => Acquired::Value(
            controller_table
                .get(NON_CC_INDEX_OFFSET + other as usize)
                .copied()
                .unwrap_or(0),
        ),
    }
}

struct CurveTables {
    // Flattened [curveType(4)][polarity(2)][direction(2)][input(N)].
    transform: Vec<f32>,
}

const CURVE_LINEAR: u8 = 0;
const CURVE_CONCAVE: u8 = 1;
const CURVE_CONVEX: u8 = 2;
const CURVE_SWITCH: u8 = 3;

impl CurveTables {
    fn build() -> Self {
        let n = MODULATOR_TRANSFORM_PRECOMPUTED_LENGTH;
        let (concave, convex) = build_concave_convex(n);

        let mut transform = vec![0f32; 4 * 2 * 2 * n];
        for curve in 0..4u8 {
            for polarity in 0..2u8 {
                for direction in 0..2u8 {
                    for i in 0..n {
                        let v_raw = i as f32 / (n - 1) as f32;
                        let v = if direction == 1 { 1.0 - v_raw } else { v_raw };
                        let value = evaluate_curve(curve, polarity, v, &concave, &convex);
                        transform[flat_index(curve, polarity, direction, i, n)] = value;
                    }
                }
            }
        }
        Self { transform }
    }

    fn lookup(&self, curve: u8, polarity: u8, direction: u8, raw: u16) -> f32 {
        let n = MODULATOR_TRANSFORM_PRECOMPUTED_LENGTH;
        let idx = (raw as usize).min(n - 1);
        self.transform[flat_index(curve, polarity, direction, idx, n)]
    }
}

fn flat_index(curve: u8, polarity: u8, direction: u8, input: usize, n: usize) -> usize {
    (((curve as usize * 2) + polarity as usize) * 2 + direction as usize) * n + input
}

fn evaluate_curve(curve: u8, polarity: u8, v: f32, concave: &[f32], convex: &[f32]) -> f32 {
    let n = concave.len();
    let table_lookup = |table: &[f32], x: f32| -> f32 {
        let idx = (x.clamp(0.0, 1.0) * (n - 1) as f32).round() as usize;
        table[idx.min(n - 1)]
    };

    match curve {
        CURVE_SWITCH => {
            let sw = if v > 0.5 { 1.0 } else { 0.0 };
            if polarity == 0 {
                sw
            } else {
                2.0 * sw - 1.0
            }
        }
        CURVE_CONCAVE | CURVE_CONVEX => {
            let table = if curve == CURVE_CONCAVE { concave } else { convex };
            if polarity == 0 {
                table_lookup(table, v)
            } else {
                let bv = 2.0 * v - 1.0;
                let magnitude = table_lookup(table, bv.abs());
                if bv < 0.0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
        }
        _ => {
            // CURVE_LINEAR and any reserved value fall back to linear.
            if polarity == 0 {
                v
            } else {
                2.0 * v - 1.0
            }
        }
    }
}

/// Builds the FluidSynth-style concave/convex curve tables used by the
/// modulator transform and, with a different length, by the modulation
/// envelope's attack segment.
fn build_concave_convex(n: usize) -> (Vec<f32>, Vec<f32>) {
    let coeff = -200.0 * 2.0 / 960.0;
    let mut convex = vec![0f32; n];
    let mut concave = vec![0f32; n];

    for i in 0..n {
        convex[i] = if i == 0 {
            0.0
        } else {
            let x = coeff * ((i as f64) / (n as f64 - 1.0)).ln() / 10f64.ln();
            (1.0 - x) as f32
        };
    }
    for i in 0..n {
        concave[i] = if i == n - 1 {
            1.0
        } else {
            let ii = n - 1 - i;
            let x = coeff * ((ii as f64) / (n as f64 - 1.0)).ln() / 10f64.ln();
            x as f32
        };
    }
    for v in convex.iter_mut().chain(concave.iter_mut()) {
        *v = v.clamp(0.0, 1.0);
    }
    (concave, convex)
}

fn tables() -> &'static CurveTables {
    static TABLES: OnceLock<CurveTables> = OnceLock::new();
    TABLES.get_or_init(CurveTables::build)
}

/// Precomputes the same concave/convex shape used by the modulator
/// transform tables, at an arbitrary table length — used by the modulation
/// envelope's attack segment (spec.md §4.7), which has its own 1000-point
/// domain distinct from the 16384-point controller-resolution tables here.
pub fn concave_convex_tables(n: usize) -> (Vec<f32>, Vec<f32>) {
    build_concave_convex(n)
}

/// Evaluates one modulator against the current controller/performance
/// state. Returns `None` when the modulator's primary source is
/// unsupported (linked modulator, or `noController` on the primary),
/// meaning the caller should skip it entirely.
pub fn evaluate(
    modulator: &ModulatorSpec,
    controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE],
    velocity: u8,
    midi_note: u8,
) -> Option<i32> {
    let primary = SourceEnum::decode(modulator.source_enum);
    let secondary = SourceEnum::decode(modulator.sec_source_enum);

    let primary_raw = match acquire_raw(&primary, controller_table, velocity, midi_note, false) {
        Acquired::Value(v) => v,
        Acquired::Unsupported => return None,
    };
    let secondary_raw = match acquire_raw(&secondary, controller_table, velocity, midi_note, true) {
        Acquired::Value(v) => v,
        Acquired::Unsupported => return None,
    };

    if modulator.transform_amount == 0 {
        return Some(0);
    }

    let tables = tables();
    let primary_value = tables.lookup(primary.curve_type, primary.polarity, primary.direction, primary_raw);
    let secondary_value = tables.lookup(
        secondary.curve_type,
        secondary.polarity,
        secondary.direction,
        secondary_raw,
    );

    let mut delta = (primary_value * secondary_value * modulator.transform_amount as f32).floor() as i32;
    if modulator.transform_type == 2 {
        delta = delta.abs();
    }
    Some(delta)
}

/// Recomputes a voice's full working generator array from its birth
/// composition plus every attached modulator's contribution (spec.md §4.6,
/// §8's `modulatedGenerators[i] = generators[i] + Σ contribution_m(i)`
/// invariant). Accumulates in 32-bit headroom before clamping back to the
/// `i16` generator range.
pub fn compute_modulated_generators(
    base: &Generators,
    modulators: &[ModulatorSpec],
    controller_table: &[u16; MIDI_CONTROLLER_TABLE_SIZE],
    velocity: u8,
    midi_note: u8,
) -> Generators {
    let mut accum = [0i32; crate::generator::GENERATORS_AMOUNT_TOTAL];
    for (i, slot) in accum.iter_mut().enumerate() {
        *slot = base[i] as i32;
    }

    for modulator in modulators {
        let destination = modulator.destination as usize;
        if destination >= accum.len() {
            continue;
        }
        if let Some(delta) = evaluate(modulator, controller_table, velocity, midi_note) {
            accum[destination] += delta;
        }
    }

    let mut out: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
    for (i, v) in accum.iter().enumerate() {
        out[i] = (*v).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_controllers() -> [u16; MIDI_CONTROLLER_TABLE_SIZE] {
        [0; MIDI_CONTROLLER_TABLE_SIZE]
    }

    #[test]
    fn source_enum_decodes_bit_packed_fields() {
        // index=1, usesCC=1, direction=0, polarity=1, curveType=2 (convex)
        let raw: u16 = 1 | (1 << 7) | (0 << 8) | (1 << 9) | (2 << 10);
        let src = SourceEnum::decode(raw);
        assert_eq!(src.index, 1);
        assert!(src.uses_cc);
        assert_eq!(src.direction, 0);
        assert_eq!(src.polarity, 1);
        assert_eq!(src.curve_type, 2);
    }

    #[test]
    fn transform_amount_zero_short_circuits() {
        let modulator = ModulatorSpec {
            source_enum: 0x0081, // CC index 1
            sec_source_enum: 0,
            destination: 8,
            transform_amount: 0,
            transform_type: 0,
        };
        let mut table = empty_controllers();
        table[1] = 16383;
        assert_eq!(evaluate(&modulator, &table, 100, 60), Some(0));
    }

    #[test]
    fn no_controller_primary_skips_modulator() {
        let modulator = ModulatorSpec {
            source_enum: 0, // non-CC index 0: noController
            sec_source_enum: 0,
            destination: 8,
            transform_amount: 1000,
            transform_type: 0,
        };
        let table = empty_controllers();
        assert_eq!(evaluate(&modulator, &table, 100, 60), None);
    }

    #[test]
    fn unsupported_linked_modulator_skips() {
        let modulator = ModulatorSpec {
            source_enum: 127, // non-CC index 127: linked, unsupported
            sec_source_enum: 0,
            destination: 8,
            transform_amount: 1000,
            transform_type: 0,
        };
        let table = empty_controllers();
        assert_eq!(evaluate(&modulator, &table, 100, 60), None);
    }

    #[test]
    fn velocity_source_uses_note_on_velocity() {
        // non-CC index 2: velocity << 7, linear unipolar, full scale.
        let modulator = ModulatorSpec {
            source_enum: 0x0002,
            sec_source_enum: 0,
            destination: 48,
            transform_amount: 100,
            transform_type: 0,
        };
        let table = empty_controllers();
        let full_velocity = evaluate(&modulator, &table, 127, 60).unwrap();
        let zero_velocity = evaluate(&modulator, &table, 0, 60).unwrap();
        assert!(full_velocity > zero_velocity);
    }

    #[test]
    fn transform_type_absolute_value_flips_sign() {
        let modulator = ModulatorSpec {
            source_enum: 0x0281, // CC 1, bipolar
            sec_source_enum: 0,
            destination: 8,
            transform_amount: -1000,
            transform_type: 2,
        };
        let mut table = empty_controllers();
        table[1] = 16383;
        let delta = evaluate(&modulator, &table, 100, 60).unwrap();
        assert!(delta >= 0, "transformType=2 must yield a non-negative delta, got {delta}");
    }

    #[test]
    fn compute_modulated_generators_matches_sum_invariant() {
        let base: Generators = [0; crate::generator::GENERATORS_AMOUNT_TOTAL];
        let mut table = empty_controllers();
        table[1] = 16383;
        let modulators = vec![ModulatorSpec {
            source_enum: 0x0081,
            sec_source_enum: 0,
            destination: 8,
            transform_amount: 500,
            transform_type: 0,
        }];
        let result = compute_modulated_generators(&base, &modulators, &table, 100, 60);
        let expected_delta = evaluate(&modulators[0], &table, 100, 60).unwrap();
        assert_eq!(result[8] as i32, base[8] as i32 + expected_delta);
    }

    #[test]
    fn concave_and_convex_tables_hit_their_documented_endpoints() {
        let (concave, convex) = build_concave_convex(1000);
        assert!((concave[999] - 1.0).abs() < 1e-6);
        assert_eq!(convex[0], 0.0);
    }
}

//! Wavetable Oscillator Module
//!
//! Fills a mono output buffer by walking a fractional cursor across a
//! borrowed sample buffer, linearly interpolating between the two nearest
//! frames at each step (spec.md §4.4). This replaces the teacher's
//! parametric waveform generator (sine/saw/square/noise) entirely — a
//! synthesis engine built on recorded samples has no use for them — while
//! keeping its "advance a cursor, interpolate, report termination" shape.

/// Whether a voice's sample source is actively looping this block.
///
/// `LoopThenRelease` only loops while the voice has not yet entered its
/// release phase; once released it plays out to the sample's natural end
/// like `NoLoop`.
#[inline]
pub fn is_looped(mode: crate::generator::LoopingMode, voice_in_release: bool) -> bool {
    use crate::generator::LoopingMode::*;
    match mode {
        Loop => true,
        LoopThenRelease => !voice_in_release,
        NoLoop => false,
    }
}

/// Fills `output` with linearly-interpolated samples read from `data`,
/// advancing `cursor` by `playback_rate * tuning_ratio` per output frame.
///
/// `loop_start`/`loop_end` bound the loop region (end-exclusive, matching
/// SF2 loop-point convention); `sample_len` is the stored sample's valid
/// length. Returns `true` iff the sample source terminated during this
/// call — the caller uses this to force the voice into release or finish
/// it outright.
///
/// `cursor` is read and written in place so a voice can resume exactly
/// where the previous block left off.
pub fn fill_buffer(
    output: &mut [f32],
    data: &[f32],
    sample_len: usize,
    cursor: &mut f64,
    playback_rate: f64,
    tuning_ratio: f64,
    loop_start: usize,
    loop_end: usize,
    looped: bool,
) -> bool {
    let step = playback_rate * tuning_ratio;

    if looped {
        let loop_span = (loop_end as f64 - loop_start as f64).max(1.0);
        for out in output.iter_mut() {
            if *cursor >= loop_end as f64 {
                *cursor -= loop_span;
            }
            let floor_idx = cursor.floor() as usize;
            let mut ceil_idx = floor_idx + 1;
            if ceil_idx >= loop_end {
                ceil_idx = loop_start;
            }
            let frac = (*cursor - floor_idx as f64) as f32;
            let a = data.get(floor_idx).copied().unwrap_or(0.0);
            let b = data.get(ceil_idx).copied().unwrap_or(0.0);
            *out = a + (b - a) * frac;
            *cursor += step;
        }
        return false;
    }

    let end = sample_len.saturating_sub(1);

    for (i, out) in output.iter_mut().enumerate() {
        let floor_idx = cursor.floor() as usize;
        let ceil_idx = floor_idx + 1;
        if ceil_idx >= end {
            for remaining in output[i..].iter_mut() {
                *remaining = 0.0;
            }
            return true;
        }
        let frac = (*cursor - floor_idx as f64) as f32;
        let a = data.get(floor_idx).copied().unwrap_or(0.0);
        let b = data.get(ceil_idx).copied().unwrap_or(0.0);
        *out = a + (b - a) * frac;
        *cursor += step;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::LoopingMode;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32).collect()
    }

    #[test]
    fn is_looped_matches_sf2_sample_modes() {
        assert!(!is_looped(LoopingMode::NoLoop, false));
        assert!(is_looped(LoopingMode::Loop, false));
        assert!(is_looped(LoopingMode::Loop, true));
        assert!(is_looped(LoopingMode::LoopThenRelease, false));
        assert!(!is_looped(LoopingMode::LoopThenRelease, true));
    }

    #[test]
    fn non_looped_playback_interpolates_linearly() {
        let data = ramp(10);
        let mut cursor = 0.0f64;
        let mut out = vec![0.0f32; 4];
        let finished = fill_buffer(&mut out, &data, data.len(), &mut cursor, 1.0, 1.0, 0, 0, false);
        assert!(!finished);
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_looped_playback_reports_termination_and_zero_fills_tail() {
        let data = ramp(5);
        let mut cursor = 2.5f64;
        let mut out = vec![9.0f32; 4];
        let finished = fill_buffer(&mut out, &data, data.len(), &mut cursor, 1.0, 1.0, 0, 0, false);
        assert!(finished);
        assert_eq!(out[0], 2.5);
        assert!(out[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn looped_playback_wraps_cursor_back_into_loop_region() {
        let data = ramp(10);
        let mut cursor = 8.0f64;
        let mut out = vec![0.0f32; 6];
        let finished = fill_buffer(&mut out, &data, data.len(), &mut cursor, 1.0, 1.0, 2, 9, true);
        assert!(!finished);
        // cursor starts at 8, steps to 9 which hits loop_end and wraps back
        // by (9-2)=7 to 2 before producing each sample.
        assert!(cursor < 9.0);
    }

    #[test]
    fn looped_playback_never_terminates() {
        let data = ramp(4);
        let mut cursor = 0.0f64;
        let mut out = vec![0.0f32; 1000];
        let finished = fill_buffer(&mut out, &data, data.len(), &mut cursor, 1.0, 1.0, 0, 4, true);
        assert!(!finished);
    }

    #[test]
    fn tuning_ratio_scales_cursor_advance() {
        let data = ramp(100);
        let mut cursor = 0.0f64;
        let mut out = vec![0.0f32; 1];
        fill_buffer(&mut out, &data, data.len(), &mut cursor, 1.0, 2.0, 0, 0, false);
        assert!((cursor - 2.0).abs() < 1e-9);
    }
}

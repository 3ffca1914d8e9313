//! Replay-gain scaling and the fixed sample-format / channel conversion
//! matrix applied by the output stage.
//!
//! The conversion order (format, then channels, then rate) and the
//! replay-gain clamp formula are both taken verbatim from
//! `original_source/src/gap/ap_output_thread.cpp::process` — later
//! invariants (a buffer converted for channels is never re-converted for
//! format) depend on this exact order.

use gap_types::{DataType, GainMode, ReplayGain};

use crate::error::EngineError;

/// `scale = 10^(gain/20)`, clamped by `peak` so that `scale * peak <= 1`.
/// Returns `None` if gain mode is `Off` or no gain is known for it.
pub fn replay_gain_scale(mode: GainMode, rg: &ReplayGain) -> Option<f32> {
    let gain = rg.gain_for(mode)?;
    if gain.is_nan() {
        return None;
    }
    let mut scale = 10f32.powf(gain / 20.0);
    if let Some(peak) = rg.peak_for(mode) {
        if !peak.is_nan() && peak != 0.0 && scale * peak > 1.0 {
            scale = 1.0 / peak;
        }
    }
    Some(scale)
}

pub fn apply_scale_f32(samples: &mut [f32], scale: f32) {
    for s in samples.iter_mut() {
        *s *= scale;
    }
}

pub fn apply_scale_s16(samples: &mut [i16], scale: f32) {
    for s in samples.iter_mut() {
        let scaled = (*s as f32 * scale).round();
        *s = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Convert a buffer of `f32` samples to interleaved S16, saturating-round.
pub fn float_to_s16(input: &[f32]) -> Vec<i16> {
    input
        .iter()
        .map(|s| (s * i16::MAX as f32).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Convert a buffer of `f32` samples to interleaved S32 via left-shift
/// (i.e. treat the float as occupying the high bits of a 32-bit word).
pub fn float_to_s32(input: &[f32]) -> Vec<i32> {
    input
        .iter()
        .map(|s| (s * i32::MAX as f32).round().clamp(i32::MIN as f32, i32::MAX as f32) as i32)
        .collect()
}

/// Narrow packed 24-bit-in-3-bytes little-endian samples to S16.
pub fn s24le3_to_s16(input: &[u8]) -> Result<Vec<i16>, EngineError> {
    if input.len() % 3 != 0 {
        return Err(EngineError::UnsupportedConversion(
            "S24 packed-3 buffer length not a multiple of 3".into(),
        ));
    }
    Ok(input
        .chunks_exact(3)
        .map(|b| {
            let unsigned = u32::from_le_bytes([b[0], b[1], b[2], 0]);
            let signed24 = if unsigned & 0x0080_0000 != 0 {
                (unsigned | 0xFF00_0000) as i32
            } else {
                unsigned as i32
            };
            (signed24 >> 8) as i16
        })
        .collect())
}

/// Left-shift packed 24-bit-in-3-bytes little-endian samples to S32.
pub fn s24le3_to_s32(input: &[u8]) -> Result<Vec<i32>, EngineError> {
    if input.len() % 3 != 0 {
        return Err(EngineError::UnsupportedConversion(
            "S24 packed-3 buffer length not a multiple of 3".into(),
        ));
    }
    Ok(input
        .chunks_exact(3)
        .map(|b| {
            let unsigned = u32::from_le_bytes([b[0], b[1], b[2], 0]);
            let signed24 = if unsigned & 0x0080_0000 != 0 {
                (unsigned | 0xFF00_0000) as i32
            } else {
                unsigned as i32
            };
            signed24 << 8
        })
        .collect())
}

/// Duplicate a mono buffer into interleaved stereo. Any other channel
/// combination is unsupported per the spec's conversion matrix.
pub fn mono_to_stereo(input: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(input.len() * 2);
    for s in input {
        out.push(*s);
        out.push(*s);
    }
    out
}

/// Duplicate each `sample_bytes`-wide mono sample into an adjacent pair,
/// operating on already-format-converted bytes so it works for any device
/// sample width without a per-type duplicate of `mono_to_stereo`.
pub fn duplicate_mono_frames_bytes(input: &[u8], sample_bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2);
    for frame in input.chunks_exact(sample_bytes) {
        out.extend_from_slice(frame);
        out.extend_from_slice(frame);
    }
    out
}

/// Whether `src -> dst` is one of the matrix's supported format
/// conversions (float/S24 packed-3 -> S16/S32). Anything else is fatal.
pub fn format_conversion_supported(src: DataType, src_bits: u16, dst: DataType, dst_bits: u16) -> bool {
    matches!(
        (src, src_bits, dst, dst_bits),
        (DataType::Float, _, DataType::SignedInt, 16)
            | (DataType::Float, _, DataType::SignedInt, 32)
            | (DataType::SignedInt, 24, DataType::SignedInt, 16)
            | (DataType::SignedInt, 24, DataType::SignedInt, 32)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_gain_scale_matches_expected_value() {
        let rg = ReplayGain {
            album_gain: None,
            album_peak: None,
            track_gain: Some(-6.0),
            track_peak: Some(0.9),
        };
        let scale = replay_gain_scale(GainMode::Track, &rg).unwrap();
        assert!((scale - 0.501_187).abs() < 0.001);
        // scale * peak = 0.451 <= 1, so no clamp.
        assert!(scale * 0.9 <= 1.0);
    }

    #[test]
    fn replay_gain_scale_clamps_when_it_would_clip() {
        let rg = ReplayGain {
            album_gain: None,
            album_peak: None,
            track_gain: Some(6.0),
            track_peak: Some(0.9),
        };
        let scale = replay_gain_scale(GainMode::Track, &rg).unwrap();
        assert!((scale * 0.9 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn replay_gain_off_yields_no_scale() {
        let rg = ReplayGain { track_gain: Some(-6.0), ..Default::default() };
        assert_eq!(replay_gain_scale(GainMode::Off, &rg), None);
    }

    #[test]
    fn mono_to_stereo_duplicates_each_sample() {
        let out = mono_to_stereo(&[0.1, 0.2]);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn float_to_s16_saturates_at_full_scale() {
        let out = float_to_s16(&[1.0, -1.0, 0.0]);
        assert_eq!(out, vec![i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn s24le3_to_s16_narrows_correctly() {
        // 0x7FFFFF little-endian (max positive 24-bit) -> top 16 bits.
        let input = [0xFF, 0xFF, 0x7F];
        let out = s24le3_to_s16(&input).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0] > 0);
    }

    #[test]
    fn format_conversion_matrix_matches_spec() {
        assert!(format_conversion_supported(DataType::Float, 32, DataType::SignedInt, 16));
        assert!(format_conversion_supported(DataType::SignedInt, 24, DataType::SignedInt, 32));
        assert!(!format_conversion_supported(DataType::SignedInt, 16, DataType::SignedInt, 32));
    }
}

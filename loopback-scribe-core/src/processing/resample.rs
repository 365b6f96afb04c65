//! Sample-format conversion and rate conversion for capture chunks.
//!
//! Two resampling paths: integer downsampling ratios (within 1%) take a
//! fast zero-phase FIR decimation, everything else goes through a chunked
//! sinc resampler.

use std::f32::consts::PI;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::models::error::CaptureError;

/// Convert interleaved 16-bit PCM to mono f32 in [-1, 1], averaging the
/// channels of each frame when the stream is multi-channel.
pub fn pcm16_to_mono_f32(pcm: &[i16], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return pcm.iter().map(|&s| f32::from(s) / 32_768.0).collect();
    }
    let mut mono = Vec::with_capacity(pcm.len() / channels);
    for frame in pcm.chunks(channels) {
        let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32_768.0).sum();
        mono.push(sum / frame.len() as f32);
    }
    mono
}

/// RMS energy of a sample buffer (0.0 for an empty buffer).
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Resample a mono chunk from `native_rate` to `target_rate`.
///
/// Equal rates pass through unchanged. A ratio that rounds to an integer
/// factor ≥ 2 within 1% takes the decimation path when the chunk is long
/// enough to filter; everything else takes the rational path, which
/// produces `len * target_rate / native_rate` samples (±1).
pub fn resample_chunk(
    samples: &[f32],
    native_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, CaptureError> {
    if native_rate == 0 || target_rate == 0 {
        return Err(CaptureError::ResampleFailed("zero sample rate".into()));
    }
    if native_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = f64::from(native_rate) / f64::from(target_rate);
    let factor = ratio.round();
    if factor >= 2.0 && (ratio - factor).abs() / factor <= 0.01 {
        let factor = factor as usize;
        if samples.len() >= decimation_taps(factor) {
            return Ok(decimate(samples, factor));
        }
    }
    resample_rational(samples, native_rate, target_rate)
}

/// Tap count for the anti-alias filter, odd so the kernel has a center tap.
/// Scales with the factor so the transition band clears the output Nyquist.
fn decimation_taps(factor: usize) -> usize {
    let mut taps = (factor * 16).max(47);
    if taps % 2 == 0 {
        taps += 1;
    }
    taps
}

/// Anti-aliased decimation by an integer factor.
///
/// The symmetric Hamming-windowed sinc kernel is applied centered on each
/// kept sample, so the output carries no group delay. Output length is
/// `ceil(len / factor)`.
fn decimate(samples: &[f32], factor: usize) -> Vec<f32> {
    let taps = decimation_taps(factor);
    let cutoff = (0.45 / factor as f32).min(0.499);
    let coeffs = design_low_pass(cutoff, taps);
    let half = taps / 2;

    let mut out = Vec::with_capacity(samples.len().div_ceil(factor));
    let mut n = 0usize;
    while n < samples.len() {
        let mut acc = 0.0f32;
        for (k, coeff) in coeffs.iter().enumerate() {
            let idx = n + k;
            if idx >= half {
                if let Some(sample) = samples.get(idx - half) {
                    acc += sample * coeff;
                }
            }
        }
        out.push(acc);
        n += factor;
    }
    out
}

/// Normalized Hamming-windowed sinc taps with unity DC gain.
fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mut coeffs = Vec::with_capacity(taps);
    let m = (taps - 1) as f32;

    for n in 0..taps {
        let centered = n as f32 - m / 2.0;
        let x = 2.0 * PI * normalized_cutoff * centered;
        let sinc = if x.abs() < 1e-6 {
            2.0 * normalized_cutoff
        } else {
            (2.0 * normalized_cutoff * x.sin()) / x
        };
        let window = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > f32::EPSILON {
        for coeff in coeffs.iter_mut() {
            *coeff /= sum;
        }
    }
    coeffs
}

/// General rational resampler, chunked through `SincFixedIn`.
///
/// The sinc stage runs behind by its filter delay, so the output is
/// trimmed or edge-padded to the exact rational length to keep span
/// accounting sample-accurate.
fn resample_rational(
    input: &[f32],
    native_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, CaptureError> {
    let ratio = f64::from(target_rate) / f64::from(native_rate);
    let chunk = 256usize;
    let params = SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| CaptureError::ResampleFailed(e.to_string()))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(expected + 8);
    let mut seg = vec![0.0f32; chunk];
    let mut idx = 0usize;
    while idx < input.len() {
        let end = (idx + chunk).min(input.len());
        let len = end - idx;
        seg[..len].copy_from_slice(&input[idx..end]);
        if len < chunk {
            seg[len..].fill(0.0);
        }
        let produced = resampler
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| CaptureError::ResampleFailed(e.to_string()))?;
        out.extend_from_slice(&produced[0]);
        idx = end;
    }

    if out.len() > expected {
        out.truncate(expected);
    } else {
        let pad = out.last().copied().unwrap_or(0.0);
        out.resize(expected, pad);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f32, amplitude: f32, rate: u32, seconds: f32) -> Vec<f32> {
        let total = (rate as f32 * seconds) as usize;
        (0..total)
            .map(|n| amplitude * (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn pcm16_mono_normalizes_full_scale() {
        let out = pcm16_to_mono_f32(&[i16::MIN, 0, 16_384], 1);
        assert_relative_eq!(out[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[2], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn pcm16_stereo_averages_channels() {
        let out = pcm16_to_mono_f32(&[16_384, -16_384, 8_192, 8_192], 2);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[1], 0.25, epsilon = 1e-3);
    }

    #[test]
    fn rms_of_silence_and_full_scale() {
        assert_eq!(rms_level(&[]), 0.0);
        assert_eq!(rms_level(&[0.0; 64]), 0.0);
        assert_relative_eq!(rms_level(&[1.0; 64]), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn equal_rates_pass_through() {
        let input = vec![0.1, -0.2, 0.3];
        let out = resample_chunk(&input, 16_000, 16_000).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn zero_rate_is_an_error() {
        assert!(resample_chunk(&[0.0; 16], 0, 16_000).is_err());
        assert!(resample_chunk(&[0.0; 16], 48_000, 0).is_err());
    }

    #[test]
    fn decimation_length_within_one_sample() {
        for (len, native) in [(4800, 48_000u32), (4801, 48_000), (3200, 32_000)] {
            let input = vec![0.25f32; len];
            let out = resample_chunk(&input, native, 16_000).unwrap();
            let factor = (native / 16_000) as usize;
            let expected = len as f64 / factor as f64;
            assert!(
                (out.len() as f64 - expected).abs() <= 1.0,
                "len {} at {} Hz gave {} samples, expected ~{}",
                len,
                native,
                out.len(),
                expected
            );
        }
    }

    #[test]
    fn near_integer_ratio_takes_decimation_length() {
        // 48,100 / 16,000 = 3.006, which rounds to 3 within 1%.
        let input = vec![0.1f32; 4810];
        let out = resample_chunk(&input, 48_100, 16_000).unwrap();
        assert!((out.len() as i64 - (4810 / 3) as i64).abs() <= 1);
    }

    #[test]
    fn rational_length_within_one_sample() {
        for (len, native) in [(4410, 44_100u32), (2205, 44_100), (2250, 22_500)] {
            let input: Vec<f32> = (0..len).map(|n| (n as f32 * 0.01).sin()).collect();
            let out = resample_chunk(&input, native, 16_000).unwrap();
            let expected = (len as f64 * 16_000.0 / f64::from(native)).round();
            assert!(
                (out.len() as f64 - expected).abs() <= 1.0,
                "len {} at {} Hz gave {} samples, expected ~{}",
                len,
                native,
                out.len(),
                expected
            );
        }
    }

    #[test]
    fn decimated_sine_preserves_rms() {
        // 440 Hz at amplitude 0.1 through 3:1 decimation; RMS must stay
        // within 5% of amplitude/sqrt(2).
        let input = sine(440.0, 0.1, 48_000, 1.0);
        let out = resample_chunk(&input, 48_000, 16_000).unwrap();
        let expected = 0.1 / 2f32.sqrt();
        let rms = rms_level(&out);
        assert!(
            (rms - expected).abs() / expected < 0.05,
            "rms {} not within 5% of {}",
            rms,
            expected
        );
    }

    #[test]
    fn decimation_suppresses_out_of_band_energy() {
        // 12 kHz is above the 8 kHz output Nyquist; after anti-aliased 3:1
        // decimation almost nothing of it should remain.
        let input = sine(12_000.0, 0.5, 48_000, 0.5);
        let out = resample_chunk(&input, 48_000, 16_000).unwrap();
        assert!(
            rms_level(&out) < 0.02,
            "aliased energy too high: {}",
            rms_level(&out)
        );
    }

    #[test]
    fn rational_sine_preserves_rms() {
        let input = sine(440.0, 0.1, 44_100, 1.0);
        let out = resample_chunk(&input, 44_100, 16_000).unwrap();
        let expected = 0.1 / 2f32.sqrt();
        let rms = rms_level(&out);
        assert!(
            (rms - expected).abs() / expected < 0.05,
            "rms {} not within 5% of {}",
            rms,
            expected
        );
    }

    #[test]
    fn tiny_chunk_falls_back_to_rational() {
        // Too short for the decimation filter, but still resampled.
        let input = vec![0.1f32; 8];
        let out = resample_chunk(&input, 48_000, 16_000).unwrap();
        assert!((out.len() as i64 - 3).abs() <= 1);
    }
}

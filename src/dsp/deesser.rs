//! Spectral de-esser.
//!
//! Works on a short-time Fourier transform: only the magnitude of the
//! sibilance band is scaled, phase is left untouched, and the signal is
//! rebuilt by weighted overlap-add. The threshold follows the loudness of the
//! file itself (a high percentile of the band envelope), so quiet and hot
//! takes are treated alike.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

const FFT_SIZE: usize = 2048;
const HOP: usize = 512;

/// Intensity presets, from lightest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeEsserMode {
    Light,
    #[default]
    Medium,
    Strong,
}

impl DeEsserMode {
    /// Maps a 1..=3 level to a preset; out-of-range levels are clamped.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Light,
            2 => Self::Medium,
            _ => Self::Strong,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Light => 1,
            Self::Medium => 2,
            Self::Strong => 3,
        }
    }

    pub fn params(self) -> DeEsserParams {
        let (threshold_db, range_db) = match self {
            Self::Light => (-12.0, 6.0),
            Self::Medium => (-15.0, 12.0),
            Self::Strong => (-18.0, 16.0),
        };
        DeEsserParams {
            threshold_db,
            range_db,
            ..DeEsserParams::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeEsserParams {
    /// Threshold relative to the 92nd percentile of the band envelope.
    pub threshold_db: f32,
    /// Maximum gain reduction.
    pub range_db: f32,
    pub freq_low: f32,
    pub freq_high: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub lookahead: f32,
}

impl Default for DeEsserParams {
    fn default() -> Self {
        Self {
            threshold_db: -15.0,
            range_db: 12.0,
            freq_low: 7000.0,
            freq_high: 14000.0,
            ratio: 3.0,
            attack: 0.0005,
            release: 0.02,
            lookahead: 0.005,
        }
    }
}

/// De-esses one channel. Output has the same length as the input.
pub fn deess_channel(input: &[f32], sample_rate: u32, params: &DeEsserParams) -> Vec<f32> {
    let sr = sample_rate.max(1) as f32;
    let bin_hz = sr / FFT_SIZE as f32;
    let band: Vec<usize> = (0..=FFT_SIZE / 2)
        .filter(|&k| {
            let f = k as f32 * bin_hz;
            f >= params.freq_low && f <= params.freq_high
        })
        .collect();
    if band.is_empty() || input.is_empty() {
        return input.to_vec();
    }

    let (frames, padded_len) = frame_layout(input.len());
    let window = hann(FFT_SIZE);
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(FFT_SIZE);
    let inverse = planner.plan_fft_inverse(FFT_SIZE);

    let mut padded = input.to_vec();
    padded.resize(padded_len, 0.0);

    // Pass 1: spectra and band envelope.
    let mut spectra = Vec::with_capacity(frames);
    let mut envelope = Vec::with_capacity(frames);
    for i in 0..frames {
        let start = i * HOP;
        let mut spectrum: Vec<Complex<f32>> = padded[start..start + FFT_SIZE]
            .iter()
            .zip(&window)
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();
        forward.process(&mut spectrum);
        let band_power: f32 = band.iter().map(|&k| spectrum[k].norm_sqr()).sum();
        let mean_sq = band_power / band.len() as f32;
        envelope.push((mean_sq + 1e-12).sqrt());
        spectra.push(spectrum);
    }

    let targets = frame_gains(&envelope, sample_rate, params);
    let gains = smooth_gains(&targets, sample_rate, params);

    // Pass 2: scale the band (and its mirror) and overlap-add.
    let mut output = vec![0.0f32; padded_len];
    let mut window_sum = vec![0.0f32; padded_len];
    let scale = 1.0 / FFT_SIZE as f32;
    for (i, (mut spectrum, gain)) in spectra.into_iter().zip(gains).enumerate() {
        for &k in &band {
            spectrum[k] *= gain;
            let mirror = FFT_SIZE - k;
            if mirror != k && mirror < FFT_SIZE {
                spectrum[mirror] *= gain;
            }
        }
        inverse.process(&mut spectrum);
        let start = i * HOP;
        for (j, (bin, &w)) in spectrum.iter().zip(&window).enumerate() {
            output[start + j] += bin.re * scale * w;
            window_sum[start + j] += w * w;
        }
    }

    output
        .iter()
        .zip(&window_sum)
        .take(input.len())
        // Under the leading Hann taper (about 20 samples) the window sum is
        // near zero. Those samples keep their windowed value and come out
        // almost silent instead of being divided up into noise.
        .map(|(&y, &ws)| if ws < 1e-6 { y } else { y / ws })
        .collect()
}

/// Frame count and padded length so every input sample is covered by a frame.
fn frame_layout(len: usize) -> (usize, usize) {
    let frames = if len > FFT_SIZE {
        (len - FFT_SIZE) / HOP + 1
    } else {
        1
    };
    let padded = (frames - 1) * HOP + FFT_SIZE;
    if padded < len {
        let padded = len + FFT_SIZE;
        ((padded - FFT_SIZE) / HOP + 1, padded)
    } else {
        (frames, padded)
    }
}

/// Symmetric Hann window.
fn hann(n: usize) -> Vec<f32> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
        })
        .collect()
}

/// Per-frame target gains from the lookahead band envelope.
fn frame_gains(envelope: &[f32], sample_rate: u32, params: &DeEsserParams) -> Vec<f32> {
    let lookahead = ((params.lookahead * sample_rate as f32 / HOP as f32) as usize).max(1);
    let ahead: Vec<f32> = (0..envelope.len())
        .map(|i| {
            let end = (i + lookahead + 1).min(envelope.len());
            envelope[i..end].iter().copied().fold(0.0, f32::max)
        })
        .collect();

    let reference = percentile(&ahead, 92.0) + 1e-12;
    let threshold = reference * 10.0f32.powf(params.threshold_db / 20.0);
    let min_gain = 10.0f32.powf(-params.range_db / 20.0);
    let exponent = 1.0 - 1.0 / params.ratio.max(1.0);

    ahead
        .iter()
        .map(|&level| {
            if level > threshold {
                (threshold / level).powf(exponent).clamp(min_gain, 1.0)
            } else {
                1.0
            }
        })
        .collect()
}

/// One-pole smoothing across frames: fast when reducing, slow when recovering.
fn smooth_gains(gains: &[f32], sample_rate: u32, params: &DeEsserParams) -> Vec<f32> {
    let frames_for = |secs: f32| ((secs * sample_rate as f32 / HOP as f32) as usize).max(1) as f32;
    let attack = 1.0 - (-1.0 / frames_for(params.attack)).exp();
    let release = 1.0 - (-1.0 / frames_for(params.release)).exp();

    let mut smoothed = Vec::with_capacity(gains.len());
    let mut previous = match gains.first() {
        Some(&g) => g,
        None => return smoothed,
    };
    smoothed.push(previous);
    for &g in &gains[1..] {
        let alpha = if g < previous { attack } else { release };
        previous = (1.0 - alpha) * previous + alpha * g;
        smoothed.push(previous);
    }
    smoothed
}

/// Linear-interpolated percentile (`p` in 0..=100).
fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn sine(freq: f32, amplitude: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn presets_match_levels() {
        assert_eq!(DeEsserMode::from_level(1).params().range_db, 6.0);
        assert_eq!(DeEsserMode::from_level(2).params().threshold_db, -15.0);
        assert_eq!(DeEsserMode::from_level(3).params().range_db, 16.0);
        assert_eq!(DeEsserMode::from_level(9), DeEsserMode::Strong);
        assert_eq!(DeEsserMode::from_level(0), DeEsserMode::Light);
        assert_eq!(DeEsserMode::default().level(), 2);
    }

    #[test]
    fn sibilant_tone_is_reduced_within_range() {
        let input = sine(9000.0, 0.5, SR as usize);
        for mode in [DeEsserMode::Light, DeEsserMode::Medium, DeEsserMode::Strong] {
            let params = mode.params();
            let out = deess_channel(&input, SR, &params);
            assert_eq!(out.len(), input.len());
            let mid = 4096..input.len() - 4096;
            let e_in = energy(&input[mid.clone()]);
            let e_out = energy(&out[mid]);
            let floor = 10.0f32.powf(-params.range_db / 10.0);
            assert!(e_out < e_in * 0.95, "{mode:?} should attenuate");
            assert!(e_out >= e_in * floor * 0.9, "{mode:?} exceeded its range");
            assert!(e_out > 0.0);
        }
    }

    #[test]
    fn out_of_band_tone_is_preserved() {
        let input = sine(220.0, 0.5, SR as usize);
        let out = deess_channel(&input, SR, &DeEsserParams::default());
        for (a, b) in input[4096..40000].iter().zip(&out[4096..40000]) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn leading_taper_is_near_silent_then_reconstructed() {
        let input = vec![0.5f32; SR as usize / 2];
        let out = deess_channel(&input, SR, &DeEsserParams::default());
        assert!(out.iter().all(|s| s.is_finite()));
        for (i, s) in out[..16].iter().enumerate() {
            assert!(s.abs() < 1e-5, "sample {i} = {s}");
        }
        for s in &out[HOP..2 * HOP] {
            assert!((s - 0.5).abs() < 1e-3, "{s}");
        }
    }

    #[test]
    fn band_above_nyquist_is_identity() {
        let input = sine(1000.0, 0.3, 4000);
        let out = deess_channel(&input, 8000, &DeEsserParams::default());
        assert_eq!(out, input);
    }

    #[test]
    fn short_input_keeps_length() {
        let input = sine(9000.0, 0.5, 300);
        assert_eq!(deess_channel(&input, SR, &DeEsserParams::default()).len(), 300);
        assert!(deess_channel(&[], SR, &DeEsserParams::default()).is_empty());
    }

    #[test]
    fn frame_layout_covers_input() {
        for len in [1, 2048, 2049, 5000, 44100] {
            let (frames, padded) = frame_layout(len);
            assert!(padded >= len);
            assert!((frames - 1) * HOP + FFT_SIZE >= len);
            assert!((frames - 1) * HOP + FFT_SIZE <= padded);
        }
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 50.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn smoothing_attacks_faster_than_it_releases() {
        let params = DeEsserParams::default();
        let gains = [1.0, 0.25, 0.25, 1.0, 1.0];
        // At 192 kHz the release spans several frames while attack stays at one.
        let smoothed = smooth_gains(&gains, 192_000, &params);
        let drop = 1.0 - smoothed[1];
        let rise = smoothed[3] - smoothed[2];
        assert!(drop > rise);
    }
}

//! Convolution reverb with a synthesized impulse response.
//!
//! The impulse response is exponentially decaying Gaussian noise from a
//! seeded generator, so the same preset always produces the same tail.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use super::biquad::{BUTTERWORTH_Q, Biquad, cascade};

/// Impulse-response and mix settings for one reverb character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbPreset {
    /// Envelope time constant in seconds.
    pub decay: f32,
    pub wet: f32,
    pub predelay: f32,
    pub high_cut: f64,
    pub low_cut: f64,
    pub seed: u64,
    pub min_ir_len: usize,
}

impl ReverbPreset {
    pub const PLATE: Self = Self {
        decay: 0.71,
        wet: 0.25,
        predelay: 0.02,
        high_cut: 7419.0,
        low_cut: 199.0,
        seed: 0,
        min_ir_len: 256,
    };

    pub const ROOM: Self = Self {
        decay: 1.4,
        wet: 0.33,
        predelay: 0.02,
        high_cut: 6800.0,
        low_cut: 199.0,
        seed: 2,
        min_ir_len: 384,
    };

    pub const HALL: Self = Self {
        decay: 2.58,
        wet: 0.45,
        predelay: 0.021,
        high_cut: 6120.0,
        low_cut: 199.0,
        seed: 1,
        min_ir_len: 512,
    };

    /// Preset for reverb mode 1 (small), 2 (medium) or 3 (large).
    pub fn for_mode(mode: u8) -> Self {
        match mode {
            0 | 1 => Self::PLATE,
            2 => Self::ROOM,
            _ => Self::HALL,
        }
    }

    /// Builds the impulse response at `sample_rate`, normalized to unit peak.
    pub fn impulse_response(&self, sample_rate: u32) -> Vec<f32> {
        let sr = sample_rate.max(1) as f32;
        let len = (((self.decay + self.predelay) * sr) as usize).max(self.min_ir_len);
        let predelay = ((self.predelay * sr) as usize).min(len);
        let decay = self.decay.max(1e-3);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut ir = vec![0.0f32; len];
        for (i, slot) in ir[predelay..].iter_mut().enumerate() {
            let t = i as f32 / sr;
            *slot = gaussian(&mut rng) * (-t / decay).exp();
        }

        let shaped = cascade(
            &ir,
            &[
                Biquad::highpass(self.low_cut, BUTTERWORTH_Q, sample_rate),
                Biquad::lowpass(self.high_cut, BUTTERWORTH_Q, sample_rate),
            ],
        );
        let peak = shaped.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak > 0.0 {
            shaped.into_iter().map(|s| s / peak).collect()
        } else {
            shaped
        }
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

/// Applies the reverb to one channel with a precomputed impulse response.
pub fn reverb_channel(input: &[f32], ir: &[f32], wet: f32) -> Vec<f32> {
    let tail = convolve(input, ir);
    input
        .iter()
        .zip(&tail)
        .map(|(&d, &w)| d * (1.0 - wet) + w * wet)
        .collect()
}

/// Linear convolution truncated to `signal.len()`, by FFT overlap-add.
pub fn convolve(signal: &[f32], ir: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n == 0 || ir.is_empty() {
        return vec![0.0; n];
    }
    let fft_size = (ir.len() * 2).next_power_of_two().max(64);
    let block = fft_size - ir.len() + 1;

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(fft_size);
    let inverse = planner.plan_fft_inverse(fft_size);

    let mut ir_spectrum = vec![Complex::new(0.0, 0.0); fft_size];
    for (slot, &h) in ir_spectrum.iter_mut().zip(ir) {
        *slot = Complex::new(h, 0.0);
    }
    forward.process(&mut ir_spectrum);

    let scale = 1.0 / fft_size as f32;
    let mut out = vec![0.0f32; n];
    let mut scratch = vec![Complex::new(0.0, 0.0); fft_size];
    for start in (0..n).step_by(block) {
        let end = (start + block).min(n);
        scratch.fill(Complex::new(0.0, 0.0));
        for (slot, &x) in scratch.iter_mut().zip(&signal[start..end]) {
            *slot = Complex::new(x, 0.0);
        }
        forward.process(&mut scratch);
        for (s, h) in scratch.iter_mut().zip(&ir_spectrum) {
            *s = *s * *h;
        }
        inverse.process(&mut scratch);
        let reach = (n - start).min(fft_size);
        for (o, s) in out[start..start + reach].iter_mut().zip(&scratch) {
            *o += s.re * scale;
        }
    }
    out
}

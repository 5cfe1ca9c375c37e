//! Second-order IIR filter (RBJ cookbook designs).
//!
//! Coefficients and state are kept in `f64`: whole-file offline filtering of
//! low cutoffs at high sample rates loses precision in `f32`.

use std::f64::consts::PI;

/// Butterworth Q for a single second-order section.
pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Transposed direct form II biquad.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::identity()
    }
}

impl Biquad {
    /// Pass-through filter.
    pub fn identity() -> Self {
        Self::from_coefficients(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Builds a filter from raw coefficients, normalizing by `a0`.
    pub fn from_coefficients(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Second-order low-pass. With `BUTTERWORTH_Q` this matches a 2nd-order Butterworth.
    pub fn lowpass(cutoff: f64, q: f64, sample_rate: u32) -> Self {
        let (cw0, alpha) = Self::prewarp(cutoff, q, sample_rate);
        Self::from_coefficients(
            (1.0 - cw0) * 0.5,
            1.0 - cw0,
            (1.0 - cw0) * 0.5,
            1.0 + alpha,
            -2.0 * cw0,
            1.0 - alpha,
        )
    }

    /// Second-order high-pass.
    pub fn highpass(cutoff: f64, q: f64, sample_rate: u32) -> Self {
        let (cw0, alpha) = Self::prewarp(cutoff, q, sample_rate);
        Self::from_coefficients(
            (1.0 + cw0) * 0.5,
            -(1.0 + cw0),
            (1.0 + cw0) * 0.5,
            1.0 + alpha,
            -2.0 * cw0,
            1.0 - alpha,
        )
    }

    /// Peaking EQ: `gain_db` boost or cut centred on `freq`.
    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: u32) -> Self {
        let a = 10.0f64.powf(gain_db / 40.0);
        let (cw0, alpha) = Self::prewarp(freq, q, sample_rate);
        Self::from_coefficients(
            1.0 + alpha * a,
            -2.0 * cw0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cw0,
            1.0 - alpha / a,
        )
    }

    /// cos(w0) and alpha for a cutoff kept inside (0, 0.99 * nyquist).
    fn prewarp(freq: f64, q: f64, sample_rate: u32) -> (f64, f64) {
        let sr = sample_rate.max(1) as f64;
        let freq = clamp_cutoff(freq, sample_rate);
        let w0 = 2.0 * PI * freq / sr;
        (w0.cos(), w0.sin() / (2.0 * q.max(1e-6)))
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let out = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * out + self.z2;
        self.z2 = self.b2 * input - self.a2 * out;
        out
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Filters a whole channel from a zeroed state.
    pub fn filter(mut self, input: &[f32]) -> Vec<f32> {
        self.reset();
        input.iter().map(|&x| self.process(x as f64) as f32).collect()
    }
}

/// Keeps a design frequency strictly inside the usable band.
pub fn clamp_cutoff(freq: f64, sample_rate: u32) -> f64 {
    let nyquist = sample_rate.max(2) as f64 / 2.0;
    freq.clamp(nyquist * 0.001, nyquist * 0.99)
}

/// Runs `input` through each filter in order.
pub fn cascade(input: &[f32], filters: &[Biquad]) -> Vec<f32> {
    let mut filters = filters.to_vec();
    for f in &mut filters {
        f.reset();
    }
    input
        .iter()
        .map(|&x| {
            filters
                .iter_mut()
                .fold(x as f64, |acc, f| f.process(acc)) as f32
        })
        .collect()
}

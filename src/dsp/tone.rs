//! Three-level tone controls, the air lift and the telephone EQ.
//!
//! Tone bands are isolated with second-order Butterworth sections and added
//! back onto the dry signal at +/-2 dB, so level 2 on every band is an exact
//! pass-through.

use super::biquad::{BUTTERWORTH_Q, Biquad, cascade};

/// Low/mid/high levels (1 = cut, 2 = flat, 3 = boost) plus the air flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSettings {
    pub low: u8,
    pub mid: u8,
    pub high: u8,
    pub air: bool,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            low: 2,
            mid: 2,
            high: 2,
            air: false,
        }
    }
}

impl ToneSettings {
    /// Air lift only, every band flat.
    pub fn air_only() -> Self {
        Self {
            air: true,
            ..Self::default()
        }
    }

    /// Levels clamped into 1..=3.
    pub fn clamped(self) -> Self {
        Self {
            low: self.low.clamp(1, 3),
            mid: self.mid.clamp(1, 3),
            high: self.high.clamp(1, 3),
            air: self.air,
        }
    }

    pub fn is_flat(&self) -> bool {
        let s = self.clamped();
        s.low == 2 && s.mid == 2 && s.high == 2 && !s.air
    }
}

fn boost() -> f32 {
    10.0f32.powf(2.0 / 20.0) - 1.0
}

fn cut() -> f32 {
    10.0f32.powf(-2.0 / 20.0) - 1.0
}

fn butter_hp(freq: f64, sample_rate: u32) -> Biquad {
    Biquad::highpass(freq, BUTTERWORTH_Q, sample_rate)
}

fn butter_lp(freq: f64, sample_rate: u32) -> Biquad {
    Biquad::lowpass(freq, BUTTERWORTH_Q, sample_rate)
}

/// `x + band(x) * amount`.
fn add_band(x: &[f32], filters: &[Biquad], amount: f32) -> Vec<f32> {
    let band = cascade(x, filters);
    x.iter().zip(&band).map(|(&d, &b)| d + b * amount).collect()
}

/// Applies tone shaping to one channel.
pub fn shape_channel(input: &[f32], sample_rate: u32, settings: ToneSettings) -> Vec<f32> {
    let s = settings.clamped();
    if s.is_flat() {
        return input.to_vec();
    }
    let sr = sample_rate;
    let mut out = input.to_vec();

    match s.low {
        1 => out = butter_hp(150.0, sr).filter(&out),
        3 => out = add_band(&out, &[butter_lp(200.0, sr), butter_hp(150.0, sr)], boost()),
        _ => {}
    }
    let mids = [butter_hp(400.0, sr), butter_lp(4000.0, sr)];
    match s.mid {
        1 => out = add_band(&out, &mids, cut()),
        3 => out = add_band(&out, &mids, boost()),
        _ => {}
    }
    match s.high {
        1 => out = add_band(&out, &[butter_hp(9000.0, sr)], cut()),
        3 => out = add_band(&out, &[butter_hp(9000.0, sr)], boost()),
        _ => {}
    }
    if s.air {
        out = add_band(&out, &[butter_hp(12500.0, sr)], boost());
    }
    out
}

/// Telephone EQ parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhoneParams {
    pub highpass: f64,
    pub peak_freq: f64,
    pub peak_gain_db: f64,
    pub peak_q: f64,
    pub lowpass: f64,
}

impl Default for PhoneParams {
    fn default() -> Self {
        Self {
            highpass: 900.0,
            peak_freq: 1650.0,
            peak_gain_db: 2.5,
            peak_q: 2.0,
            lowpass: 5500.0,
        }
    }
}

/// Band-limits one channel like a phone line and clamps to [-1, 1].
pub fn phone_channel(input: &[f32], sample_rate: u32, params: &PhoneParams) -> Vec<f32> {
    let chain = [
        butter_hp(params.highpass, sample_rate),
        Biquad::peaking(params.peak_freq, params.peak_q, params.peak_gain_db, sample_rate),
        butter_lp(params.lowpass, sample_rate),
    ];
    cascade(input, &chain)
        .into_iter()
        .map(|s| s.clamp(-1.0, 1.0))
        .collect()
}

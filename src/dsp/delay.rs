//! Tempo-synced ping-pong delay and tempo estimation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::biquad::{BUTTERWORTH_Q, Biquad, cascade};
use crate::audio::AudioBuffer;
use crate::defaults::DEFAULT_BPM;

/// Note length of one repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NoteDivision {
    #[serde(rename = "1/2")]
    Half,
    #[default]
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "1/8")]
    Eighth,
}

impl NoteDivision {
    /// Length in beats.
    pub fn beats(self) -> f32 {
        match self {
            Self::Half => 2.0,
            Self::Quarter => 1.0,
            Self::Eighth => 0.5,
        }
    }

    /// Delay time in seconds at `bpm`.
    pub fn seconds(self, bpm: f32) -> f32 {
        60.0 / bpm.max(1.0) * self.beats()
    }
}

impl fmt::Display for NoteDivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Half => "1/2",
            Self::Quarter => "1/4",
            Self::Eighth => "1/8",
        })
    }
}

impl FromStr for NoteDivision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1/2" | "half" => Ok(Self::Half),
            "1/4" | "quarter" => Ok(Self::Quarter),
            "1/8" | "eighth" => Ok(Self::Eighth),
            other => Err(format!(
                "unknown note division '{other}' (expected 1/2, 1/4 or 1/8)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingPongParams {
    pub feedback: f32,
    pub wet: f32,
    /// Wet low-pass corner.
    pub highcut: f64,
    /// Wet high-pass corner.
    pub lowcut: f64,
    /// One-pole low-pass inside the feedback loop.
    pub feedback_filter_hz: f32,
}

impl Default for PingPongParams {
    fn default() -> Self {
        Self {
            feedback: 0.48,
            wet: 0.22,
            highcut: 4200.0,
            lowcut: 200.0,
            feedback_filter_hz: 2400.0,
        }
    }
}

/// Stereo cross-feedback delay. The dry mono sum feeds the left line, each
/// line's darkened output feeds the other, so repeats bounce L, R, L...
///
/// Output is always stereo; mono input is duplicated for the dry path.
pub fn ping_pong(
    input: &AudioBuffer,
    delay_secs: f32,
    params: &PingPongParams,
) -> AudioBuffer {
    let sr = input.sample_rate();
    let delay = ((delay_secs * sr as f32) as usize).max(1);
    let mono = input.mono_mix();
    let (dry_l, dry_r) = input.stereo_pair();

    let fc = params.feedback_filter_hz.min(sr as f32 / 2.5);
    let lp_coeff = 1.0 - (-2.0 * std::f32::consts::PI * fc / sr.max(1) as f32).exp();

    let mut line_l = vec![0.0f32; delay];
    let mut line_r = vec![0.0f32; delay];
    let mut state_l = 0.0f32;
    let mut state_r = 0.0f32;
    let mut wet_l = Vec::with_capacity(mono.len());
    let mut wet_r = Vec::with_capacity(mono.len());

    for (i, &x) in mono.iter().enumerate() {
        let idx = i % delay;
        let out_l = line_l[idx];
        let out_r = line_r[idx];
        state_l += (out_l - state_l) * lp_coeff;
        state_r += (out_r - state_r) * lp_coeff;
        line_l[idx] = x + state_r * params.feedback;
        line_r[idx] = state_l * params.feedback;
        wet_l.push(out_l);
        wet_r.push(out_r);
    }

    let band = [
        Biquad::lowpass(params.highcut, BUTTERWORTH_Q, sr),
        Biquad::highpass(params.lowcut, BUTTERWORTH_Q, sr),
    ];
    let wet_l = cascade(&wet_l, &band);
    let wet_r = cascade(&wet_r, &band);

    let mix = |dry: &[f32], wet: &[f32]| -> Vec<f32> {
        dry.iter()
            .zip(wet)
            .map(|(&d, &w)| d * (1.0 - params.wet) + w * params.wet)
            .collect()
    };
    AudioBuffer::stereo(mix(&dry_l, &wet_l), mix(&dry_r, &wet_r), sr)
}

const ONSET_FRAME: usize = 1024;
const ONSET_HOP: usize = 512;
const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;

/// Estimates tempo from the autocorrelation of an onset-strength envelope.
///
/// Returns `DEFAULT_BPM` when the signal carries no usable periodicity or the
/// estimate falls outside 60..200 BPM.
pub fn detect_bpm(input: &AudioBuffer) -> f32 {
    let sr = input.sample_rate() as f32;
    if sr <= 0.0 {
        return DEFAULT_BPM;
    }
    let onset = onset_envelope(&input.mono_mix());
    let frame_rate = sr / ONSET_HOP as f32;
    let min_lag = (60.0 * frame_rate / MAX_BPM).ceil() as usize;
    let max_lag = (60.0 * frame_rate / MIN_BPM).floor() as usize;
    if min_lag == 0 || onset.len() <= max_lag * 2 {
        return DEFAULT_BPM;
    }

    let mean = onset.iter().sum::<f32>() / onset.len() as f32;
    let centred: Vec<f32> = onset.iter().map(|v| v - mean).collect();
    let zero_lag: f32 = centred.iter().map(|v| v * v).sum();
    if zero_lag <= f32::EPSILON {
        return DEFAULT_BPM;
    }

    let mut best = (0usize, 0.0f32);
    for lag in min_lag..=max_lag {
        let score: f32 = centred[lag..]
            .iter()
            .zip(&centred)
            .map(|(a, b)| a * b)
            .sum::<f32>()
            / (centred.len() - lag) as f32;
        if score > best.1 {
            best = (lag, score);
        }
    }
    if best.0 == 0 {
        return DEFAULT_BPM;
    }
    let bpm = 60.0 * frame_rate / best.0 as f32;
    if bpm > MIN_BPM && bpm < MAX_BPM {
        bpm
    } else {
        DEFAULT_BPM
    }
}

/// Half-wave rectified frame-energy difference.
fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    if samples.len() < ONSET_FRAME {
        return Vec::new();
    }
    let energies: Vec<f32> = (0..=(samples.len() - ONSET_FRAME) / ONSET_HOP)
        .map(|i| {
            let start = i * ONSET_HOP;
            samples[start..start + ONSET_FRAME].iter().map(|s| s * s).sum()
        })
        .collect();
    energies
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect()
}

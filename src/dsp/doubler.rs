//! Stereo doublers.

use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

/// Which doubling algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoublerStyle {
    /// Each side picks up a delayed copy of the other.
    #[default]
    Cross,
    /// Two slightly detuned voices with short Haas delays.
    Pitch,
}

impl std::str::FromStr for DoublerStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cross" => Ok(Self::Cross),
            "pitch" => Ok(Self::Pitch),
            other => Err(format!(
                "unknown doubler style '{other}' (expected cross or pitch)"
            )),
        }
    }
}

const CROSS_DELAY_MS: f32 = 20.0;
const CROSS_WET: f32 = 0.4;

const PITCH_CENTS: f32 = 8.0;
const PITCH_DELAYS_MS: (f32, f32) = (12.0, 18.0);
const PITCH_WET: f32 = 0.35;

/// Widens `input` to stereo. Output is clamped to [-1, 1].
pub fn double(input: &AudioBuffer, style: DoublerStyle) -> AudioBuffer {
    match style {
        DoublerStyle::Cross => cross(input, CROSS_DELAY_MS, CROSS_WET),
        DoublerStyle::Pitch => pitch(input),
    }
}

/// `L += wet * R[n - d]`, `R += wet * L[n - d]`.
pub fn cross(input: &AudioBuffer, delay_ms: f32, wet: f32) -> AudioBuffer {
    let sr = input.sample_rate();
    let (left, right) = input.stereo_pair();
    let frames = left.len();
    let delay = ((delay_ms * sr as f32 / 1000.0) as usize).min(frames.saturating_sub(1));
    if delay == 0 {
        let mut out = AudioBuffer::stereo(left, right, sr);
        out.clamp();
        return out;
    }
    let mix = |own: &[f32], other: &[f32]| -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let delayed = if i >= delay { other[i - delay] } else { 0.0 };
                (own[i] + wet * delayed).clamp(-1.0, 1.0)
            })
            .collect()
    };
    AudioBuffer::stereo(mix(&left, &right), mix(&right, &left), sr)
}

fn pitch(input: &AudioBuffer) -> AudioBuffer {
    let sr = input.sample_rate() as f32;
    let (left, right) = input.stereo_pair();
    let mono = input.mono_mix();
    let up = detune(&mono, 2.0f32.powf(PITCH_CENTS / 1200.0));
    let down = detune(&mono, 2.0f32.powf(-PITCH_CENTS / 1200.0));
    let delay_l = (PITCH_DELAYS_MS.0 * sr / 1000.0) as usize;
    let delay_r = (PITCH_DELAYS_MS.1 * sr / 1000.0) as usize;

    let voice = |dry: &[f32], wet: &[f32], delay: usize| -> Vec<f32> {
        dry.iter()
            .enumerate()
            .map(|(i, &d)| {
                let w = if i >= delay { wet[i - delay] } else { 0.0 };
                d + PITCH_WET * w
            })
            .collect()
    };
    let mut out = AudioBuffer::stereo(
        voice(&left, &up, delay_l),
        voice(&right, &down, delay_r),
        input.sample_rate(),
    );

    let target = input.peak();
    let peak = out.peak();
    if peak > target && peak > 0.0 {
        out.apply_gain(target / peak);
    } else {
        out.clamp();
    }
    out
}

/// Linear-interpolation resample that plays `input` at `ratio` speed,
/// keeping the original length (zero after the source runs out).
fn detune(input: &[f32], ratio: f32) -> Vec<f32> {
    (0..input.len())
        .map(|i| {
            let pos = i as f32 * ratio;
            let idx = pos as usize;
            let frac = pos - idx as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(&a), Some(&b)) => a + (b - a) * frac,
                (Some(&a), None) => a * (1.0 - frac),
                _ => 0.0,
            }
        })
        .collect()
}

//! In-process signal processing.
//!
//! Every primitive is a pure function from an [`AudioBuffer`] to a new one.
//! Sample rate is always preserved; only the delay and the doubler change
//! the channel count (to stereo). Nothing here draws unseeded randomness, so
//! identical input and parameters give identical output.

pub mod biquad;
pub mod deesser;
pub mod delay;
pub mod doubler;
pub mod gate;
pub mod reverb;
pub mod tone;

pub use deesser::{DeEsserMode, DeEsserParams};
pub use delay::{NoteDivision, PingPongParams, detect_bpm};
pub use doubler::DoublerStyle;
pub use gate::GateParams;
pub use reverb::ReverbPreset;
pub use tone::{PhoneParams, ToneSettings};

use crate::audio::AudioBuffer;

/// Lookahead noise gate, channels processed independently.
pub fn noise_gate(input: &AudioBuffer, params: &GateParams) -> AudioBuffer {
    let sr = input.sample_rate();
    input.map_channels(|c| gate::gate_channel(c, sr, params))
}

/// Spectral de-esser at one of the preset intensities.
pub fn deess(input: &AudioBuffer, mode: DeEsserMode) -> AudioBuffer {
    let sr = input.sample_rate();
    let params = mode.params();
    input.map_channels(|c| deesser::deess_channel(c, sr, &params))
}

/// Tone shaping (and/or air).
pub fn tone(input: &AudioBuffer, settings: ToneSettings) -> AudioBuffer {
    let sr = input.sample_rate();
    input.map_channels(|c| tone::shape_channel(c, sr, settings))
}

/// Telephone band-pass EQ.
pub fn phone(input: &AudioBuffer) -> AudioBuffer {
    let sr = input.sample_rate();
    let params = PhoneParams::default();
    input.map_channels(|c| tone::phone_channel(c, sr, &params))
}

/// Ping-pong delay at `bpm` and `division`. Returns stereo.
pub fn ping_pong_delay(input: &AudioBuffer, bpm: f32, division: NoteDivision) -> AudioBuffer {
    delay::ping_pong(input, division.seconds(bpm), &PingPongParams::default())
}

/// Convolution reverb, one impulse response shared by all channels.
pub fn convolution_reverb(input: &AudioBuffer, preset: &ReverbPreset) -> AudioBuffer {
    let ir = preset.impulse_response(input.sample_rate());
    let mut out = input.map_channels(|c| reverb::reverb_channel(c, &ir, preset.wet));
    out.clamp();
    out
}

/// Stereo doubler. Returns stereo clamped to [-1, 1].
pub fn double(input: &AudioBuffer, style: DoublerStyle) -> AudioBuffer {
    doubler::double(input, style)
}

/// Multiplies by `gain_db` and clamps.
pub fn gain(input: &AudioBuffer, gain_db: f32) -> AudioBuffer {
    let mut out = input.clone();
    out.apply_gain(crate::audio::db_to_gain(gain_db));
    out
}

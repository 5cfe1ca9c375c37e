//! WAV decoding to [`AudioBuffer`] and normalized 16-bit encoding.
//!
//! Decoding goes through `hound` first. Some writers emit files hound refuses
//! (odd extensible sub-formats, streaming data sizes, trailing garbage), so a
//! tolerant RIFF walker that only trusts the declared sample width is tried
//! before giving up.
//!
//! Encoding always produces 16-bit signed PCM: the plugin host only accepts
//! that container.

use crate::audio::buffer::AudioBuffer;
use crate::error::{RenderError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Full-scale value used when converting to and from 16-bit samples.
const I16_SCALE: f32 = 32768.0;

/// Decodes a WAV file into a floating-point buffer.
///
/// Tries `hound`, then the fallback RIFF parser. When both fail the primary
/// decoder's message is reported.
pub fn decode(path: &Path) -> Result<AudioBuffer> {
    let decode_error = |message: String| RenderError::Decode {
        path: path.display().to_string(),
        message,
    };

    let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
    let primary = match decode_reader(BufReader::new(file)) {
        Ok(buffer) => return Ok(buffer),
        Err(e) => e,
    };

    tracing::debug!(
        "hound rejected {}: {primary}; trying fallback parser",
        path.display()
    );
    let bytes = std::fs::read(path).map_err(|e| decode_error(e.to_string()))?;
    parse_riff(&bytes).map_err(|fallback| {
        tracing::debug!("fallback parser rejected {}: {fallback}", path.display());
        decode_error(primary)
    })
}

/// Decodes WAV data from any reader with `hound`.
pub fn decode_reader<R: Read>(reader: R) -> std::result::Result<AudioBuffer, String> {
    let wav_reader = hound::WavReader::new(reader).map_err(|e| e.to_string())?;
    let spec = wav_reader.spec();
    if spec.channels == 0 {
        return Err("WAV declares zero channels".to_string());
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => wav_reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
        (hound::SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f64;
            wav_reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| (v as f64 * scale) as f32))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?
        }
        (format, bits) => {
            return Err(format!("unsupported sample format {format:?} at {bits} bits"));
        }
    };

    Ok(AudioBuffer::from_interleaved(
        &interleaved,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

/// Format fields the fallback parser needs from the `fmt ` chunk.
#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

/// Tolerant RIFF/WAVE walker.
///
/// Trusts the declared sample width and clips a data chunk whose declared
/// size runs past the end of the file.
fn parse_riff(bytes: &[u8]) -> std::result::Result<AudioBuffer, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".to_string());
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<&[u8]> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4) as usize;
        let body_start = pos + 8;
        let body_end = body_start.saturating_add(size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match id {
            b"fmt " => fmt = Some(parse_fmt(body)?),
            b"data" => data = Some(body),
            _ => {}
        }
        if fmt.is_some() && data.is_some() {
            break;
        }
        // Chunks are word-aligned
        pos = body_start.saturating_add(size).saturating_add(size & 1);
    }

    let fmt = fmt.ok_or("missing fmt chunk")?;
    let data = data.ok_or("missing data chunk")?;
    if fmt.channels == 0 {
        return Err("WAV declares zero channels".to_string());
    }

    let width = if fmt.bits_per_sample > 0 {
        (fmt.bits_per_sample as usize).div_ceil(8)
    } else {
        fmt.block_align as usize / fmt.channels as usize
    };

    let samples: Vec<f32> = match (fmt.format_tag, width) {
        (WAVE_FORMAT_IEEE_FLOAT, 4) => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        (WAVE_FORMAT_IEEE_FLOAT, 8) => data
            .chunks_exact(8)
            .map(|b| {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
            })
            .collect(),
        (_, 1) => data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        (_, 2) => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / I16_SCALE)
            .collect(),
        (_, 3) => data
            .chunks_exact(3)
            .map(|b| {
                // Sign-extend by placing the 24 bits at the top of an i32
                let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                v as f32 / 8_388_608.0
            })
            .collect(),
        (_, 4) => data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        (_, width) => return Err(format!("sample width {width} not supported")),
    };

    Ok(AudioBuffer::from_interleaved(
        &samples,
        fmt.channels as usize,
        fmt.sample_rate,
    ))
}

fn parse_fmt(body: &[u8]) -> std::result::Result<FmtChunk, String> {
    if body.len() < 16 {
        return Err("fmt chunk too short".to_string());
    }
    let mut format_tag = read_u16(body, 0);
    if format_tag == WAVE_FORMAT_EXTENSIBLE && body.len() >= 26 {
        // First two bytes of the sub-format GUID carry the real tag
        format_tag = read_u16(body, 24);
    }
    if format_tag != WAVE_FORMAT_PCM && format_tag != WAVE_FORMAT_IEEE_FLOAT {
        tracing::debug!("unknown WAV format tag {format_tag:#06x}, decoding as integer PCM");
    }
    Ok(FmtChunk {
        format_tag,
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        block_align: read_u16(body, 12),
        bits_per_sample: read_u16(body, 14),
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Converts a float sample to 16-bit, clamping before truncation.
pub fn to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE).clamp(-32768.0, 32767.0) as i16
}

/// Writes `buffer` to `path` as 16-bit PCM, creating or overwriting the file.
pub fn encode(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let encode_error = |e: hound::Error| RenderError::Encode {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let spec = hound::WavSpec {
        channels: buffer.channel_count().max(1) as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(encode_error)?;
    for i in 0..buffer.frames() {
        for channel in buffer.channels() {
            writer
                .write_sample(to_i16(channel[i]))
                .map_err(encode_error)?;
        }
    }
    writer.finalize().map_err(encode_error)?;
    Ok(())
}

/// Decodes `input` and re-encodes it as 16-bit PCM at `output`.
///
/// Returns the decoded buffer so callers can inspect the source format.
pub fn normalize(input: &Path, output: &Path) -> Result<AudioBuffer> {
    let buffer = decode(input)?;
    encode(&buffer, output)?;
    Ok(buffer)
}

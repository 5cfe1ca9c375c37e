//! Render request and result types.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::stage::StageKind;
use crate::dsp::{DeEsserMode, DoublerStyle, NoteDivision, ToneSettings};
use crate::error::{RenderError, Result};

/// Where the reverb stage gets its sound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbEngine {
    /// Reverb plugins run through the host.
    #[default]
    Plugin,
    /// In-process convolution with a synthesized impulse response.
    Convolution,
}

impl std::str::FromStr for ReverbEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plugin" => Ok(Self::Plugin),
            "convolution" => Ok(Self::Convolution),
            other => Err(format!(
                "unknown reverb engine '{other}' (expected plugin or convolution)"
            )),
        }
    }
}

/// Per-render stage selection and parameters. Read-only for the whole render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub deesser: bool,
    /// 1 = light, 2 = medium, 3 = strong.
    pub deesser_mode: u8,
    pub noise_gate: bool,
    /// Tone levels: 1 = cut, 2 = flat, 3 = boost.
    pub tone_low: u8,
    pub tone_mid: u8,
    pub tone_high: u8,
    pub air: bool,
    pub delay: bool,
    /// Tempo for the delay; detected from the audio when unset.
    pub bpm: Option<f32>,
    pub division: NoteDivision,
    pub reverb: bool,
    /// 1 = small, 2 = medium, 3 = large.
    pub reverb_mode: u8,
    pub reverb_engine: ReverbEngine,
    pub doubler: bool,
    pub doubler_style: DoublerStyle,
    pub phone_fx: bool,
    pub robot: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deesser: true,
            deesser_mode: 2,
            noise_gate: true,
            tone_low: 2,
            tone_mid: 2,
            tone_high: 2,
            air: false,
            delay: false,
            bpm: None,
            division: NoteDivision::Quarter,
            reverb: false,
            reverb_mode: 2,
            reverb_engine: ReverbEngine::Plugin,
            doubler: false,
            doubler_style: DoublerStyle::Cross,
            phone_fx: false,
            robot: false,
        }
    }
}

impl PipelineConfig {
    /// Only the main chain.
    pub fn main_only() -> Self {
        Self {
            deesser: false,
            noise_gate: false,
            ..Self::default()
        }
    }

    /// Loads a preset file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenderError::ConfigFile {
                path: path.display().to_string(),
            },
            _ => RenderError::Io(e),
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn tone_settings(&self) -> ToneSettings {
        ToneSettings {
            low: self.tone_low,
            mid: self.tone_mid,
            high: self.tone_high,
            air: false,
        }
        .clamped()
    }

    pub fn deesser_mode(&self) -> DeEsserMode {
        DeEsserMode::from_level(self.deesser_mode)
    }

    /// Reverb mode clamped into 1..=3.
    pub fn reverb_mode(&self) -> u8 {
        self.reverb_mode.clamp(1, 3)
    }
}

/// An optional stage that did not run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStage {
    pub stage: StageKind,
    pub reason: String,
}

/// Result of a successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub output: PathBuf,
    pub completed: Vec<StageKind>,
    pub skipped: Vec<SkippedStage>,
}

impl RenderSummary {
    pub fn was_skipped(&self, stage: StageKind) -> bool {
        self.skipped.iter().any(|s| s.stage == stage)
    }
}

/// Cooperative cancellation, checked between stages only: a running plugin
/// host is never interrupted mid-file.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

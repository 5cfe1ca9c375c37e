//! Command-line interface for vocalrender
//!
//! Provides argument parsing using clap derive macros.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

use crate::dsp::{DoublerStyle, NoteDivision};
use crate::pipeline::{PipelineConfig, ReverbEngine};

/// Offline vocal renderer
#[derive(Parser, Debug)]
#[command(
    name = "vocalrender",
    version,
    about = "Render a vocal stem through plugin-host stages and built-in DSP"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: info logs, -vv: debug logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a poll interval.
///
/// Supports any duration format accepted by `humantime` (`500ms`, `2s`);
/// a bare number is milliseconds.
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a vocal file through the full chain
    Render(RenderArgs),

    /// Run only the mastering plugin
    Master {
        /// Input WAV file
        input: PathBuf,
        /// Output WAV file
        output: PathBuf,
    },

    /// Check the plugin host and plugin installation
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Input, output and stage selection for one render.
///
/// Flags are applied on top of `--preset` (or the defaults): switches turn a
/// stage on, `--no-*` turns it off, and valued options replace the preset's.
#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Input WAV file
    pub input: PathBuf,

    /// Output WAV file
    pub output: PathBuf,

    /// TOML preset with stage settings
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Skip the de-esser
    #[arg(long)]
    pub no_deesser: bool,

    /// De-esser intensity (1 light, 2 medium, 3 strong)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub deesser_mode: Option<u8>,

    /// Skip the noise gate
    #[arg(long)]
    pub no_gate: bool,

    /// Low band (1 cut, 2 flat, 3 boost)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub tone_low: Option<u8>,

    /// Mid band (1 cut, 2 flat, 3 boost)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub tone_mid: Option<u8>,

    /// High band (1 cut, 2 flat, 3 boost)
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub tone_high: Option<u8>,

    /// Add air (high-shelf lift) after the main chain
    #[arg(long)]
    pub air: bool,

    /// Tempo-synced ping-pong delay
    #[arg(long)]
    pub delay: bool,

    /// Delay tempo (detected from the audio when omitted)
    #[arg(long, value_name = "BPM")]
    pub bpm: Option<f32>,

    /// Delay note length: 1/2, 1/4 or 1/8
    #[arg(long, value_name = "DIV")]
    pub division: Option<NoteDivision>,

    /// Reverb
    #[arg(long)]
    pub reverb: bool,

    /// Reverb size (1 small, 2 medium, 3 large)
    #[arg(long, value_name = "MODE", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub reverb_mode: Option<u8>,

    /// Reverb engine: plugin or convolution
    #[arg(long, value_name = "ENGINE")]
    pub reverb_engine: Option<ReverbEngine>,

    /// Stereo doubler
    #[arg(long)]
    pub doubler: bool,

    /// Doubler style: cross or pitch
    #[arg(long, value_name = "STYLE")]
    pub doubler_style: Option<DoublerStyle>,

    /// Telephone EQ before the main chain
    #[arg(long)]
    pub phone: bool,

    /// Robot voice plugin at the end of the chain
    #[arg(long)]
    pub robot: bool,

    /// Progress update interval while a plugin runs (e.g. 500ms, 2s)
    #[arg(long, value_name = "DURATION", value_parser = parse_interval)]
    pub poll_interval: Option<Duration>,

    /// Print the render summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl RenderArgs {
    /// Applies the command-line flags on top of `base`.
    pub fn apply(&self, base: PipelineConfig) -> PipelineConfig {
        let mut config = base;
        if self.no_deesser {
            config.deesser = false;
        }
        if let Some(mode) = self.deesser_mode {
            config.deesser_mode = mode;
        }
        if self.no_gate {
            config.noise_gate = false;
        }
        if let Some(level) = self.tone_low {
            config.tone_low = level;
        }
        if let Some(level) = self.tone_mid {
            config.tone_mid = level;
        }
        if let Some(level) = self.tone_high {
            config.tone_high = level;
        }
        config.air |= self.air;
        config.delay |= self.delay;
        if self.bpm.is_some() {
            config.bpm = self.bpm;
        }
        if let Some(division) = self.division {
            config.division = division;
        }
        config.reverb |= self.reverb;
        if let Some(mode) = self.reverb_mode {
            config.reverb_mode = mode;
        }
        if let Some(engine) = self.reverb_engine {
            config.reverb_engine = engine;
        }
        config.doubler |= self.doubler;
        if let Some(style) = self.doubler_style {
            config.doubler_style = style;
        }
        config.phone_fx |= self.phone;
        config.robot |= self.robot;
        config
    }
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

//! Default configuration constants for vocalrender.
//!
//! Shared by the application config, the pipeline and the DSP presets so the
//! same numbers are not repeated across modules.

/// Default processing block size handed to the plugin host, in samples.
///
/// Larger blocks mean fewer process calls inside the host and usually a
/// faster render.
pub const BLOCK_SIZE: u32 = 2048;

/// Smallest block size the plugin host accepts.
pub const MIN_BLOCK_SIZE: u32 = 64;

/// Largest block size the plugin host accepts.
pub const MAX_BLOCK_SIZE: u32 = 65536;

/// Interval between interpolated progress updates while a plugin runs.
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Expected run time of the main chain plugin, in seconds.
///
/// Only used to interpolate progress; the stage is complete when the host exits.
pub const MAIN_EXPECTED_SECS: f64 = 50.0;

/// Expected run time of the reverb plugin, in seconds.
pub const REVERB_EXPECTED_SECS: f64 = 18.0;

/// Expected run time of any other plugin stage, in seconds.
pub const PLUGIN_EXPECTED_SECS: f64 = 10.0;

/// Fraction of a plugin stage's weight interpolation may reach before the host exits.
pub const INTERPOLATION_CAP: f64 = 0.92;

/// Highest percentage reported before the render is confirmed complete.
pub const MAX_PENDING_PERCENT: u8 = 99;

/// Tempo used when none is given and detection fails.
pub const DEFAULT_BPM: f32 = 120.0;

/// Lift applied before the medium and large reverbs, in dB.
pub const REVERB_SEND_GAIN_DB: f32 = 4.5;

/// Stable plugin names understood by the registries.
pub mod plugin_names {
    /// Main vocal chain.
    pub const MAIN: &str = "globalmix";
    /// Older main chain, used when the primary one is absent.
    pub const MAIN_FALLBACK: &str = "project1";
    /// Mastering chain used by the master-only entry point.
    pub const MASTER: &str = "master";
    /// Robot voice effect.
    pub const ROBOT: &str = "robot";
    /// Reverb plugins by mode (1 = small, 2 = medium, 3 = large).
    pub const REVERBS: [&str; 3] = ["reverb1", "reverb2", "reverb3new"];
    /// Alias accepted for the large reverb.
    pub const REVERB_LARGE_ALIAS: &str = "reverb3";

    /// Name of the EQ bank plugin `index` (1-based, 1..=9).
    pub fn eq(index: u8) -> String {
        format!("eq{index}")
    }
}

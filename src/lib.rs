//! vocalrender - offline vocal stem renderer
//!
//! Runs a vocal through an ordered chain of external plugin-host stages and
//! in-process DSP, with weighted progress reporting.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod dsp;
pub mod error;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod plugin;

// Core seams (registry → host → progress)
pub use pipeline::progress::ProgressReporter;
pub use plugin::invoker::{PluginHost, ProcessHost};
pub use plugin::registry::{DirectoryRegistry, PluginRegistry, StaticRegistry};

// Pipeline
pub use pipeline::orchestrator::{RenderSettings, Renderer};
pub use pipeline::types::{CancellationToken, PipelineConfig, RenderSummary};

// Audio
pub use audio::AudioBuffer;

// Error handling
pub use error::{RenderError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

//! The ordered render chain.
//!
//! Stages run one after another, each reading the previous stage's file and
//! writing a new temp file. Only the main chain is mandatory; any other stage
//! that cannot run is skipped and the audio passes through unchanged.

pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod progress;
pub mod stage;
pub mod temp;
pub mod types;

pub use error::{ErrorReporter, LogReporter, StageError};
pub use monitor::{Clock, Monitor, SystemClock};
pub use orchestrator::{RenderSettings, Renderer};
pub use progress::{
    CollectorProgress, LogProgress, NoProgress, ProgressEvent, ProgressReporter, ProgressTracker,
};
pub use stage::StageKind;
pub use temp::TempFiles;
pub use types::{CancellationToken, PipelineConfig, RenderSummary, ReverbEngine, SkippedStage};

//! Stage failures and how they are reported.

use std::fmt;

use tracing::warn;

use super::stage::StageKind;
use crate::error::RenderError;
use crate::plugin::InvocationError;

/// Why a stage produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// A plugin the stage needs could not be resolved.
    Unavailable(String),
    /// The stage ran and failed.
    Failed(String),
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Unavailable(msg) => write!(f, "unavailable: {}", msg),
            StageError::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for StageError {}

impl From<RenderError> for StageError {
    fn from(err: RenderError) -> Self {
        StageError::Failed(err.to_string())
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Failed(err.to_string())
    }
}

impl From<InvocationError> for StageError {
    fn from(err: InvocationError) -> Self {
        StageError::Failed(err.to_string())
    }
}

/// Trait for reporting stage failures.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, stage: StageKind, error: &StageError);
}

/// Logs failures through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, stage: StageKind, error: &StageError) {
        if stage.is_mandatory() {
            tracing::error!(stage = stage.label(), %error, "mandatory stage failed");
        } else {
            warn!(stage = stage.label(), %error, "skipping stage");
        }
    }
}

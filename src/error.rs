//! Error types for vocalrender.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    // Resolution errors, raised before any audio I/O
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    // Codec errors
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: String, message: String },

    // Stage errors
    #[error("{stage} failed: {message}")]
    MandatoryStage { stage: String, message: String },

    #[error("Render cancelled before {stage}")]
    Cancelled { stage: String },

    // Configuration file errors
    #[error("Configuration file not found at {path}")]
    ConfigFile { path: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Short, stable name of the error kind (used in JSON output and logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::InputNotFound { .. } => "input_not_found",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::MandatoryStage { .. } => "mandatory_stage",
            Self::Cancelled { .. } => "cancelled",
            Self::ConfigFile { .. } => "config_file",
            Self::ConfigParse(_) => "config_parse",
            Self::Io(_) => "io",
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RenderError>;

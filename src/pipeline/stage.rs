//! The fixed stage order and per-stage weights.

use serde::Serialize;

use super::types::PipelineConfig;

/// One step of the render chain. Variants are declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Tone,
    NoiseGate,
    Phone,
    Main,
    DeEsser,
    Air,
    Delay,
    Reverb,
    Doubler,
    Robot,
    /// Standalone mastering pass; never part of a [`StageKind::plan`].
    Master,
}

impl StageKind {
    /// Every chain stage, in order.
    pub const CHAIN: [StageKind; 10] = [
        StageKind::Tone,
        StageKind::NoiseGate,
        StageKind::Phone,
        StageKind::Main,
        StageKind::DeEsser,
        StageKind::Air,
        StageKind::Delay,
        StageKind::Reverb,
        StageKind::Doubler,
        StageKind::Robot,
    ];

    /// Human-readable label used in progress messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Tone => "Tone",
            Self::NoiseGate => "Noise gate",
            Self::Phone => "Phone FX",
            Self::Main => "Main chain",
            Self::DeEsser => "De-esser",
            Self::Air => "Air",
            Self::Delay => "Delay",
            Self::Reverb => "Reverb",
            Self::Doubler => "Doubler",
            Self::Robot => "Robot FX",
            Self::Master => "Master",
        }
    }

    /// Relative share of the progress bar.
    pub fn weight(self) -> u32 {
        match self {
            Self::Tone => 6,
            Self::NoiseGate => 2,
            Self::Phone => 2,
            Self::Main => 52,
            Self::DeEsser => 5,
            Self::Air => 4,
            Self::Delay => 4,
            Self::Reverb => 18,
            Self::Doubler => 4,
            Self::Robot => 4,
            Self::Master => 100,
        }
    }

    /// A failing mandatory stage aborts the render; anything else is skipped.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::Main | Self::Master)
    }

    /// Whether `config` turns this stage on.
    pub fn is_enabled(self, config: &PipelineConfig) -> bool {
        match self {
            Self::Tone => !config.tone_settings().is_flat(),
            Self::NoiseGate => config.noise_gate,
            Self::Phone => config.phone_fx,
            Self::Main => true,
            Self::DeEsser => config.deesser,
            Self::Air => config.air,
            Self::Delay => config.delay,
            Self::Reverb => config.reverb,
            Self::Doubler => config.doubler,
            Self::Robot => config.robot,
            Self::Master => false,
        }
    }

    /// The enabled stages for `config`, in execution order.
    pub fn plan(config: &PipelineConfig) -> Vec<StageKind> {
        Self::CHAIN
            .into_iter()
            .filter(|stage| stage.is_enabled(config))
            .collect()
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

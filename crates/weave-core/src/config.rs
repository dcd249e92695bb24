//! Session configuration.
//!
//! Every field has a default, so a JSON config only needs to name what it
//! changes. All limits are work budgets; nothing here is wall-clock.

use serde::{Deserialize, Serialize};

use weave_explore::characterize::{CharacterizationConfig, CharacterizationKind};
use weave_explore::checker::CheckerKind;
use weave_explore::conflict::DiagnosisLimits;
use weave_explore::generate::{GeneratorKind, GreedyConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },
}

/// Knobs for one generation, characterization or diagnosis session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sequential generator used by [`crate::campaign::generate_suite`].
    pub generator: GeneratorKind,
    pub checker: CheckerKind,
    pub greedy: GreedyConfig,
    /// FIC search used by interleaving sessions; `None` only counts failures.
    pub characterization: Option<CharacterizationKind>,
    pub identification: CharacterizationConfig,
    pub diagnosis: DiagnosisLimits,
    /// Add identified FICs to the checker so later inputs avoid them.
    pub exclude_identified: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorKind::default(),
            checker: CheckerKind::default(),
            greedy: GreedyConfig::default(),
            characterization: Some(CharacterizationKind::default()),
            identification: CharacterizationConfig::default(),
            diagnosis: DiagnosisLimits::default(),
            exclude_identified: true,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a config from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("greedy.candidate_count", self.greedy.candidate_count),
            ("identification.max_fic_size", self.identification.max_fic_size),
            ("identification.max_attempts", self.identification.max_attempts),
        ];
        match required.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigError::Zero { field: *field }),
            None => Ok(()),
        }
    }
}

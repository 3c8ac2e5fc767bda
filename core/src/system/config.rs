use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Default contradiction tolerance
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Tunables for a [`System`](super::System)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Writes within this distance of a held value are no-ops instead of contradictions
    pub tolerance: f64,
    /// Repeat the relationship pass until nothing new is solved (bounded by graph size)
    pub fixpoint: bool,
    /// Prefix for anonymous intermediate names (`$0`, `$1`, ...)
    pub intermediate_prefix: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            fixpoint: true,
            intermediate_prefix: "$".to_string(),
        }
    }
}

impl SystemConfig {
    /// Parse and validate a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.intermediate_prefix.is_empty() {
            return Err(EngineError::InvalidConfig(
                "intermediate_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

//! Global configuration.

use serde::{Deserialize, Serialize};

/// Default cap on scan-execute cycles per run.
pub const DEFAULT_CYCLE_BUDGET: u64 = 1000;

/// Global configuration loaded from `config.toml` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Model identifier handed to model-backed capabilities.
    #[serde(default)]
    pub model: Option<String>,
    /// Maximum scan-execute cycles before a run aborts.
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget: u64,
}

fn default_cycle_budget() -> u64 {
    DEFAULT_CYCLE_BUDGET
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            model: None,
            cycle_budget: DEFAULT_CYCLE_BUDGET,
        }
    }
}

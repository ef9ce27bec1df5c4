//! Build configuration, persisted as a flat JSON object. Unknown keys are
//! ignored on load; missing keys keep the built-in defaults.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Knobs for the tree builder, the bitfield search, and the emitter.
/// A plain value: pass it by reference, never share it globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    pub allow_switch: bool,
    pub allow_sequence: bool,
    pub insert_returns: bool,
    pub no_pretty_output: bool,
    pub no_optimise_if_condition_nodes: bool,
    pub no_break_after_rule: bool,
    pub bit_flag_coef: f32,
    pub bitfield_length_delta_power: f32,
    pub bitfield_set_length_delta_power: f32,
    pub bitfield_set_coef: f32,
    pub min_switch_rules: usize,
    pub min_switch_bits: usize,
    pub max_switch_bits: usize,
    pub max_switch_nesting_depth: usize,
    pub max_total_switch_bits: usize,
    pub max_switch_splits: usize,
    pub verbose: bool,
    pub timings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_switch: true,
            allow_sequence: true,
            insert_returns: false,
            no_pretty_output: false,
            no_optimise_if_condition_nodes: false,
            no_break_after_rule: true,
            bit_flag_coef: 1.0,
            bitfield_length_delta_power: 0.5,
            bitfield_set_length_delta_power: 0.5,
            bitfield_set_coef: 1.0,
            min_switch_rules: 4,
            min_switch_bits: 2,
            max_switch_bits: 8,
            max_switch_nesting_depth: 3,
            max_total_switch_bits: 15,
            max_switch_splits: 1,
            verbose: false,
            timings: false,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Json)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(ConfigError::Json)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_json_string()?).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {err}"),
            ConfigError::Json(err) => write!(f, "configuration error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

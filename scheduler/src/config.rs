//! Static configuration for a scheduler instance (SPEC_FULL.md §4.8). Loaded once by the embedding
//! process and handed in as a string; this crate never touches the filesystem itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::SchedulingOptions;

#[derive(Debug, Error)]
#[error("invalid scheduler config: {0}")]
pub struct ConfigError(#[from] toml::de::Error);

/// Mirrors [`SchedulingOptions`] but as a plain `Deserialize` target with sensible defaults, so a
/// TOML file only needs to name the knobs it wants to override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub spread_threshold: f64,
    pub avoid_local_node: bool,
    pub require_node_available: bool,
    pub avoid_gpu_nodes: bool,
    pub max_cpu_fraction_per_node: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let options = SchedulingOptions::default();
        Self {
            spread_threshold: options.spread_threshold,
            avoid_local_node: options.avoid_local_node,
            require_node_available: options.require_node_available,
            avoid_gpu_nodes: options.avoid_gpu_nodes,
            max_cpu_fraction_per_node: options.max_cpu_fraction_per_node,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_options(&self) -> SchedulingOptions {
        SchedulingOptions {
            spread_threshold: self.spread_threshold,
            avoid_local_node: self.avoid_local_node,
            require_node_available: self.require_node_available,
            avoid_gpu_nodes: self.avoid_gpu_nodes,
            max_cpu_fraction_per_node: self.max_cpu_fraction_per_node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let config = SchedulerConfig::from_toml_str("spread_threshold = 0.75\n").unwrap();
        assert_eq!(config.spread_threshold, 0.75);
        assert_eq!(config.max_cpu_fraction_per_node, SchedulerConfig::default().max_cpu_fraction_per_node);
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = SchedulerConfig::from_toml_str("spread_threshold = [").unwrap_err();
        assert!(err.to_string().contains("invalid scheduler config"));
    }

    #[test]
    fn to_options_round_trips() {
        let config = SchedulerConfig {
            avoid_gpu_nodes: true,
            ..SchedulerConfig::default()
        };
        assert!(config.to_options().avoid_gpu_nodes);
    }
}

//! Configuration for the wall mesh engine

use crate::error::{Result, WallMeshError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for mesh topology, contact classification and area sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallMeshConfig {
    /// Two faces are coplanar when `|n_a · n_b| > 1 - curvature_tolerance`
    pub curvature_tolerance: f64,

    /// Absolute per-coordinate tolerance for node equality
    pub node_match_tolerance: f64,

    /// A point closer to an edge line than this fraction of the edge length
    /// lies on the edge
    pub boundary_epsilon: f64,

    /// Random samples drawn per Monte-Carlo round
    pub mc_samples_per_round: usize,

    /// Maximum number of Monte-Carlo rounds before giving up
    pub mc_max_rounds: usize,

    /// Accepted relative deviation of the summed estimate from the global area
    pub mc_relative_tolerance: f64,

    /// Seed for the mesh's uniform random source
    pub random_seed: u64,

    /// Length of the per-contact history vector
    pub history_values: usize,
}

impl Default for WallMeshConfig {
    fn default() -> Self {
        Self {
            curvature_tolerance: 1e-4,
            node_match_tolerance: 1e-8,
            boundary_epsilon: 1e-10,
            mc_samples_per_round: 30_000,
            mc_max_rounds: 5,
            mc_relative_tolerance: 0.05,
            random_seed: 179_424_799,
            history_values: 3,
        }
    }
}

impl WallMeshConfig {
    /// Coplanarity threshold on the absolute normal dot product
    pub fn curvature(&self) -> f64 {
        1.0 - self.curvature_tolerance
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<()> {
        if !(self.curvature_tolerance > 0.0 && self.curvature_tolerance < 1.0) {
            return Err(WallMeshError::ConfigError(format!(
                "curvature_tolerance must lie in (0, 1), got {}",
                self.curvature_tolerance
            )));
        }
        if !(self.node_match_tolerance >= 0.0) {
            return Err(WallMeshError::ConfigError(format!(
                "node_match_tolerance must be non-negative, got {}",
                self.node_match_tolerance
            )));
        }
        if !(self.boundary_epsilon >= 0.0) {
            return Err(WallMeshError::ConfigError(format!(
                "boundary_epsilon must be non-negative, got {}",
                self.boundary_epsilon
            )));
        }
        if self.mc_samples_per_round == 0 || self.mc_max_rounds == 0 {
            return Err(WallMeshError::ConfigError(
                "Monte-Carlo sample count and round cap must be positive".to_string(),
            ));
        }
        if !(self.mc_relative_tolerance > 0.0) {
            return Err(WallMeshError::ConfigError(format!(
                "mc_relative_tolerance must be positive, got {}",
                self.mc_relative_tolerance
            )));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WallMeshError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            WallMeshError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            WallMeshError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content).map_err(|e| {
            WallMeshError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WallMeshConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.curvature() - 0.9999).abs() < 1e-12);
        assert_eq!(config.mc_samples_per_round, 30_000);
        assert_eq!(config.mc_max_rounds, 5);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WallMeshConfig =
            serde_json::from_str(r#"{ "history_values": 6, "mc_max_rounds": 8 }"#).unwrap();

        assert_eq!(config.history_values, 6);
        assert_eq!(config.mc_max_rounds, 8);
        assert_eq!(config.node_match_tolerance, 1e-8);
    }

    #[test]
    fn test_invalid_curvature_rejected() {
        let config = WallMeshConfig {
            curvature_tolerance: 1.5,
            ..WallMeshConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WallMeshConfig {
            mc_max_rounds: 0,
            ..WallMeshConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wall.json");

        let config = WallMeshConfig {
            random_seed: 42,
            ..WallMeshConfig::default()
        };
        config.to_file(&path).unwrap();

        let loaded = WallMeshConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}

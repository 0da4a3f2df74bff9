//! Configuration system for the savanna simulation.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::animals::AnimalConfig;
use crate::dynamics::DynamicsConfig;
use crate::fire::FireConfig;
use crate::grid::GridConfig;
use crate::kernel::KernelConfig;
use crate::population::TreeConfig;
use crate::strategy::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    pub trees: TreeConfig,
    pub strategy: StrategyConfig,
    pub fire: FireConfig,
    pub dynamics: DynamicsConfig,
    pub kernels: KernelConfig,
    #[serde(default)]
    pub animals: AnimalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Steps between stats history snapshots
    pub stats_interval: u64,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 10,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        self.grid.validate()?;
        self.trees.validate()?;
        self.strategy.validate()?;
        self.fire.validate()?;
        self.dynamics.validate()?;
        self.kernels.validate()?;
        self.animals.validate()?;
        if self.logging.stats_interval == 0 {
            return Err("logging.stats_interval must be > 0".to_string());
        }
        Ok(())
    }
}

//! # Savanna
//!
//! Individual-based savanna-forest simulator: trees grow, produce seed crops,
//! and disperse them by diffusion, wind or frugivorous animals, while
//! percolating wildfires keep the forest in check.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use savanna::{Config, Dynamics};
//!
//! let config = Config::default();
//! let mut dynamics = Dynamics::from_config(config, 42).unwrap();
//!
//! dynamics.run(100).unwrap();
//!
//! println!("Tree cover: {:.3}", dynamics.tree_cover());
//! println!("Population: {}", dynamics.population());
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use savanna::Config;
//!
//! let mut config = Config::default();
//! config.grid.gridsize = 100;
//! config.fire.rainfall = 800.0;
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Step by step
//!
//! ```rust,no_run
//! use savanna::animals::AnimalConfig;
//! use savanna::kernel::KernelConfig;
//! use savanna::{Config, Dynamics};
//!
//! let mut dynamics = Dynamics::new_with_seed(Config::default(), 1);
//! dynamics.init_state(100, 1.0, 0.0, 0.05);
//! dynamics
//!     .set_global_kernels(&KernelConfig::default(), &AnimalConfig::default())
//!     .unwrap();
//! dynamics.update().unwrap();
//! ```

pub mod animals;
pub mod config;
pub mod dispersal;
pub mod dynamics;
pub mod error;
pub mod export;
pub mod fire;
pub mod geometry;
pub mod grid;
pub mod kernel;
pub mod population;
pub mod probability;
pub mod resources;
pub mod state;
pub mod stats;
pub mod strategy;
pub mod tree;

// Re-export main types
pub use config::Config;
pub use dynamics::{Dynamics, TerminationCause};
pub use error::{SimError, SimResult};
pub use state::State;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a quick benchmark on a default landscape of `gridsize × gridsize` cells
pub fn benchmark(steps: u64, gridsize: usize) -> SimResult<BenchmarkResult> {
    use std::time::Instant;

    let mut config = Config::default();
    config.grid.gridsize = gridsize;

    let mut dynamics = Dynamics::from_config(config, 42)?;
    let initial_population = dynamics.population();

    let start = Instant::now();
    dynamics.run(steps)?;
    let elapsed = start.elapsed();

    Ok(BenchmarkResult {
        steps,
        gridsize,
        initial_population,
        final_population: dynamics.population(),
        final_tree_cover: dynamics.tree_cover(),
        elapsed_secs: elapsed.as_secs_f64(),
        steps_per_second: steps as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    })
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchmarkResult {
    pub steps: u64,
    pub gridsize: usize,
    pub initial_population: usize,
    pub final_population: usize,
    pub final_tree_cover: f32,
    pub elapsed_secs: f64,
    pub steps_per_second: f64,
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Benchmark Results ===")?;
        writeln!(f, "Steps: {}", self.steps)?;
        writeln!(f, "Grid: {0}x{0}", self.gridsize)?;
        writeln!(f, "Population: {} -> {}", self.initial_population, self.final_population)?;
        writeln!(f, "Tree cover: {:.3}", self.final_tree_cover)?;
        writeln!(f, "Time: {:.3}s", self.elapsed_secs)?;
        writeln!(f, "Speed: {:.1} steps/s", self.steps_per_second)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_benchmark() {
        let result = benchmark(3, 30).unwrap();

        assert_eq!(result.steps, 3);
        assert!(result.steps_per_second > 0.0);
        assert!(result.initial_population > 0);
    }
}

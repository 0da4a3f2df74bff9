//! Simulation driver - the per-timestep loop.
//!
//! One call to [`Dynamics::update`] advances the landscape by one timestep in a
//! fixed order: dispersal (on pre-fire canopy), fire, growth, background
//! mortality, then a rebuild of cell occupancy from the surviving trees.

use crate::animals::{AnimalConfig, Animals};
use crate::config::Config;
use crate::dispersal::disperse_crop;
use crate::error::{SimError, SimResult};
use crate::fire::FireRegime;
use crate::kernel::{Kernel, KernelConfig, WindKernel};
use crate::population::CropUpdate;
use crate::resources::{ColorField, ResourceGrid};
use crate::state::State;
use crate::stats::{Stats, StatsHistory};
use crate::strategy::DispersalVector;
use log::{debug, info, warn};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tree cover at or above which the landscape counts as closed forest
pub const FOREST_DOMINANCE_COVER: f32 = 0.95;
/// Tree cover at or below which the landscape counts as open savanna
pub const SAVANNA_DOMINANCE_COVER: f32 = 0.05;

/// Timestep and demographic parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsConfig {
    /// Time units per update
    pub timestep: u64,
    /// Radius increment per timestep, per sqrt(m) of radius
    pub growth_rate_multiplier: f32,
    /// Per-tree death probability per timestep
    pub background_mortality: f32,
    /// Resource grid width as a fraction of the landscape grid width
    pub resource_grid_relative_size: f32,
    /// Tree cover planted before the first update
    pub initial_tree_cover: f32,
    /// Seed mass (g) used when the strategy has no seed mass distribution
    pub seed_mass: f32,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            timestep: 1,
            growth_rate_multiplier: 0.1,
            background_mortality: 0.01,
            resource_grid_relative_size: 0.1,
            initial_tree_cover: 0.4,
            seed_mass: 0.05,
        }
    }
}

impl DynamicsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timestep == 0 {
            return Err("dynamics.timestep must be > 0".to_string());
        }
        if self.growth_rate_multiplier < 0.0 {
            return Err("dynamics.growth_rate_multiplier must be >= 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.background_mortality) {
            return Err("dynamics.background_mortality must be within [0, 1]".to_string());
        }
        if self.resource_grid_relative_size <= 0.0 || self.resource_grid_relative_size > 1.0 {
            return Err("dynamics.resource_grid_relative_size must be within (0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.initial_tree_cover) {
            return Err("dynamics.initial_tree_cover must be within [0, 1)".to_string());
        }
        if self.seed_mass <= 0.0 {
            return Err("dynamics.seed_mass must be > 0".to_string());
        }
        Ok(())
    }
}

/// Why a run loop should stop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationCause {
    PopulationCollapse,
    ForestDominance,
    SavannaDominance,
    MaxTimesteps,
}

impl std::fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::PopulationCollapse => "population collapsed",
            Self::ForestDominance => "landscape closed to forest",
            Self::SavannaDominance => "landscape opened to savanna",
            Self::MaxTimesteps => "maximum number of timesteps reached",
        };
        f.write_str(text)
    }
}

/// The simulation session
pub struct Dynamics {
    pub time: u64,
    pub config: Config,
    pub stats: Stats,
    pub stats_history: StatsHistory,
    fire: FireRegime,
    state: Option<State>,
    resource_grid: Option<ResourceGrid>,
    animals: Option<Animals>,
    rng: ChaCha8Rng,
    seed: u64,
}

impl Dynamics {
    /// Create a session with a random seed
    pub fn new(config: Config) -> Self {
        let seed = rand::thread_rng().gen();
        Self::new_with_seed(config, seed)
    }

    /// Create a session with a specific seed for reproducibility.
    /// No state exists until [`Dynamics::init_state`] is called.
    pub fn new_with_seed(config: Config, seed: u64) -> Self {
        let fire = FireRegime::new(config.fire.clone(), config.grid.cellsize, config.trees.max_radius);
        Self {
            time: 0,
            stats: Stats::new(),
            stats_history: StatsHistory::new(config.logging.stats_interval),
            config,
            fire,
            state: None,
            resource_grid: None,
            animals: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Validated session with state, kernels and initial tree cover in place
    pub fn from_config(config: Config, seed: u64) -> SimResult<Self> {
        config.validate().map_err(SimError::InvalidConfig)?;
        let mut dynamics = Self::new_with_seed(config, seed);
        let (gridsize, q1, q2, seed_mass) = (
            dynamics.config.grid.gridsize,
            dynamics.config.trees.radius_q1,
            dynamics.config.trees.radius_q2,
            dynamics.config.dynamics.seed_mass,
        );
        dynamics.init_state(gridsize, q1, q2, seed_mass);
        let kernels = dynamics.config.kernels.clone();
        let animals = dynamics.config.animals.clone();
        dynamics.set_global_kernels(&kernels, &animals)?;

        let cover = dynamics.config.dynamics.initial_tree_cover;
        if cover > 0.0 {
            if let Some(state) = dynamics.state.as_mut() {
                state.set_tree_cover(cover, &mut dynamics.rng);
            }
        }
        dynamics.refresh_stats();
        Ok(dynamics)
    }

    /// Build a fresh landscape. Kernels must be registered again afterwards.
    pub fn init_state(&mut self, gridsize: usize, radius_q1: f32, radius_q2: f32, seed_mass: f32) {
        self.config.grid.gridsize = gridsize;
        self.config.trees.radius_q1 = radius_q1;
        self.config.trees.radius_q2 = radius_q2;
        self.config.dynamics.seed_mass = seed_mass;
        self.state = Some(State::new(
            &self.config.grid,
            self.config.trees.clone(),
            self.config.strategy.clone(),
            seed_mass,
        ));
        self.resource_grid = None;
        self.animals = None;
        self.time = 0;
        info!("Initialized {0}x{0} landscape (cellsize {1} m)", gridsize, self.config.grid.cellsize);
    }

    /// Register the linear, wind and animal kernels and build the animal landscape
    pub fn set_global_kernels(&mut self, kernels: &KernelConfig, animals: &AnimalConfig) -> SimResult<()> {
        let state = self.state.as_mut().ok_or(SimError::StateNotInitialized)?;
        let width = state.grid.width_r();

        state.population.set_global_kernel(Kernel::linear(&kernels.linear));
        info!("Global kernel created (linear diffusion)");
        let wind = WindKernel::new(&kernels.wind, kernels.wind.seed_tspeed, width);
        state.population.set_global_kernel(Kernel::Wind(wind));
        info!("Global kernel created (wind dispersal)");

        let resource_grid = ResourceGrid::new(
            &state.grid,
            self.config.dynamics.resource_grid_relative_size,
            &animals.species,
        );
        let animal_population = Animals::new(animals, state.grid.area())?;
        state.population.set_global_kernel(Kernel::Animal);
        info!(
            "Global kernel created (animal dispersal): {} animals on a {}x{} resource grid",
            animal_population.popsize(),
            resource_grid.width(),
            resource_grid.width()
        );

        self.config.kernels = kernels.clone();
        self.config.animals = animals.clone();
        self.resource_grid = Some(resource_grid);
        self.animals = Some(animal_population);
        Ok(())
    }

    /// Advance the simulation by one timestep
    pub fn update(&mut self) -> SimResult<()> {
        let start = Instant::now();
        let Self {
            time,
            config,
            stats,
            stats_history,
            fire,
            state,
            resource_grid,
            animals,
            rng,
            ..
        } = self;
        let state = state.as_mut().ok_or(SimError::StateNotInitialized)?;
        let (Some(resource_grid), Some(animals)) = (resource_grid.as_mut(), animals.as_mut()) else {
            return Err(SimError::KernelsNotRegistered);
        };

        *time += config.dynamics.timestep;
        stats.reset_counters();
        state.grid.reset_state_distribution();

        if *time > config.dynamics.timestep {
            let timer = Instant::now();
            disperse(state, resource_grid, animals, rng, stats)?;
            debug!("Dispersal took {:.3}s", timer.elapsed().as_secs_f32());
        }

        let timer = Instant::now();
        let fires = fire.burn(state, *time, rng)?;
        debug!("Percolation took {:.3}s", timer.elapsed().as_secs_f32());
        stats.fires = fires.fires;
        stats.cells_burned = fires.cells_burned;
        stats.fire_spatial_extent = fires.mean_spatial_extent;
        stats.fire_deaths = fires.trees_killed;
        stats.seedlings_burned = fires.seedlings_killed;

        state.population.grow(config.dynamics.growth_rate_multiplier);
        stats.background_deaths = induce_background_mortality(state, config.dynamics.background_mortality, rng);

        stats.evicted += state.repopulate_grid();
        state.grid.redo_count();

        stats.time = *time;
        stats.update(state);
        stats.steps_per_second = 1.0 / start.elapsed().as_secs_f32().max(f32::EPSILON);
        info!(
            "Time {}: tree cover {:.3}, #trees {}, fires {}, seeds {}",
            stats.time,
            stats.tree_cover,
            stats.population,
            stats.fires,
            stats.seeds_produced
        );
        if stats_history.should_record(*time) {
            stats_history.record(stats.clone());
        }
        Ok(())
    }

    /// Run `steps` updates, stopping early on error
    pub fn run(&mut self, steps: u64) -> SimResult<()> {
        for _ in 0..steps {
            self.update()?;
        }
        Ok(())
    }

    /// Why a run capped at `max_timesteps` should stop now, if it should
    pub fn termination_cause(&self, max_timesteps: u64) -> Option<TerminationCause> {
        let state = self.state.as_ref()?;
        let cover = state.grid.tree_cover();
        if state.population.is_empty() {
            Some(TerminationCause::PopulationCollapse)
        } else if cover >= FOREST_DOMINANCE_COVER {
            Some(TerminationCause::ForestDominance)
        } else if cover <= SAVANNA_DOMINANCE_COVER {
            Some(TerminationCause::SavannaDominance)
        } else if self.time >= max_timesteps {
            Some(TerminationCause::MaxTimesteps)
        } else {
            None
        }
    }

    pub fn state(&self) -> SimResult<&State> {
        self.state.as_ref().ok_or(SimError::StateNotInitialized)
    }

    pub fn state_mut(&mut self) -> SimResult<&mut State> {
        self.state.as_mut().ok_or(SimError::StateNotInitialized)
    }

    /// Dense land-cover map of the landscape
    pub fn state_distribution(&mut self, collect: bool) -> SimResult<&[i32]> {
        let state = self.state.as_mut().ok_or(SimError::StateNotInitialized)?;
        Ok(state.grid.state_distribution(collect))
    }

    /// Per-species diagnostic field of the resource grid
    pub fn resource_grid_colors(&self, species: &str, field: ColorField) -> SimResult<Vec<i32>> {
        self.resource_grid
            .as_ref()
            .ok_or(SimError::KernelsNotRegistered)?
            .color_distribution(species, field)
    }

    pub fn resource_grid(&self) -> Option<&ResourceGrid> {
        self.resource_grid.as_ref()
    }

    pub fn animal_count(&self) -> usize {
        self.animals.as_ref().map_or(0, Animals::popsize)
    }

    pub fn population(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.population.size())
    }

    pub fn tree_cover(&self) -> f32 {
        self.state.as_ref().map_or(0.0, |s| s.grid.tree_cover())
    }

    /// Get seed for reproducibility
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn refresh_stats(&mut self) {
        if let Some(state) = self.state.as_ref() {
            self.stats.time = self.time;
            self.stats.update(state);
        }
    }
}

/// Disperse this timestep's crops. Linear and wind crops germinate directly;
/// animal crops become fruit on the resource grid and are dispersed once all are collected.
fn disperse(
    state: &mut State,
    resource_grid: &mut ResourceGrid,
    animals: &mut Animals,
    rng: &mut ChaCha8Rng,
    stats: &mut Stats,
) -> SimResult<()> {
    resource_grid.reset();
    let mut animal_seeds = 0;
    for id in state.population.ids() {
        if !state.population.get(id).is_some_and(|t| t.is_reproductive()) {
            continue;
        }
        let update = state.population.update_crop(id);
        if let Some(reason) = update.eviction_reason() {
            warn!("Evicting tree {}: {}", id, reason);
            state.population.remove(id);
            stats.evicted += 1;
            continue;
        }
        if update == CropUpdate::Clamped {
            stats.clamped_crops += 1;
        }
        let (Some(strategy), Some(crop)) = (state.population.strategy(id), state.population.crop(id)) else {
            continue;
        };
        let (vector, origin, no_diaspora, no_seeds) = (strategy.vector, crop.origin, crop.no_diaspora, crop.no_seeds);
        state.population.kernel(id, vector)?;
        stats.seeds_produced += no_seeds;

        match vector {
            DispersalVector::Animal => {
                resource_grid.add_crop(origin, id, no_diaspora);
                animal_seeds += no_seeds;
            }
            DispersalVector::Linear => stats.germinated_linear += disperse_crop(state, id, rng)?,
            DispersalVector::Wind => stats.germinated_wind += disperse_crop(state, id, rng)?,
        }
    }

    if resource_grid.has_fruits() {
        let summary = animals.disperse(animal_seeds, state, resource_grid, rng)?;
        stats.germinated_animal = summary.germinated as usize;
        stats.animal_seeds_defecated = summary.seeds_defecated;
    }
    debug!(
        "Seeds produced: {}, germinated: {}, fruits left: {}",
        stats.seeds_produced,
        stats.germinated(),
        resource_grid.total_no_fruits()
    );
    Ok(())
}

/// Independent per-tree death trial. Returns the number of deaths.
fn induce_background_mortality(state: &mut State, probability: f32, rng: &mut ChaCha8Rng) -> usize {
    if probability <= 0.0 {
        return 0;
    }
    let victims: Vec<_> = state
        .population
        .ids()
        .into_iter()
        .filter(|_| rng.gen::<f32>() < probability)
        .collect();
    for id in &victims {
        state.population.remove(*id);
    }
    victims.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.grid.gridsize = 40;
        config.grid.cellsize = 1.0;
        config.trees.max_radius = 5.0;
        config.dynamics.initial_tree_cover = 0.3;
        config.dynamics.resource_grid_relative_size = 0.25;
        config.animals.density = 2000.0;
        config
    }

    #[test]
    fn test_dynamics_creation() {
        let dynamics = Dynamics::from_config(test_config(), 7).unwrap();
        assert_eq!(dynamics.time, 0);
        assert!(dynamics.tree_cover() >= 0.3);
        assert!(dynamics.population() > 0);
        assert!(dynamics.animal_count() > 0);
        assert_eq!(dynamics.stats.population, dynamics.population());
    }

    #[test]
    fn test_update_requires_state_and_kernels() {
        let mut dynamics = Dynamics::new_with_seed(test_config(), 1);
        assert!(matches!(dynamics.update(), Err(SimError::StateNotInitialized)));

        dynamics.init_state(20, 1.0, 0.0, 0.05);
        assert!(matches!(dynamics.update(), Err(SimError::KernelsNotRegistered)));

        let (kernels, animals) = (KernelConfig::default(), AnimalConfig::default());
        dynamics.set_global_kernels(&kernels, &animals).unwrap();
        assert!(dynamics.update().is_ok());
        assert_eq!(dynamics.time, 1);
    }

    #[test]
    fn test_update_keeps_grid_consistent() {
        let mut dynamics = Dynamics::from_config(test_config(), 11).unwrap();
        dynamics.run(5).unwrap();
        assert_eq!(dynamics.time, 5);
        let state = dynamics.state().unwrap();
        assert!(state.is_consistent());
        assert_eq!(
            state.grid.no_forest_cells() + state.grid.no_savanna_cells(),
            state.grid.no_cells()
        );
    }

    #[test]
    fn test_background_mortality_one_clears_population() {
        let mut config = test_config();
        config.dynamics.background_mortality = 1.0;
        config.fire.self_ignition_factor = 0.0;
        let mut dynamics = Dynamics::from_config(config, 3).unwrap();
        let before = dynamics.population();
        dynamics.update().unwrap();
        assert_eq!(dynamics.stats.background_deaths, before);
        assert_eq!(dynamics.population(), 0);
        assert_eq!(dynamics.tree_cover(), 0.0);
        assert_eq!(dynamics.termination_cause(100), Some(TerminationCause::PopulationCollapse));
    }

    #[test]
    fn test_termination_on_max_timesteps() {
        let mut config = test_config();
        config.fire.self_ignition_factor = 0.0;
        config.dynamics.background_mortality = 0.0;
        let mut dynamics = Dynamics::from_config(config, 5).unwrap();
        assert_eq!(dynamics.termination_cause(10), None);
        dynamics.run(2).unwrap();
        assert_eq!(dynamics.termination_cause(2), Some(TerminationCause::MaxTimesteps));
    }

    #[test]
    fn test_dispersal_starts_on_second_update() {
        let mut config = test_config();
        config.fire.self_ignition_factor = 0.0;
        config.dynamics.background_mortality = 0.0;
        let mut dynamics = Dynamics::from_config(config, 9).unwrap();
        dynamics.update().unwrap();
        assert_eq!(dynamics.stats.seeds_produced, 0);
        dynamics.update().unwrap();
        assert!(dynamics.stats.seeds_produced > 0);
    }

    #[test]
    fn test_resource_grid_colors() {
        let dynamics = Dynamics::from_config(test_config(), 13).unwrap();
        let colors = dynamics.resource_grid_colors("bird", ColorField::Cover).unwrap();
        assert_eq!(colors.len(), dynamics.resource_grid().map_or(0, ResourceGrid::no_cells));
        assert!(matches!(
            dynamics.resource_grid_colors("bat", ColorField::Cover),
            Err(SimError::UnknownSpecies(_))
        ));
    }

    #[test]
    fn test_reproducibility() {
        let mut a = Dynamics::from_config(test_config(), 42).unwrap();
        let mut b = Dynamics::from_config(test_config(), 42).unwrap();
        a.run(5).unwrap();
        b.run(5).unwrap();
        assert_eq!(a.population(), b.population());
        assert_eq!(a.stats.cells_burned, b.stats.cells_burned);
        assert_eq!(a.state().unwrap().tree_positions(), b.state().unwrap().tree_positions());
    }
}

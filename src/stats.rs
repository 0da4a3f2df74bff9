//! Statistics tracking for the simulation.

use crate::state::State;
use crate::strategy::DispersalVector;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Statistics snapshot for a simulation step
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Current simulation time
    pub time: u64,
    /// Total population count
    pub population: usize,
    /// Trees past the seed-bearing threshold
    pub reproductive: usize,
    /// Fraction of forest cells
    pub tree_cover: f32,
    pub savanna_cells: usize,
    pub forest_cells: usize,
    /// Trees per dispersal vector
    pub linear_trees: usize,
    pub wind_trees: usize,
    pub animal_trees: usize,
    /// Fires this step
    pub fires: usize,
    pub cells_burned: usize,
    /// Mean burned area per fire (m²)
    pub fire_spatial_extent: f32,
    /// Seeds produced by all crops this step
    pub seeds_produced: u64,
    pub germinated_linear: usize,
    pub germinated_wind: usize,
    pub germinated_animal: usize,
    /// Seeds deposited by animals after the burn-in
    pub animal_seeds_defecated: u64,
    /// Trees killed in fire-affected forest cells
    pub fire_deaths: usize,
    /// Seedlings cleared from burning savanna cells
    pub seedlings_burned: usize,
    pub background_deaths: usize,
    /// Trees removed because of a malformed identity or crop
    pub evicted: usize,
    /// Crops whose negative mass was clamped
    pub clamped_crops: usize,
    /// Steps per second (performance)
    pub steps_per_second: f32,
}

impl Stats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Update landscape and population fields from the current state
    pub fn update(&mut self, state: &State) {
        self.population = state.population.size();
        self.reproductive = state.population.reproductive_count();
        self.tree_cover = state.grid.tree_cover();
        self.savanna_cells = state.grid.no_savanna_cells();
        self.forest_cells = state.grid.no_forest_cells();

        let counts = state.population.vector_counts();
        let count = |vector| counts.get(&vector).copied().unwrap_or(0);
        self.linear_trees = count(DispersalVector::Linear);
        self.wind_trees = count(DispersalVector::Wind);
        self.animal_trees = count(DispersalVector::Animal);
    }

    /// Zero the per-step event counters
    pub fn reset_counters(&mut self) {
        self.fires = 0;
        self.cells_burned = 0;
        self.fire_spatial_extent = 0.0;
        self.seeds_produced = 0;
        self.germinated_linear = 0;
        self.germinated_wind = 0;
        self.germinated_animal = 0;
        self.animal_seeds_defecated = 0;
        self.fire_deaths = 0;
        self.seedlings_burned = 0;
        self.background_deaths = 0;
        self.evicted = 0;
        self.clamped_crops = 0;
    }

    pub fn germinated(&self) -> usize {
        self.germinated_linear + self.germinated_wind + self.germinated_animal
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "T:{:6} | Cover:{:.3} | Trees:{:6} | Repr:{:5} | Fires:{:3} | Burned:{:6} | Seeds:{:7} | Germ:{:5}",
            self.time,
            self.tree_cover,
            self.population,
            self.reproductive,
            self.fires,
            self.cells_burned,
            self.seeds_produced,
            self.germinated(),
        )
    }
}

/// Historical statistics tracker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    /// All recorded stats snapshots
    pub snapshots: Vec<Stats>,
    /// Recording interval
    pub interval: u64,
}

impl StatsHistory {
    /// Create new history with recording interval
    pub fn new(interval: u64) -> Self {
        Self {
            snapshots: Vec::new(),
            interval: interval.max(1),
        }
    }

    pub fn should_record(&self, time: u64) -> bool {
        time % self.interval == 0
    }

    /// Record a stats snapshot
    pub fn record(&mut self, stats: Stats) {
        self.snapshots.push(stats);
    }

    /// Latest snapshot at or before `time`
    pub fn get_at(&self, time: u64) -> Option<&Stats> {
        self.snapshots.iter().rev().find(|s| s.time <= time)
    }

    /// Get population over time
    pub fn population_series(&self) -> Vec<(u64, usize)> {
        self.snapshots.iter().map(|s| (s.time, s.population)).collect()
    }

    /// Get tree cover over time
    pub fn tree_cover_series(&self) -> Vec<(u64, f32)> {
        self.snapshots.iter().map(|s| (s.time, s.tree_cover)).collect()
    }

    /// Get burned cells over time
    pub fn fire_series(&self) -> Vec<(u64, usize)> {
        self.snapshots.iter().map(|s| (s.time, s.cells_burned)).collect()
    }

    /// Save history to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
    }

    /// Load history from file
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

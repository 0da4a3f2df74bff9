//! Wildfire: ignition, percolation over the landscape and fire mortality.

use crate::error::SimResult;
use crate::grid::{BURNED_COLOR, REVERTED_COLOR};
use crate::probability::sigmoid;
use crate::state::State;
use crate::tree::{Tree, TreeId};
use log::{debug, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Re-ignition attempts per timestep for fires that fail to spread
pub const MAX_REIGNITIONS: usize = 5;

/// A cell whose last fire lies within this interval of an ignition belongs to that fire
const SAME_FIRE_EPSILON: f32 = 1e-3;

/// Fire regime parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FireConfig {
    /// Ignitions per mm rainfall per million savanna cells
    pub self_ignition_factor: f32,
    /// Annual rainfall (mm)
    pub rainfall: f32,
    /// Flammability of savanna with a full year of fuel
    pub unsuppressed_flammability: f32,
    /// Forest flammability bounds, per metre of cell width
    pub min_suppressed_flammability: f32,
    pub max_suppressed_flammability: f32,
    /// Cumulative radius (fraction of max radius) where suppression starts
    pub radius_suppr_flamm_min: f32,
    /// Range (fraction of max radius) over which suppression ramps to its floor
    pub radius_range_suppr_flamm: f32,
    /// Bark thickness (mm) mapped to the low end of the survival sigmoid
    pub fire_resistance_argmin: f32,
    /// Bark thickness (mm) mapped to the high end of the survival sigmoid
    pub fire_resistance_argmax: f32,
    pub fire_resistance_stretch: f32,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            self_ignition_factor: 1.0,
            rainfall: 1000.0,
            unsuppressed_flammability: 0.4,
            min_suppressed_flammability: 0.05,
            max_suppressed_flammability: 0.4,
            radius_suppr_flamm_min: 0.5,
            radius_range_suppr_flamm: 0.5,
            fire_resistance_argmin: 1.0,
            fire_resistance_argmax: 15.0,
            fire_resistance_stretch: 5.0,
        }
    }
}

impl FireConfig {
    pub fn validate(&self) -> Result<(), String> {
        let non_negative = [
            ("self_ignition_factor", self.self_ignition_factor),
            ("rainfall", self.rainfall),
            ("unsuppressed_flammability", self.unsuppressed_flammability),
            ("min_suppressed_flammability", self.min_suppressed_flammability),
            ("max_suppressed_flammability", self.max_suppressed_flammability),
            ("radius_suppr_flamm_min", self.radius_suppr_flamm_min),
        ];
        for (name, value) in non_negative {
            if value < 0.0 {
                return Err(format!("fire.{} must be >= 0", name));
            }
        }
        if self.radius_range_suppr_flamm <= 0.0 {
            return Err("fire.radius_range_suppr_flamm must be > 0".to_string());
        }
        if self.fire_resistance_argmax <= self.fire_resistance_argmin {
            return Err("fire.fire_resistance_argmax must exceed fire_resistance_argmin".to_string());
        }
        Ok(())
    }
}

/// Outcome of one timestep's fires
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FireSummary {
    pub fires: usize,
    pub reignitions: usize,
    pub cells_burned: usize,
    pub trees_killed: usize,
    pub seedlings_killed: usize,
    /// Mean burned area per fire (m²)
    pub mean_spatial_extent: f32,
}

pub struct FireRegime {
    config: FireConfig,
    cellsize: f32,
    max_suppressed: f32,
    min_suppressed: f32,
    radius_min: f32,
    slope: f32,
}

impl FireRegime {
    pub fn new(config: FireConfig, cellsize: f32, max_radius: f32) -> Self {
        let max_suppressed = cellsize * config.max_suppressed_flammability;
        let min_suppressed = cellsize * config.min_suppressed_flammability;
        let radius_min = max_radius * config.radius_suppr_flamm_min;
        let slope = (min_suppressed - max_suppressed) / (max_radius * config.radius_range_suppr_flamm);
        Self {
            config,
            cellsize,
            max_suppressed,
            min_suppressed,
            radius_min,
            slope,
        }
    }

    pub fn config(&self) -> &FireConfig {
        &self.config
    }

    /// Forest flammability for a cell with cumulative crown radius `cumulative_radius`
    pub fn forest_flammability(&self, cumulative_radius: f32) -> f32 {
        if cumulative_radius <= 0.0 {
            return self.config.unsuppressed_flammability;
        }
        let d_radius = (cumulative_radius - self.radius_min).max(0.0);
        (self.max_suppressed + d_radius * self.slope).max(self.min_suppressed) / cumulative_radius
    }

    /// Savanna flammability grows with accumulated fuel, saturating after one year
    pub fn savanna_flammability(&self, fire_free_interval: f32) -> f32 {
        fire_free_interval.clamp(0.0, 1.0) * self.config.unsuppressed_flammability
    }

    /// Allometric stem diameter (cm) from crown diameter (m)
    pub fn stem_diameter(crown_diameter: f32) -> f32 {
        10f32.powf((crown_diameter.log10() + 0.12) / 0.63)
    }

    /// Bark thickness (mm) from stem diameter (cm)
    pub fn bark_thickness(stem_diameter: f32) -> f32 {
        0.31 * stem_diameter.powf(1.276)
    }

    pub fn survival_probability(&self, radius: f32) -> f32 {
        let bark = Self::bark_thickness(Self::stem_diameter(2.0 * radius));
        sigmoid(
            bark,
            self.config.fire_resistance_argmin,
            self.config.fire_resistance_argmax,
            self.config.fire_resistance_stretch,
        )
    }

    pub fn tree_dies<R: Rng + ?Sized>(&self, tree: &Tree, rng: &mut R) -> bool {
        rng.gen::<f32>() > self.survival_probability(tree.radius)
    }

    /// Fractional ignition times within timestep `time`, ascending
    pub fn ignition_times<R: Rng + ?Sized>(&self, time: u64, no_savanna_cells: usize, rng: &mut R) -> Vec<f32> {
        let expected = self.config.self_ignition_factor * self.config.rainfall * no_savanna_cells as f32 / 1e6;
        let count = expected.round().max(0.0) as usize;
        let mut times: Vec<f32> = (0..count).map(|_| time as f32 + rng.gen::<f32>()).collect();
        times.sort_by(|a, b| a.total_cmp(b));
        times
    }

    /// Run this timestep's fires. Fails only if no savanna cell can be found to ignite.
    pub fn burn<R: Rng + ?Sized>(&self, state: &mut State, time: u64, rng: &mut R) -> SimResult<FireSummary> {
        let mut summary = FireSummary::default();
        let ignition_times = self.ignition_times(time, state.grid.no_savanna_cells(), rng);
        let mut i = 0;
        while i < ignition_times.len() {
            let t_start = ignition_times[i];
            let origin = state.grid.random_savanna_cell(rng)?;
            let burned = self.percolate(state, origin, t_start, time, rng, &mut summary);
            summary.cells_burned += burned;
            if burned <= 1 && summary.reignitions < MAX_REIGNITIONS {
                summary.reignitions += 1;
                continue;
            }
            summary.fires += 1;
            i += 1;
        }
        if summary.fires > 0 {
            let cell_area = self.cellsize * self.cellsize;
            summary.mean_spatial_extent = summary.cells_burned as f32 * cell_area / summary.fires as f32;
        }
        debug!(
            "Fires: {}, cells burned: {}, trees killed: {}, seedlings killed: {}",
            summary.fires, summary.cells_burned, summary.trees_killed, summary.seedlings_killed
        );
        Ok(summary)
    }

    /// Breadth-first spread over the Moore neighbourhood from `origin`.
    /// Returns the number of cells burned.
    pub fn percolate<R: Rng + ?Sized>(
        &self,
        state: &mut State,
        origin: usize,
        t_start: f32,
        time: u64,
        rng: &mut R,
        summary: &mut FireSummary,
    ) -> usize {
        let mut queue = VecDeque::new();
        self.burn_cell(state, origin, t_start, time, rng, &mut queue, summary);
        queue.push_back(origin);
        let mut burned = 1;
        while let Some(idx) = queue.pop_front() {
            for neighbor in state.grid.neighbors(idx) {
                if self.cell_will_ignite(state, neighbor, t_start, rng) {
                    self.burn_cell(state, neighbor, t_start, time, rng, &mut queue, summary);
                    queue.push_back(neighbor);
                    burned += 1;
                }
            }
        }
        trace!("Fire at t={:.3} burned {} cells", t_start, burned);
        burned
    }

    fn cell_will_ignite<R: Rng + ?Sized>(&self, state: &State, idx: usize, t_start: f32, rng: &mut R) -> bool {
        let cell = state.grid.cell(idx);
        let fire_free_interval = t_start - cell.time_last_fire;
        if fire_free_interval < SAME_FIRE_EPSILON {
            return false;
        }
        let flammability = if cell.is_forest() {
            self.forest_flammability(cell.cumulative_radius)
        } else {
            self.savanna_flammability(fire_free_interval)
        };
        rng.gen::<f32>() < flammability
    }

    #[allow(clippy::too_many_arguments)]
    fn burn_cell<R: Rng + ?Sized>(
        &self,
        state: &mut State,
        idx: usize,
        t_start: f32,
        time: u64,
        rng: &mut R,
        queue: &mut VecDeque<usize>,
        summary: &mut FireSummary,
    ) {
        state.grid.cell_mut(idx).time_last_fire = t_start;
        state.grid.mark(idx, BURNED_COLOR);
        if state.grid.cell(idx).is_forest() {
            summary.trees_killed += self.induce_tree_mortality(state, idx, t_start, time, rng, queue);
        } else {
            summary.seedlings_killed += kill_seedlings(state, idx);
        }
    }

    fn induce_tree_mortality<R: Rng + ?Sized>(
        &self,
        state: &mut State,
        idx: usize,
        t_start: f32,
        time: u64,
        rng: &mut R,
        queue: &mut VecDeque<usize>,
    ) -> usize {
        let occupants: Vec<TreeId> = state.grid.cell(idx).trees.iter().copied().collect();
        let mut killed = 0;
        for id in occupants {
            let Some(tree) = state.population.get_mut(id) else {
                continue;
            };
            if tree.last_mortality_check == Some(time) {
                continue;
            }
            tree.last_mortality_check = Some(time);
            let tree = tree.clone();
            if self.tree_dies(&tree, rng) {
                kill_tree(state, &tree, t_start, queue);
                killed += 1;
            }
        }
        killed
    }
}

/// Remove a burned tree; its domain becomes additional fire front
fn kill_tree(state: &mut State, tree: &Tree, t_start: f32, queue: &mut VecDeque<usize>) {
    trace!("Fire killed tree {} (r={:.2})", tree.id, tree.radius);
    for released in state.grid.release_tree_domain(tree, Some(t_start)) {
        queue.push_back(released.idx);
        if released.reverted {
            state.grid.mark(released.idx, REVERTED_COLOR);
        } else if state.grid.cell(released.idx).is_forest() {
            state.grid.mark(released.idx, BURNED_COLOR);
        }
    }
    state.population.remove(tree.id);
}

/// Remove every tree rooted in a burning savanna cell. Returns how many.
fn kill_seedlings(state: &mut State, idx: usize) -> usize {
    let occupants: Vec<TreeId> = state.grid.cell(idx).trees.iter().copied().collect();
    for id in &occupants {
        if let Some(tree) = state.population.remove(*id) {
            state.grid.release_tree_domain(&tree, None);
        }
    }
    state.grid.cell_mut(idx).trees.clear();
    occupants.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::grid::GridConfig;
    use crate::population::TreeConfig;
    use crate::strategy::StrategyConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state(gridsize: usize) -> State {
        let trees = TreeConfig {
            max_radius: 5.0,
            ..TreeConfig::default()
        };
        State::new(&GridConfig { gridsize, cellsize: 1.0 }, trees, StrategyConfig::default(), 0.05)
    }

    fn regime(config: FireConfig) -> FireRegime {
        FireRegime::new(config, 1.0, 5.0)
    }

    #[test]
    fn test_full_flammability_burns_entire_landscape() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let n = 15;
        let mut state = state(n);
        let fire = regime(FireConfig {
            unsuppressed_flammability: 1.0,
            ..FireConfig::default()
        });
        let mut summary = FireSummary::default();
        let burned = fire.percolate(&mut state, 7, 10.5, 10, &mut rng, &mut summary);
        assert_eq!(burned, n * n);
        assert!(state.grid.cells().iter().all(|c| c.time_last_fire == 10.5));
    }

    #[test]
    fn test_cell_burned_by_current_fire_does_not_reignite() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut state = state(10);
        let fire = regime(FireConfig {
            unsuppressed_flammability: 1.0,
            ..FireConfig::default()
        });
        let mut summary = FireSummary::default();
        fire.percolate(&mut state, 0, 3.2, 3, &mut rng, &mut summary);
        assert_eq!(fire.percolate(&mut state, 0, 3.2, 3, &mut rng, &mut summary), 1);
    }

    #[test]
    fn test_zero_flammability_confines_fire() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = state(10);
        let fire = regime(FireConfig {
            unsuppressed_flammability: 0.0,
            ..FireConfig::default()
        });
        let mut summary = FireSummary::default();
        assert_eq!(fire.percolate(&mut state, 55, 1.5, 1, &mut rng, &mut summary), 1);
    }

    #[test]
    fn test_forest_flammability_decreases_with_biomass() {
        let fire = regime(FireConfig::default());
        let sparse = fire.forest_flammability(1.0);
        let dense = fire.forest_flammability(8.0);
        assert!(sparse > dense);
        assert!(dense > 0.0);
        assert_eq!(fire.savanna_flammability(3.0), fire.config().unsuppressed_flammability);
        assert!(fire.savanna_flammability(0.5) < fire.savanna_flammability(1.0));
    }

    #[test]
    fn test_larger_trees_survive_fire_more_often() {
        let fire = regime(FireConfig::default());
        assert!(fire.survival_probability(5.0) > fire.survival_probability(0.5));
        let d = FireRegime::stem_diameter(2.0);
        assert!(FireRegime::bark_thickness(d) > 0.0);
    }

    #[test]
    fn test_ignition_times_sorted_within_timestep() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let fire = regime(FireConfig {
            self_ignition_factor: 10.0,
            rainfall: 1000.0,
            ..FireConfig::default()
        });
        let times = fire.ignition_times(7, 500, &mut rng);
        assert_eq!(times.len(), 5);
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(times.iter().all(|t| (7.0..8.0).contains(t)));
        assert!(regime(FireConfig { self_ignition_factor: 0.0, ..FireConfig::default() })
            .ignition_times(7, 500, &mut rng)
            .is_empty());
    }

    #[test]
    fn test_fire_kills_seedlings_and_thin_trees() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut state = state(20);
        let fire = regime(FireConfig {
            unsuppressed_flammability: 1.0,
            min_suppressed_flammability: 10.0,
            max_suppressed_flammability: 10.0,
            fire_resistance_argmin: 1000.0,
            fire_resistance_argmax: 2000.0,
            fire_resistance_stretch: 50.0,
            ..FireConfig::default()
        });
        for i in 0..10 {
            state.population.add(Point::new(2.0 * i as f32 + 0.5, 10.5), None, Some(1.5), &mut rng);
        }
        state.repopulate_grid();
        let mut summary = FireSummary::default();
        fire.percolate(&mut state, 0, 2.5, 2, &mut rng, &mut summary);
        assert_eq!(state.population.size(), 0);
        assert_eq!(summary.trees_killed + summary.seedlings_killed, 10);
        assert!(state.is_consistent());
        assert_eq!(state.grid.no_forest_cells(), 0);
    }

    #[test]
    fn test_fire_through_savanna_removes_seedlings() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut state = state(10);
        let fire = regime(FireConfig {
            unsuppressed_flammability: 1.0,
            ..FireConfig::default()
        });
        let parent = state.population.generator().sample(&mut rng);
        let a = state.attempt_germination(Point::new(5.5, 5.5), &parent, &mut rng);
        let b = state.attempt_germination(Point::new(2.5, 7.5), &parent, &mut rng);
        assert!(a.is_some() && b.is_some());
        assert_eq!(state.grid.no_forest_cells(), 0);

        let mut summary = FireSummary::default();
        let burned = fire.percolate(&mut state, 0, 2.5, 2, &mut rng, &mut summary);
        assert_eq!(burned, 100);
        assert_eq!(summary.seedlings_killed, 2);
        assert_eq!(summary.trees_killed, 0);
        assert!(state.population.is_empty());
        assert!(state.grid.cells().iter().all(|c| c.trees.is_empty() && c.cumulative_radius == 0.0));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_burn_retries_failed_ignitions() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut state = state(20);
        let fire = regime(FireConfig {
            self_ignition_factor: 2.5,
            rainfall: 1000.0,
            unsuppressed_flammability: 0.0,
            ..FireConfig::default()
        });
        let summary = fire.burn(&mut state, 1, &mut rng).unwrap();
        assert_eq!(summary.fires, 1);
        assert_eq!(summary.reignitions, MAX_REIGNITIONS);
        assert_eq!(summary.cells_burned, MAX_REIGNITIONS + 1);
    }
}

//! Landscape state: the grid together with the population it must mirror.

use crate::geometry::Point;
use crate::grid::{Grid, GridConfig};
use crate::population::{Population, TreeConfig};
use crate::strategy::{Strategy, StrategyConfig, StrategyGenerator};
use crate::tree::TreeId;
use log::{debug, info, warn};
use rand::Rng;

/// Grid and population, kept mutually consistent between timesteps
pub struct State {
    pub grid: Grid,
    pub population: Population,
}

impl State {
    pub fn new(grid: &GridConfig, trees: TreeConfig, strategy: StrategyConfig, seed_mass: f32) -> Self {
        Self {
            grid: Grid::new(grid.gridsize, grid.cellsize),
            population: Population::new(trees, StrategyGenerator::new(strategy, seed_mass)),
        }
    }

    /// Distance on the torus: the minimum over the direct distance and the 8 periodic images
    pub fn periodic_distance(&self, a: Point, b: Point) -> f32 {
        let w = self.grid.width_r();
        let mut min = a.dist(b);
        for dx in -1..=1 {
            for dy in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let image = Point::new(b.x + dx as f32 * w, b.y + dy as f32 * w);
                min = min.min(a.dist(image));
            }
        }
        min
    }

    /// Rebuild cell occupancy from the population. Trees with a malformed
    /// identity are evicted; returns how many.
    pub fn repopulate_grid(&mut self) -> usize {
        self.grid.reset();
        let mut malformed = Vec::new();
        for (key, tree) in self.population.entries() {
            if !key.is_valid() || tree.id != key {
                malformed.push(key);
                continue;
            }
            self.grid.populate_tree_domain(tree);
        }
        for key in &malformed {
            warn!("Evicting malformed tree registered under id {}", key);
            self.population.remove(*key);
        }
        debug!("Repopulated grid: {} forest cells", self.grid.no_forest_cells());
        malformed.len()
    }

    /// Plant randomly placed trees of sampled size until the tree cover reaches `target`
    pub fn set_tree_cover<R: Rng + ?Sized>(&mut self, target: f32, rng: &mut R) {
        self.grid.reset();
        while self.grid.tree_cover() < target {
            let position = self.grid.random_real_position(rng);
            let id = self.population.add(position, None, None, rng);
            if let Some(tree) = self.population.get(id) {
                self.grid.populate_tree_domain(tree);
            }
            if self.population.size() % 1000 == 0 {
                info!(
                    "Current tree cover: {:.3}, population size: {}",
                    self.grid.tree_cover(),
                    self.population.size()
                );
            }
        }
        info!("Final tree cover: {:.3}", self.grid.tree_cover());

        if !self.population.is_empty() {
            let half = self.population.max_radius() / 2.0;
            let small = self.population.trees().filter(|t| t.radius < half).count();
            info!("Fraction small trees: {:.3}", small as f32 / self.population.size() as f32);
        }
    }

    /// Trees whose stem lies within `search_radius` of `position`, excluding `exclude`
    pub fn tree_neighbors(&self, position: Point, search_radius: f32, exclude: Option<TreeId>) -> Vec<TreeId> {
        self.population
            .trees()
            .filter(|t| Some(t.id) != exclude)
            .filter(|t| self.periodic_distance(t.position, position) < search_radius)
            .map(|t| t.id)
            .collect()
    }

    /// `(id, x, y, radius)` rows in identity order
    pub fn tree_positions(&self) -> Vec<(TreeId, f32, f32, f32)> {
        self.population
            .trees()
            .map(|t| (t.id, t.position.x, t.position.y, t.radius))
            .collect()
    }

    /// Germinate a seed of `parent`'s lineage at `location` unless the cell is too crowded.
    /// A seedling immediately occupies its stem cell but leaves it savanna. Returns the new tree, if any.
    pub fn attempt_germination<R: Rng + ?Sized>(
        &mut self,
        location: Point,
        parent: &Strategy,
        rng: &mut R,
    ) -> Option<TreeId> {
        let location = self.grid.wrap_real(location);
        let cell = self.grid.cell(self.grid.cell_index_at_real(location));
        let crowding = cell.cumulative_radius / self.population.config().saturation_threshold;
        if rng.gen::<f32>() < crowding {
            return None;
        }
        let seedling_radius = self.population.config().seedling_radius;
        let id = self.population.add(location, Some(parent), Some(seedling_radius), rng);
        if let Some(tree) = self.population.get(id) {
            self.grid.populate_tree_domain(tree);
        }
        Some(id)
    }

    /// Every occupant of every cell is a live tree and every live tree occupies its stem cell
    pub fn is_consistent(&self) -> bool {
        let occupants_live = self
            .grid
            .cells()
            .iter()
            .all(|c| c.trees.iter().all(|id| self.population.contains(*id)));
        let trees_placed = self.population.trees().all(|t| {
            let stem = self.grid.cell_index_at_real(t.position);
            self.grid.cell(stem).trees.contains(&t.id)
        });
        occupants_live && trees_placed
    }
}

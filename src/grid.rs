//! Toroidal landscape grid tracking forest/savanna state and fire history.

use crate::error::{SimError, SimResult};
use crate::geometry::Point;
use crate::tree::{Tree, TreeId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Attempts made by [`Grid::random_savanna_cell`] before giving up
pub const SAVANNA_FETCH_ATTEMPTS: usize = 1_000_000;

/// Residual cumulative radius, as a fraction of the cell size, below which a cell reverts to savanna
pub const FOREST_OCCUPANCY_FRACTION: f32 = 0.7;

/// Land-cover code for a cell burned by the current timestep's fires
pub const BURNED_COLOR: i32 = -5;
/// Land-cover code for a burned cell that reverted from forest to savanna
pub const REVERTED_COLOR: i32 = -6;

const MOORE_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Landscape dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per side
    pub gridsize: usize,
    /// Cell width (m)
    pub cellsize: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            gridsize: 200,
            cellsize: 1.5,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.gridsize == 0 {
            return Err("grid.gridsize must be > 0".to_string());
        }
        if self.cellsize <= 0.0 {
            return Err("grid.cellsize must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Savanna,
    Forest,
}

#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub idx: usize,
    pub x: usize,
    pub y: usize,
    pub state: CellState,
    /// Simulation time of the last fire; 0 for cells that were (re)forested
    pub time_last_fire: f32,
    /// Sum of the radii of all occupying trees
    pub cumulative_radius: f32,
    /// Occupying trees in ascending identity order
    pub trees: BTreeSet<TreeId>,
}

impl Cell {
    #[inline]
    pub fn is_forest(&self) -> bool {
        self.state == CellState::Forest
    }
}

/// Outcome of releasing one cell of a tree's domain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleasedCell {
    pub idx: usize,
    /// Cell changed from forest to savanna
    pub reverted: bool,
}

/// Periodic `width × width` grid of [`Cell`]s
#[derive(Clone, Debug)]
pub struct Grid {
    width: usize,
    cellsize: f32,
    cells: Vec<Cell>,
    state_distribution: Vec<i32>,
    no_savanna_cells: usize,
    no_forest_cells: usize,
}

impl Grid {
    pub fn new(width: usize, cellsize: f32) -> Self {
        let no_cells = width * width;
        let cells = (0..no_cells)
            .map(|idx| Cell {
                idx,
                x: idx % width,
                y: idx / width,
                ..Cell::default()
            })
            .collect();
        Self {
            width,
            cellsize,
            cells,
            state_distribution: vec![0; no_cells],
            no_savanna_cells: no_cells,
            no_forest_cells: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn cellsize(&self) -> f32 {
        self.cellsize
    }

    #[inline]
    pub fn no_cells(&self) -> usize {
        self.cells.len()
    }

    /// Landscape side length (m)
    #[inline]
    pub fn width_r(&self) -> f32 {
        self.width as f32 * self.cellsize
    }

    /// Landscape area (m²)
    pub fn area(&self) -> f32 {
        self.width_r() * self.width_r()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn cell(&self, idx: usize) -> &Cell {
        &self.cells[idx]
    }

    #[inline]
    pub fn cell_mut(&mut self, idx: usize) -> &mut Cell {
        &mut self.cells[idx]
    }

    /// Wrap unbounded grid coordinates onto the torus
    #[inline]
    pub fn cap(&self, x: i64, y: i64) -> (usize, usize) {
        let w = self.width as i64;
        (x.rem_euclid(w) as usize, y.rem_euclid(w) as usize)
    }

    #[inline]
    pub fn cell_index(&self, x: i64, y: i64) -> usize {
        let (x, y) = self.cap(x, y);
        y * self.width + x
    }

    /// Unwrapped grid coordinates of the cell containing a real position
    #[inline]
    pub fn grid_position(&self, position: Point) -> (i64, i64) {
        (
            (position.x / self.cellsize).floor() as i64,
            (position.y / self.cellsize).floor() as i64,
        )
    }

    pub fn cell_index_at_real(&self, position: Point) -> usize {
        let (x, y) = self.grid_position(position);
        self.cell_index(x, y)
    }

    /// Real position of a cell's origin corner
    #[inline]
    pub fn real_position(&self, x: i64, y: i64) -> Point {
        Point::new(x as f32 * self.cellsize, y as f32 * self.cellsize)
    }

    /// Wrap a real position into `[0, width_r)²`
    pub fn wrap_real(&self, position: Point) -> Point {
        let w = self.width_r();
        let x = position.x.rem_euclid(w);
        let y = position.y.rem_euclid(w);
        // rem_euclid may round up to w for tiny negative inputs
        Point::new(if x >= w { 0.0 } else { x }, if y >= w { 0.0 } else { y })
    }

    pub fn random_real_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        let w = self.width_r();
        Point::new(rng.gen_range(0.0..w), rng.gen_range(0.0..w))
    }

    pub fn random_grid_position<R: Rng + ?Sized>(&self, rng: &mut R) -> (usize, usize) {
        (rng.gen_range(0..self.width), rng.gen_range(0..self.width))
    }

    /// Index of a uniformly chosen savanna cell
    pub fn random_savanna_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> SimResult<usize> {
        if self.no_savanna_cells == 0 {
            return Err(SimError::NoSavannaCell { attempts: 0 });
        }
        for _ in 0..SAVANNA_FETCH_ATTEMPTS {
            let (x, y) = self.random_grid_position(rng);
            let idx = y * self.width + x;
            if !self.cells[idx].is_forest() {
                return Ok(idx);
            }
        }
        Err(SimError::NoSavannaCell {
            attempts: SAVANNA_FETCH_ATTEMPTS,
        })
    }

    /// Moore neighbourhood of a cell, wrapped
    pub fn neighbors(&self, idx: usize) -> [usize; 8] {
        let (x, y) = ((idx % self.width) as i64, (idx / self.width) as i64);
        MOORE_OFFSETS.map(|(dx, dy)| self.cell_index(x + dx, y + dy))
    }

    /// Cells whose origin lies strictly within the crown of `tree`, plus its stem cell
    pub fn tree_domain(&self, tree: &Tree) -> Vec<usize> {
        self.crown_cells(tree).into_iter().map(|(idx, _)| idx).collect()
    }

    /// Domain cells paired with whether the crown covers the cell origin.
    /// The stem cell always comes first.
    fn crown_cells(&self, tree: &Tree) -> Vec<(usize, bool)> {
        let (cx, cy) = self.grid_position(tree.position);
        let reach = (tree.radius / self.cellsize).ceil() as i64 + 1;
        let stem = self.cell_index(cx, cy);
        let mut domain = vec![(stem, tree.is_within_radius(self.real_position(cx, cy)))];
        for x in (cx - reach)..=(cx + reach) {
            for y in (cy - reach)..=(cy + reach) {
                if !tree.is_within_radius(self.real_position(x, y)) {
                    continue;
                }
                let idx = self.cell_index(x, y);
                match domain.iter_mut().find(|(i, _)| *i == idx) {
                    Some(entry) => entry.1 = true,
                    None => domain.push((idx, true)),
                }
            }
        }
        domain
    }

    /// Register `tree` in its domain. A cell turns forest when the crown covers
    /// its origin or its cumulative radius reaches the occupancy threshold, so a
    /// seedling only occupies its stem cell.
    pub fn populate_tree_domain(&mut self, tree: &Tree) {
        let threshold = self.cellsize * FOREST_OCCUPANCY_FRACTION;
        for (idx, covered) in self.crown_cells(tree) {
            self.occupy(idx, tree);
            if covered || self.cells[idx].cumulative_radius >= threshold {
                self.set_to_forest(idx);
            }
        }
    }

    /// Withdraw `tree` from its domain. Cells left with too little crown cover
    /// revert to savanna; `time_last_fire` is stamped on them when given.
    pub fn release_tree_domain(&mut self, tree: &Tree, time_last_fire: Option<f32>) -> Vec<ReleasedCell> {
        let threshold = self.cellsize * FOREST_OCCUPANCY_FRACTION;
        let mut released = Vec::new();
        for idx in self.tree_domain(tree) {
            let cell = &mut self.cells[idx];
            if !cell.trees.remove(&tree.id) {
                released.push(ReleasedCell { idx, reverted: false });
                continue;
            }
            cell.cumulative_radius = if cell.trees.is_empty() {
                0.0
            } else {
                (cell.cumulative_radius - tree.radius).max(0.0)
            };
            let reverted = cell.is_forest() && cell.cumulative_radius < threshold;
            if reverted {
                self.set_to_savanna(idx, time_last_fire);
            }
            released.push(ReleasedCell { idx, reverted });
        }
        released
    }

    /// Add `tree` to the occupants of a cell without changing its land cover
    fn occupy(&mut self, idx: usize, tree: &Tree) {
        let cell = &mut self.cells[idx];
        if cell.trees.insert(tree.id) {
            cell.cumulative_radius += tree.radius;
        }
    }

    pub fn set_to_forest(&mut self, idx: usize) {
        let cell = &mut self.cells[idx];
        if !cell.is_forest() {
            self.no_savanna_cells -= 1;
            self.no_forest_cells += 1;
        }
        cell.state = CellState::Forest;
        cell.time_last_fire = 0.0;
    }

    pub fn set_to_savanna(&mut self, idx: usize, time_last_fire: Option<f32>) {
        let cell = &mut self.cells[idx];
        if cell.is_forest() {
            self.no_savanna_cells += 1;
            self.no_forest_cells -= 1;
        }
        cell.state = CellState::Savanna;
        if let Some(t) = time_last_fire {
            cell.time_last_fire = t;
        }
    }

    /// Clear all occupancy; fire history is kept
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.state = CellState::Savanna;
            cell.trees.clear();
            cell.cumulative_radius = 0.0;
        }
        self.no_forest_cells = 0;
        self.no_savanna_cells = self.cells.len();
    }

    /// Recount savanna and forest cells from cell states
    pub fn redo_count(&mut self) {
        self.no_forest_cells = self.cells.iter().filter(|c| c.is_forest()).count();
        self.no_savanna_cells = self.cells.len() - self.no_forest_cells;
    }

    #[inline]
    pub fn no_savanna_cells(&self) -> usize {
        self.no_savanna_cells
    }

    #[inline]
    pub fn no_forest_cells(&self) -> usize {
        self.no_forest_cells
    }

    pub fn tree_cover(&self) -> f32 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.no_forest_cells as f32 / self.cells.len() as f32
    }

    /// Set a transient land-cover code (burn marks) for a cell
    #[inline]
    pub fn mark(&mut self, idx: usize, color: i32) {
        self.state_distribution[idx] = color;
    }

    pub fn reset_state_distribution(&mut self) {
        self.state_distribution.fill(0);
    }

    /// Dense land-cover map: 0 savanna, `1..=100` forest by first occupant,
    /// negative codes for burned cells. With `collect`, forest codes are
    /// refreshed from the current cell states first.
    pub fn state_distribution(&mut self, collect: bool) -> &[i32] {
        if collect {
            for (code, cell) in self.state_distribution.iter_mut().zip(&self.cells) {
                if cell.is_forest() {
                    *code = match cell.trees.iter().next() {
                        Some(id) => (id.0 % 100) as i32 + 1,
                        None => 1,
                    };
                }
            }
        }
        &self.state_distribution
    }

    /// Time since the last fire, per cell
    pub fn fire_free_intervals(&self, time: f32) -> Vec<f32> {
        self.cells.iter().map(|c| time - c.time_last_fire).collect()
    }
}

//! Coarse resource grid that animals forage on.
//!
//! Each resource cell keeps the fruit placed there by animal-dispersed trees
//! and summarises the canopy cover of the landscape cells it spans. For every
//! animal species three preference fields are derived from these (distance
//! from the animal, cover, fruit abundance); their product, normalised, is the
//! probability of choosing each cell as the next destination.

use crate::animals::SpeciesTraits;
use crate::error::{SimError, SimResult};
use crate::geometry::Point;
use crate::grid::Grid;
use crate::probability::DiscreteDistribution;
use crate::tree::TreeId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Diagnostic field exported for visualisation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorField {
    /// Distance preference from the last selecting animal
    Distance,
    Cover,
    Fruits,
    Visits,
    SelectionProbability,
}

impl std::str::FromStr for ColorField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distance" => Ok(Self::Distance),
            "cover" => Ok(Self::Cover),
            "fruits" => Ok(Self::Fruits),
            "visits" => Ok(Self::Visits),
            "selection_probability" | "k" => Ok(Self::SelectionProbability),
            other => Err(format!("unknown colour field: {}", other)),
        }
    }
}

/// Fruits of one parent tree waiting in a resource cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FruitBatch {
    pub parent: TreeId,
    pub remaining: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ResourceCell {
    pub idx: usize,
    pub x: usize,
    pub y: usize,
    /// Landscape-grid bounding box `[min, max)` covered by this cell
    grid_bb_min: (i64, i64),
    grid_bb_max: (i64, i64),
    fruits: Vec<FruitBatch>,
    no_fruits: u64,
}

impl ResourceCell {
    pub fn reset(&mut self) {
        self.fruits.clear();
        self.no_fruits = 0;
    }

    pub fn add_fruits(&mut self, parent: TreeId, count: u64) {
        if count == 0 {
            return;
        }
        match self.fruits.iter_mut().find(|b| b.parent == parent) {
            Some(batch) => batch.remaining += count,
            None => self.fruits.push(FruitBatch { parent, remaining: count }),
        }
        self.no_fruits += count;
    }

    /// Remove one fruit, chosen uniformly among all fruits in the cell
    pub fn extract_random_fruit<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<TreeId> {
        if self.no_fruits == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..self.no_fruits);
        let pos = self.fruits.iter().position(|b| {
            if pick < b.remaining {
                true
            } else {
                pick -= b.remaining;
                false
            }
        })?;
        let parent = self.fruits[pos].parent;
        self.fruits[pos].remaining -= 1;
        if self.fruits[pos].remaining == 0 {
            self.fruits.swap_remove(pos);
        }
        self.no_fruits -= 1;
        Some(parent)
    }

    #[inline]
    pub fn no_fruits(&self) -> u64 {
        self.no_fruits
    }

    /// `log10(1 + n)` over the fruit count
    pub fn fruit_abundance_index(&self) -> f32 {
        (1.0 + self.no_fruits as f32).log10()
    }
}

/// Per-species preference fields
#[derive(Clone, Debug)]
struct SpeciesFields {
    traits: SpeciesTraits,
    /// Distance preference indexed by toroidal cell offset `dx + dy * width`
    dist_lookup: Vec<f32>,
    c: Vec<f32>,
    f: Vec<f32>,
}

pub struct ResourceGrid {
    width: usize,
    cell_width: f32,
    cells: Vec<ResourceCell>,
    /// Arcsine-square-root transformed canopy cover per cell
    cover: Vec<f32>,
    fruit_abundance: Vec<f32>,
    d: Vec<f32>,
    selection: DiscreteDistribution,
    visits: Vec<u32>,
    visits_sum: u64,
    species: BTreeMap<String, SpeciesFields>,
    total_no_fruits: u64,
}

impl ResourceGrid {
    /// Grid of `round(grid.width × relative_size)` cells per side over the same landscape
    pub fn new(grid: &Grid, relative_size: f32, species: &BTreeMap<String, SpeciesTraits>) -> Self {
        let width = ((grid.width() as f32 * relative_size).round() as usize).max(1);
        let cell_width = grid.width_r() / width as f32;
        let size = width * width;
        let cells = (0..size)
            .map(|idx| {
                let (x, y) = (idx % width, idx / width);
                let lo = (x as f32 * cell_width, y as f32 * cell_width);
                let hi = ((x + 1) as f32 * cell_width, (y + 1) as f32 * cell_width);
                let to_grid = |v: f32| (v / grid.cellsize()).ceil() as i64;
                ResourceCell {
                    idx,
                    x,
                    y,
                    grid_bb_min: (to_grid(lo.0), to_grid(lo.1)),
                    grid_bb_max: (to_grid(hi.0), to_grid(hi.1)),
                    ..ResourceCell::default()
                }
            })
            .collect();

        let mut resource_grid = Self {
            width,
            cell_width,
            cells,
            cover: vec![0.0; size],
            fruit_abundance: vec![0.0; size],
            d: vec![0.0; size],
            selection: DiscreteDistribution::new(size),
            visits: vec![0; size],
            visits_sum: 0,
            species: BTreeMap::new(),
            total_no_fruits: 0,
        };
        for (name, traits) in species {
            let fields = SpeciesFields {
                traits: traits.clone(),
                dist_lookup: resource_grid.distance_lookup_table(traits),
                c: vec![0.0; size],
                f: vec![0.0; size],
            };
            resource_grid.species.insert(name.clone(), fields);
        }
        resource_grid
    }

    fn distance_lookup_table(&self, traits: &SpeciesTraits) -> Vec<f32> {
        let w = self.width;
        (0..w * w)
            .map(|offset| {
                let (dx, dy) = (offset % w, offset / w);
                let dx = dx.min(w - dx) as f32 * self.cell_width;
                let dy = dy.min(w - dy) as f32 * self.cell_width;
                let dist = (dx * dx + dy * dy).sqrt();
                1.0 - ((dist / traits.a_d).powf(traits.b_d)).tanh()
            })
            .collect()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    #[inline]
    pub fn no_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[ResourceCell] {
        &self.cells
    }

    #[inline]
    pub fn width_r(&self) -> f32 {
        self.width as f32 * self.cell_width
    }

    /// Remove all fruit
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
        self.total_no_fruits = 0;
    }

    pub fn reset_color_arrays(&mut self) {
        self.visits.fill(0);
        self.visits_sum = 0;
    }

    #[inline]
    pub fn total_no_fruits(&self) -> u64 {
        self.total_no_fruits
    }

    #[inline]
    pub fn has_fruits(&self) -> bool {
        self.total_no_fruits > 0
    }

    pub fn cell_index_at_real(&self, position: Point) -> usize {
        let w = self.width as i64;
        let x = ((position.x / self.cell_width).floor() as i64).rem_euclid(w) as usize;
        let y = ((position.y / self.cell_width).floor() as i64).rem_euclid(w) as usize;
        y * self.width + x
    }

    /// Place `count` fruits of `parent` in the cell containing `position`
    pub fn add_crop(&mut self, position: Point, parent: TreeId, count: u64) {
        let idx = self.cell_index_at_real(position);
        self.cells[idx].add_fruits(parent, count);
        self.total_no_fruits += count;
    }

    pub fn extract_fruit<R: Rng + ?Sized>(&mut self, idx: usize, rng: &mut R) -> Option<TreeId> {
        let parent = self.cells[idx].extract_random_fruit(rng)?;
        self.total_no_fruits -= 1;
        Some(parent)
    }

    /// Refresh the cover and fruit-abundance fields from the landscape
    pub fn compute_cover_and_fruit_abundance(&mut self, grid: &Grid) {
        for (i, cell) in self.cells.iter().enumerate() {
            let mut forest = 0usize;
            let mut total = 0usize;
            for x in cell.grid_bb_min.0..cell.grid_bb_max.0 {
                for y in cell.grid_bb_min.1..cell.grid_bb_max.1 {
                    forest += grid.cell(grid.cell_index(x, y)).is_forest() as usize;
                    total += 1;
                }
            }
            let fraction = if total > 0 { forest as f32 / total as f32 } else { 0.0 };
            self.cover[i] = fraction.sqrt().asin();
            self.fruit_abundance[i] = cell.fruit_abundance_index();
        }
    }

    /// Recompute the cover and fruit preference fields of `species` from current fruit counts
    pub fn update_cover_and_fruit_probabilities(&mut self, species: &str) -> SimResult<()> {
        for (abundance, cell) in self.fruit_abundance.iter_mut().zip(&self.cells) {
            *abundance = cell.fruit_abundance_index();
        }
        let fields = self
            .species
            .get_mut(species)
            .ok_or_else(|| SimError::UnknownSpecies(species.to_string()))?;
        let traits = &fields.traits;
        for (c, cover) in fields.c.iter_mut().zip(&self.cover) {
            *c = (cover / traits.a_c).powf(traits.b_c).tanh();
        }
        for (f, abundance) in fields.f.iter_mut().zip(&self.fruit_abundance) {
            *f = (abundance / traits.a_f).powf(traits.b_f).tanh();
        }
        Ok(())
    }

    /// Sample a destination cell for an animal of `species` at `position`
    pub fn select_cell<R: Rng + ?Sized>(&mut self, species: &str, position: Point, rng: &mut R) -> SimResult<usize> {
        let fields = self
            .species
            .get(species)
            .ok_or_else(|| SimError::UnknownSpecies(species.to_string()))?;
        let w = self.width;
        let cur = self.cell_index_at_real(position);
        let (cx, cy) = (cur % w, cur / w);
        let mut sum = 0.0f32;
        for i in 0..self.cells.len() {
            let (tx, ty) = (i % w, i / w);
            let offset = (tx + w - cx) % w + ((ty + w - cy) % w) * w;
            self.d[i] = fields.dist_lookup[offset];
            let k = self.d[i] * fields.c[i] * fields.f[i];
            self.selection.probabilities[i] = k;
            sum += k;
        }
        self.selection.normalize(sum);
        self.selection.build_cdf();

        let idx = self.selection.sample(rng);
        self.visits[idx] += 1;
        self.visits_sum += 1;
        Ok(idx)
    }

    /// Current normalised selection probabilities
    pub fn selection_probabilities(&self) -> &[f32] {
        &self.selection.probabilities
    }

    pub fn random_location_within_cell<R: Rng + ?Sized>(&self, idx: usize, rng: &mut R) -> Point {
        let cell = &self.cells[idx];
        let x0 = cell.x as f32 * self.cell_width;
        let y0 = cell.y as f32 * self.cell_width;
        Point::new(
            rng.gen_range(x0..x0 + self.cell_width),
            rng.gen_range(y0..y0 + self.cell_width),
        )
    }

    /// Random landscape-cell origin within the resource cell containing `location`
    pub fn random_stategrid_location<R: Rng + ?Sized>(&self, location: Point, grid: &Grid, rng: &mut R) -> Point {
        let jittered = self.random_location_within_cell(self.cell_index_at_real(location), rng);
        let (x, y) = grid.grid_position(jittered);
        grid.real_position(x, y)
    }

    /// Displacement from `a` to the periodic image of `b` nearest to it, and its length
    pub fn shortest_trajectory(&self, a: Point, b: Point) -> (Point, f32) {
        let w = self.width_r();
        let mut best = b - a;
        let mut best_dist = best.length();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let image = Point::new(b.x + dx as f32 * w, b.y + dy as f32 * w);
                let trajectory = image - a;
                let dist = trajectory.length();
                if dist < best_dist {
                    best = trajectory;
                    best_dist = dist;
                }
            }
        }
        (best, best_dist)
    }

    /// Integer-scaled diagnostic field for `species`
    pub fn color_distribution(&self, species: &str, field: ColorField) -> SimResult<Vec<i32>> {
        let fields = self
            .species
            .get(species)
            .ok_or_else(|| SimError::UnknownSpecies(species.to_string()))?;
        let scaled = |values: &[f32], factor: f32| values.iter().map(|v| (v * factor) as i32).collect();
        Ok(match field {
            ColorField::Distance => scaled(&self.d, 10_000.0),
            ColorField::Cover => scaled(&fields.c, 100.0),
            ColorField::Fruits => scaled(&fields.f, 100.0),
            ColorField::Visits => {
                let recipr = if self.visits_sum > 0 { 1.0 / self.visits_sum as f32 } else { 0.0 };
                self.visits.iter().map(|v| (*v as f32 * recipr * 100_000.0) as i32).collect()
            }
            ColorField::SelectionProbability => scaled(&self.selection.probabilities, 1_000_000.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn species() -> BTreeMap<String, SpeciesTraits> {
        let mut map = BTreeMap::new();
        map.insert("bird".to_string(), SpeciesTraits::default());
        map
    }

    fn setup() -> (Grid, ResourceGrid) {
        let grid = Grid::new(40, 1.0);
        let resource_grid = ResourceGrid::new(&grid, 0.25, &species());
        (grid, resource_grid)
    }

    #[test]
    fn test_dimensions_follow_relative_size() {
        let (grid, rg) = setup();
        assert_eq!(rg.width(), 10);
        assert!((rg.width_r() - grid.width_r()).abs() < 1e-4);
        assert_eq!(rg.cells()[0].grid_bb_max, (4, 4));
    }

    #[test]
    fn test_fruit_extraction_drains_cell() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (_, mut rg) = setup();
        rg.add_crop(Point::new(5.0, 5.0), TreeId(1), 3);
        rg.add_crop(Point::new(5.5, 6.0), TreeId(2), 2);
        assert_eq!(rg.total_no_fruits(), 5);
        let idx = rg.cell_index_at_real(Point::new(5.0, 5.0));
        let mut parents = Vec::new();
        while let Some(parent) = rg.extract_fruit(idx, &mut rng) {
            parents.push(parent);
        }
        assert_eq!(parents.len(), 5);
        assert_eq!(parents.iter().filter(|p| **p == TreeId(1)).count(), 3);
        assert!(!rg.has_fruits());
    }

    #[test]
    fn test_selection_probabilities_sum_to_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (mut grid, mut rg) = setup();
        let tree = Tree::new(TreeId(1), Point::new(20.0, 20.0), 6.0, 1.0);
        grid.populate_tree_domain(&tree);
        for i in 0..20 {
            rg.add_crop(Point::new(i as f32 * 2.0, 20.0), TreeId(i + 1), 10 + i);
        }
        rg.compute_cover_and_fruit_abundance(&grid);
        rg.update_cover_and_fruit_probabilities("bird").unwrap();
        rg.select_cell("bird", Point::new(21.0, 21.0), &mut rng).unwrap();
        let sum: f32 = rg.selection_probabilities().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum = {}", sum);
    }

    #[test]
    fn test_selection_only_targets_cells_with_fruit_and_cover() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (mut grid, mut rg) = setup();
        let tree = Tree::new(TreeId(1), Point::new(6.0, 6.0), 3.0, 1.0);
        grid.populate_tree_domain(&tree);
        rg.add_crop(Point::new(6.0, 6.0), TreeId(1), 50);
        rg.compute_cover_and_fruit_abundance(&grid);
        rg.update_cover_and_fruit_probabilities("bird").unwrap();
        let target = rg.cell_index_at_real(Point::new(6.0, 6.0));
        for _ in 0..20 {
            assert_eq!(rg.select_cell("bird", Point::new(10.0, 10.0), &mut rng).unwrap(), target);
        }
        let visits = rg.color_distribution("bird", ColorField::Visits).unwrap();
        assert_eq!(visits[target], 100_000);
    }

    #[test]
    fn test_shortest_trajectory_crosses_boundary() {
        let (_, rg) = setup();
        let (trajectory, dist) = rg.shortest_trajectory(Point::new(1.0, 1.0), Point::new(39.0, 1.0));
        assert!((dist - 2.0).abs() < 1e-4);
        assert!((trajectory.x + 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_stategrid_location_is_cell_origin() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let grid = Grid::new(40, 1.5);
        let rg = ResourceGrid::new(&grid, 0.25, &species());
        for _ in 0..50 {
            let p = rg.random_stategrid_location(Point::new(7.0, 7.0), &grid, &mut rng);
            assert!((p.x / 1.5 - (p.x / 1.5).round()).abs() < 1e-4);
            assert_eq!(rg.cell_index_at_real(p), rg.cell_index_at_real(Point::new(7.0, 7.0)));
        }
    }

    #[test]
    fn test_unknown_species_is_an_error() {
        let (_, rg) = setup();
        assert!(matches!(
            rg.color_distribution("bat", ColorField::Cover),
            Err(SimError::UnknownSpecies(_))
        ));
        assert_eq!("k".parse::<ColorField>(), Ok(ColorField::SelectionProbability));
    }
}

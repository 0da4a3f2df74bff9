//! Authoritative registry of trees and their per-identity records.
//!
//! Every tree identity owns up to four records: the [`Tree`] itself, its
//! [`Crop`], its [`Strategy`] and, for wind-dispersed trees, an individual
//! [`Kernel`]. All of them are created by [`Population::add`] and dropped
//! together by [`Population::remove`]. Other subsystems hold [`TreeId`]s only
//! and re-resolve them here on every access.

use crate::error::{SimError, SimResult};
use crate::geometry::Point;
use crate::kernel::Kernel;
use crate::probability::LinearDistribution;
use crate::strategy::{DispersalVector, Strategy, StrategyGenerator};
use crate::tree::{Crop, Tree, TreeId};
use log::{trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tree size and reproduction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum crown radius (m)
    pub max_radius: f32,
    /// Relative density of the initial-radius distribution at the seedling size
    pub radius_q1: f32,
    /// Relative density of the initial-radius distribution at `max_radius`
    pub radius_q2: f32,
    /// Fraction of `max_radius` above which a tree bears seeds
    pub seed_bearing_threshold: f32,
    /// Fraction of biomass growth allotted to seed production
    pub mass_budget_factor: f32,
    /// Crown radius of a freshly germinated seedling (m)
    pub seedling_radius: f32,
    /// Cumulative radius (m) at which a cell fully suppresses germination
    pub saturation_threshold: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_radius: 6.0,
            radius_q1: 1.0,
            radius_q2: 0.0,
            seed_bearing_threshold: 0.4,
            mass_budget_factor: 0.002,
            seedling_radius: 0.1,
            saturation_threshold: 3.0,
        }
    }
}

impl TreeConfig {
    pub fn seed_bearing_radius(&self) -> f32 {
        self.seed_bearing_threshold * self.max_radius
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_radius <= 0.0 {
            return Err("trees.max_radius must be > 0".to_string());
        }
        if self.seed_bearing_threshold <= 0.0 || self.seed_bearing_threshold > 1.0 {
            return Err("trees.seed_bearing_threshold must be within (0, 1]".to_string());
        }
        if self.mass_budget_factor < 0.0 {
            return Err("trees.mass_budget_factor must be >= 0".to_string());
        }
        if self.radius_q1 < 0.0 || self.radius_q2 < 0.0 {
            return Err("trees.radius_q1 and radius_q2 must be >= 0".to_string());
        }
        if self.seedling_radius <= 0.0 || self.seedling_radius > self.max_radius {
            return Err("trees.seedling_radius must be within (0, max_radius]".to_string());
        }
        if self.saturation_threshold <= 0.0 {
            return Err("trees.saturation_threshold must be > 0".to_string());
        }
        Ok(())
    }
}

/// Outcome of a crop recomputation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropUpdate {
    Updated,
    /// Raw mass was negative and clamped to zero
    Clamped,
    /// The crop record carries another tree's identity
    Mismatch,
    /// The tree has no crop record
    Missing,
}

impl CropUpdate {
    /// Why a tree with this outcome must be evicted, if it must
    pub fn eviction_reason(&self) -> Option<&'static str> {
        match self {
            Self::Mismatch => Some("crop record belongs to another tree"),
            Self::Missing => Some("no crop record"),
            Self::Updated | Self::Clamped => None,
        }
    }
}

pub struct Population {
    config: TreeConfig,
    generator: StrategyGenerator,
    radius_distribution: LinearDistribution,
    trees: BTreeMap<TreeId, Tree>,
    crops: BTreeMap<TreeId, Crop>,
    strategies: BTreeMap<TreeId, Strategy>,
    kernels: BTreeMap<TreeId, Kernel>,
    global_kernels: BTreeMap<DispersalVector, Kernel>,
    next_id: u64,
}

impl Population {
    pub fn new(config: TreeConfig, generator: StrategyGenerator) -> Self {
        let radius_distribution = LinearDistribution::new(
            config.radius_q1,
            config.radius_q2,
            config.seedling_radius,
            config.max_radius,
        );
        Self {
            config,
            generator,
            radius_distribution,
            trees: BTreeMap::new(),
            crops: BTreeMap::new(),
            strategies: BTreeMap::new(),
            kernels: BTreeMap::new(),
            global_kernels: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn generator(&self) -> &StrategyGenerator {
        &self.generator
    }

    #[inline]
    pub fn max_radius(&self) -> f32 {
        self.config.max_radius
    }

    /// Create a tree with its strategy, crop and (for wind) individual kernel.
    ///
    /// The strategy is inherited from `parent` (with possible mutation) or
    /// sampled fresh; the radius is sampled unless given.
    pub fn add<R: Rng + ?Sized>(
        &mut self,
        position: Point,
        parent: Option<&Strategy>,
        radius: Option<f32>,
        rng: &mut R,
    ) -> TreeId {
        let id = TreeId(self.next_id);
        self.next_id += 1;

        let radius = radius.unwrap_or_else(|| self.radius_distribution.sample(rng));
        let strategy = match parent {
            Some(parent) => self.generator.inherit(parent, rng),
            None => self.generator.sample(rng),
        };

        let tree = Tree::new(id, position, radius, self.config.seed_bearing_radius());
        trace!("Added tree {} at ({:.1}, {:.1}) r={:.2} vector={}", id, position.x, position.y, radius, strategy.vector);
        self.trees.insert(id, tree);
        self.crops.insert(id, Crop::new(id, position));
        self.bind_individual_kernel(id, &strategy);
        self.strategies.insert(id, strategy);
        id
    }

    /// Drop every record of `id`. Returns the removed tree, if it existed.
    pub fn remove(&mut self, id: TreeId) -> Option<Tree> {
        self.crops.remove(&id);
        self.strategies.remove(&id);
        self.kernels.remove(&id);
        self.trees.remove(&id)
    }

    fn bind_individual_kernel(&mut self, id: TreeId, strategy: &Strategy) {
        if strategy.vector != DispersalVector::Wind {
            return;
        }
        if let Some(Kernel::Wind(global)) = self.global_kernels.get(&DispersalVector::Wind) {
            let individual = global.individualize(strategy.seed_tspeed);
            self.kernels.insert(id, Kernel::Wind(individual));
        }
    }

    /// Register the shared kernel for a vector; existing wind trees get individual copies
    pub fn set_global_kernel(&mut self, kernel: Kernel) {
        let vector = kernel.vector();
        self.global_kernels.insert(vector, kernel);
        if vector == DispersalVector::Wind {
            let wind_trees: Vec<(TreeId, Strategy)> = self
                .strategies
                .iter()
                .filter(|(_, s)| s.vector == DispersalVector::Wind)
                .map(|(id, s)| (*id, *s))
                .collect();
            for (id, strategy) in wind_trees {
                self.bind_individual_kernel(id, &strategy);
            }
        }
    }

    pub fn has_global_kernels(&self) -> bool {
        DispersalVector::ALL
            .iter()
            .all(|v| self.global_kernels.contains_key(v))
    }

    /// Kernel for a tree: its individual kernel if bound, else the global one for `vector`
    pub fn kernel(&self, id: TreeId, vector: DispersalVector) -> SimResult<&Kernel> {
        if let Some(kernel) = self.kernels.get(&id) {
            return Ok(kernel);
        }
        self.global_kernels
            .get(&vector)
            .ok_or(SimError::MissingGlobalKernel(vector))
    }

    pub fn global_kernel(&self, vector: DispersalVector) -> Option<&Kernel> {
        self.global_kernels.get(&vector)
    }

    /// Recompute the crop of `id` from its current growth increment
    pub fn update_crop(&mut self, id: TreeId) -> CropUpdate {
        let (Some(tree), Some(strategy), Some(crop)) = (
            self.trees.get(&id),
            self.strategies.get(&id),
            self.crops.get_mut(&id),
        ) else {
            return CropUpdate::Missing;
        };
        if crop.id != id || tree.id != id {
            warn!("Crop id {} does not match tree id {}", crop.id, tree.id);
            return CropUpdate::Mismatch;
        }
        if crop.update(tree, strategy, self.config.mass_budget_factor) {
            warn!("Clamped negative crop mass of tree {} (r={:.3}, r_prev={:.3})", id, tree.radius, tree.radius_tmin1);
            CropUpdate::Clamped
        } else {
            CropUpdate::Updated
        }
    }

    /// Grow every tree by one timestep
    pub fn grow(&mut self, growth_rate_multiplier: f32) {
        let max_radius = self.config.max_radius;
        let seed_bearing_radius = self.config.seed_bearing_radius();
        for tree in self.trees.values_mut() {
            tree.grow(growth_rate_multiplier, max_radius, seed_bearing_radius);
        }
    }

    #[inline]
    pub fn get(&self, id: TreeId) -> Option<&Tree> {
        self.trees.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: TreeId) -> Option<&mut Tree> {
        self.trees.get_mut(&id)
    }

    pub fn crop(&self, id: TreeId) -> Option<&Crop> {
        self.crops.get(&id)
    }

    pub fn strategy(&self, id: TreeId) -> Option<&Strategy> {
        self.strategies.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: TreeId) -> bool {
        self.trees.contains_key(&id)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Live identities in ascending order
    pub fn ids(&self) -> Vec<TreeId> {
        self.trees.keys().copied().collect()
    }

    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.values()
    }

    /// Registry entries as `(key, tree)`; the key may disagree with a malformed tree's own id
    pub fn entries(&self) -> impl Iterator<Item = (TreeId, &Tree)> {
        self.trees.iter().map(|(id, tree)| (*id, tree))
    }

    pub fn reproductive_count(&self) -> usize {
        self.trees.values().filter(|t| t.is_reproductive()).count()
    }

    /// Tree count per dispersal vector
    pub fn vector_counts(&self) -> BTreeMap<DispersalVector, usize> {
        let mut counts = BTreeMap::new();
        for strategy in self.strategies.values() {
            *counts.entry(strategy.vector).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self) {
        self.trees.clear();
        self.crops.clear();
        self.strategies.clear();
        self.kernels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{LinearKernelConfig, WindKernel, WindKernelConfig};
    use crate::strategy::{StrategyConfig, VectorWeights};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn wind_only_population() -> Population {
        let mut strategy = StrategyConfig::default();
        strategy.vector_weights = VectorWeights {
            linear: 0.0,
            wind: 1.0,
            animal: 0.0,
        };
        Population::new(TreeConfig::default(), StrategyGenerator::new(strategy, 0.05))
    }

    #[test]
    fn test_add_assigns_unique_valid_ids() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut pop = Population::new(TreeConfig::default(), StrategyGenerator::new(StrategyConfig::default(), 0.05));
        let a = pop.add(Point::new(1.0, 1.0), None, None, &mut rng);
        let b = pop.add(Point::new(2.0, 2.0), None, Some(0.5), &mut rng);
        assert_ne!(a, b);
        assert!(a.is_valid() && b.is_valid());
        assert_eq!(pop.size(), 2);
        assert_eq!(pop.get(b).map(|t| t.radius), Some(0.5));
        let r = pop.get(a).map(|t| t.radius).unwrap_or(-1.0);
        assert!(r >= pop.config().seedling_radius && r <= pop.max_radius());
    }

    #[test]
    fn test_remove_drops_all_records() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut pop = wind_only_population();
        pop.set_global_kernel(Kernel::Wind(WindKernel::new(&WindKernelConfig::default(), 0.5, 100.0)));
        let id = pop.add(Point::new(5.0, 5.0), None, None, &mut rng);
        assert!(pop.kernels.contains_key(&id));

        assert!(pop.remove(id).is_some());
        assert!(pop.get(id).is_none());
        assert!(pop.crop(id).is_none());
        assert!(pop.strategy(id).is_none());
        assert!(!pop.kernels.contains_key(&id));
        assert!(pop.remove(id).is_none());
    }

    #[test]
    fn test_wind_trees_get_individual_kernels_on_registration() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut pop = wind_only_population();
        let id = pop.add(Point::new(5.0, 5.0), None, None, &mut rng);
        assert!(matches!(
            pop.kernel(id, DispersalVector::Wind),
            Err(SimError::MissingGlobalKernel(DispersalVector::Wind))
        ));

        pop.set_global_kernel(Kernel::Wind(WindKernel::new(&WindKernelConfig::default(), 0.5, 100.0)));
        let tspeed = pop.strategy(id).map(|s| s.seed_tspeed).unwrap_or_default();
        match pop.kernel(id, DispersalVector::Wind) {
            Ok(Kernel::Wind(kernel)) => assert!((kernel.seed_tspeed - tspeed).abs() < 1e-6),
            other => panic!("unexpected kernel {:?}", other),
        }
    }

    #[test]
    fn test_global_kernel_resolution() {
        let mut pop = wind_only_population();
        assert!(!pop.has_global_kernels());
        pop.set_global_kernel(Kernel::linear(&LinearKernelConfig::default()));
        pop.set_global_kernel(Kernel::Animal);
        pop.set_global_kernel(Kernel::Wind(WindKernel::new(&WindKernelConfig::default(), 0.5, 100.0)));
        assert!(pop.has_global_kernels());
        assert!(matches!(pop.kernel(TreeId(99), DispersalVector::Linear), Ok(Kernel::Linear(_))));
    }

    #[test]
    fn test_vector_mutation_rebinds_offspring_kernel() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut strategy = StrategyConfig::default();
        strategy.mutation_rate = 1.0;
        strategy.vector_weights = VectorWeights {
            linear: 1.0,
            wind: 0.0,
            animal: 0.0,
        };
        let mut pop = Population::new(TreeConfig::default(), StrategyGenerator::new(strategy, 0.05));
        pop.set_global_kernel(Kernel::linear(&LinearKernelConfig::default()));
        pop.set_global_kernel(Kernel::Animal);
        pop.set_global_kernel(Kernel::Wind(WindKernel::new(&WindKernelConfig::default(), 0.5, 100.0)));

        let mut parent = pop.generator().sample(&mut rng);
        parent.vector = DispersalVector::Wind;

        let (mut rebound, mut kept) = (0, 0);
        for i in 0..100 {
            let id = pop.add(Point::new(i as f32, 0.0), Some(&parent), Some(1.0), &mut rng);
            let vector = pop.strategy(id).map(|s| s.vector);
            match (vector, pop.kernel(id, DispersalVector::Linear)) {
                (Some(DispersalVector::Linear), Ok(Kernel::Linear(_))) => {
                    assert!(!pop.kernels.contains_key(&id));
                    rebound += 1;
                }
                (Some(DispersalVector::Wind), Ok(Kernel::Wind(_))) => kept += 1,
                other => panic!("unexpected vector/kernel pair {:?}", other),
            }
        }
        assert!(rebound > 0);
        assert!(kept > 0);
        assert_eq!(pop.vector_counts().get(&DispersalVector::Linear), Some(&rebound));
    }

    #[test]
    fn test_update_crop_detects_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut pop = wind_only_population();
        let id = pop.add(Point::default(), None, Some(4.0), &mut rng);
        pop.grow(0.2);
        assert_eq!(pop.update_crop(id), CropUpdate::Updated);

        if let Some(crop) = pop.crops.get_mut(&id) {
            crop.id = TreeId(12345);
        }
        assert_eq!(pop.update_crop(id), CropUpdate::Mismatch);
        assert_eq!(pop.update_crop(TreeId(777)), CropUpdate::Missing);

        let mismatch = CropUpdate::Mismatch.eviction_reason();
        let missing = CropUpdate::Missing.eviction_reason();
        assert!(mismatch.is_some() && missing.is_some());
        assert_ne!(mismatch, missing);
        assert_eq!(CropUpdate::Clamped.eviction_reason(), None);
        assert_eq!(CropUpdate::Updated.eviction_reason(), None);
    }

    #[test]
    fn test_ids_are_ordered() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut pop = wind_only_population();
        for i in 0..10 {
            pop.add(Point::new(i as f32, 0.0), None, None, &mut rng);
        }
        let ids = pop.ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pop.vector_counts().get(&DispersalVector::Wind), Some(&10));
    }
}

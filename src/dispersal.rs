//! Direct (linear and wind) seed dispersal.
//!
//! Every diaspore of a crop lands at a point drawn from the tree's kernel;
//! each of its seeds then germinates independently there. Animal-dispersed
//! crops are not handled here: they are packaged as fruit for the resource
//! grid instead.

use crate::error::SimResult;
use crate::geometry::Point;
use crate::state::State;
use crate::strategy::Strategy;
use crate::tree::TreeId;
use log::trace;
use rand::Rng;

/// Seeds of one diaspore attempt germination at `location`. Returns the number of seedlings.
pub fn germinate_seeds<R: Rng + ?Sized>(
    state: &mut State,
    strategy: &Strategy,
    location: Point,
    no_seeds: u32,
    rng: &mut R,
) -> usize {
    let mut germinated = 0;
    for _ in 0..no_seeds {
        if rng.gen::<f32>() < strategy.germination_probability
            && state.attempt_germination(location, strategy, rng).is_some()
        {
            germinated += 1;
        }
    }
    germinated
}

/// Spread the current crop of `id` through its kernel. Returns the number of seedlings.
///
/// Fails only if the tree's dispersal vector has no registered kernel.
pub fn disperse_crop<R: Rng + ?Sized>(state: &mut State, id: TreeId, rng: &mut R) -> SimResult<usize> {
    let (Some(crop), Some(strategy)) = (state.population.crop(id), state.population.strategy(id)) else {
        return Ok(0);
    };
    let (origin, no_diaspora, strategy) = (crop.origin, crop.no_diaspora, *strategy);
    let kernel = state.population.kernel(id, strategy.vector)?.clone();

    let mut germinated = 0;
    for _ in 0..no_diaspora {
        let Some(location) = kernel.deposition_location(origin, rng) else {
            break;
        };
        germinated += germinate_seeds(state, &strategy, location, strategy.no_seeds_per_diaspore, rng);
    }
    trace!("Tree {} dispersed {} diaspora by {}, {} germinated", id, no_diaspora, strategy.vector, germinated);
    Ok(germinated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use crate::kernel::{Kernel, LinearKernelConfig, WindKernel, WindKernelConfig};
    use crate::population::TreeConfig;
    use crate::strategy::{DispersalVector, StrategyConfig, VectorWeights};
    use crate::error::SimError;
    use crate::probability::Distribution;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state_with(vector: DispersalVector) -> State {
        let weights = match vector {
            DispersalVector::Linear => VectorWeights { linear: 1.0, wind: 0.0, animal: 0.0 },
            DispersalVector::Wind => VectorWeights { linear: 0.0, wind: 1.0, animal: 0.0 },
            DispersalVector::Animal => VectorWeights { linear: 0.0, wind: 0.0, animal: 1.0 },
        };
        let strategy = StrategyConfig {
            vector_weights: weights,
            mutation_rate: 0.0,
            germination_probability: Distribution::constant(1.0),
            ..StrategyConfig::default()
        };
        let trees = TreeConfig {
            max_radius: 5.0,
            mass_budget_factor: 0.0005,
            saturation_threshold: 1000.0,
            ..TreeConfig::default()
        };
        let grid = GridConfig { gridsize: 60, cellsize: 1.0 };
        State::new(&grid, trees, strategy, 0.05)
    }

    fn reproductive_tree<R: Rng>(state: &mut State, rng: &mut R) -> TreeId {
        let id = state.population.add(Point::new(30.0, 30.0), None, Some(4.0), rng);
        state.population.grow(0.3);
        state.population.update_crop(id);
        id
    }

    #[test]
    fn test_linear_dispersal_lands_within_kernel_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = state_with(DispersalVector::Linear);
        state.population.set_global_kernel(Kernel::linear(&LinearKernelConfig {
            lin_diffuse_q1: 1.0,
            lin_diffuse_q2: 0.0,
            min: 0.0,
            max: 10.0,
        }));
        let parent = reproductive_tree(&mut state, &mut rng);
        let origin = state.population.get(parent).map(|t| t.position).unwrap_or_default();
        let germinated = disperse_crop(&mut state, parent, &mut rng).unwrap();

        assert!(germinated > 0);
        assert_eq!(state.population.size(), germinated + 1);
        for tree in state.population.trees().filter(|t| t.id != parent) {
            assert!(state.periodic_distance(tree.position, origin) <= 10.0 + 1e-3);
        }
    }

    #[test]
    fn test_wind_dispersal_uses_individual_kernel() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut state = state_with(DispersalVector::Wind);
        let parent = reproductive_tree(&mut state, &mut rng);
        assert!(matches!(
            disperse_crop(&mut state, parent, &mut rng),
            Err(SimError::MissingGlobalKernel(DispersalVector::Wind))
        ));

        let width = state.grid.width_r();
        state
            .population
            .set_global_kernel(Kernel::Wind(WindKernel::new(&WindKernelConfig::default(), 0.5, width)));
        assert!(disperse_crop(&mut state, parent, &mut rng).unwrap() > 0);
    }

    #[test]
    fn test_germination_probability_zero_yields_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut state = state_with(DispersalVector::Linear);
        let mut strategy = state.population.generator().sample(&mut rng);
        strategy.germination_probability = 0.0;
        assert_eq!(germinate_seeds(&mut state, &strategy, Point::new(5.0, 5.0), 100, &mut rng), 0);
        assert!(state.population.is_empty());
    }

    #[test]
    fn test_unknown_tree_disperses_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut state = state_with(DispersalVector::Linear);
        assert_eq!(disperse_crop(&mut state, TreeId(42), &mut rng).unwrap(), 0);
    }
}

//! Frugivore agents that move, eat, rest and defecate seeds.
//!
//! Animal time runs on its own clock (seconds) within a dispersal round.
//! Ingested seeds are scheduled for defecation at ingestion time plus a
//! gamma-distributed gut passage time, and deposited where the animal was at
//! that moment.

use crate::dispersal::germinate_seeds;
use crate::error::{SimError, SimResult};
use crate::geometry::Point;
use crate::grid::Grid;
use crate::resources::ResourceGrid;
use crate::state::State;
use crate::strategy::Strategy;
use crate::tree::TreeId;
use log::{debug, warn};
use rand::Rng;
use rand_distr::{Distribution as _, Gamma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Jittered germination attempts per defecated seed
const DEPOSITS_PER_SEED: usize = 2;

/// Behavioural traits shared by all animals of a species
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesTraits {
    /// Travel speed (m/s)
    pub speed: f32,
    /// Distance preference scale (m) and shape
    pub a_d: f32,
    pub b_d: f32,
    /// Cover preference scale and shape
    pub a_c: f32,
    pub b_c: f32,
    /// Fruit preference scale and shape
    pub a_f: f32,
    pub b_f: f32,
    /// Gut passage time gamma parameters (minutes)
    pub gut_passage_time_shape: f32,
    pub gut_passage_time_scale: f32,
    /// Rest time gamma parameters (minutes)
    pub rest_time_shape: f32,
    pub rest_time_scale: f32,
    /// Share of the animal population belonging to this species
    pub population_fraction: f32,
    /// Fruit biomass (g) eaten per foraging bout
    #[serde(default = "default_appetite")]
    pub appetite: f32,
}

fn default_appetite() -> f32 {
    1000.0
}

impl Default for SpeciesTraits {
    fn default() -> Self {
        Self {
            speed: 3.0,
            a_d: 100.0,
            b_d: 2.0,
            a_c: 0.5,
            b_c: 2.0,
            a_f: 1.0,
            b_f: 1.0,
            gut_passage_time_shape: 4.0,
            gut_passage_time_scale: 5.0,
            rest_time_shape: 2.0,
            rest_time_scale: 5.0,
            population_fraction: 1.0,
            appetite: default_appetite(),
        }
    }
}

impl SpeciesTraits {
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.speed <= 0.0 {
            return Err(format!("animals.species.{}.speed must be > 0", name));
        }
        let positive = [
            self.a_d,
            self.b_d,
            self.a_c,
            self.b_c,
            self.a_f,
            self.b_f,
            self.gut_passage_time_shape,
            self.gut_passage_time_scale,
            self.rest_time_shape,
            self.rest_time_scale,
        ];
        if positive.iter().any(|v| *v <= 0.0) {
            return Err(format!(
                "animals.species.{}: preference and gamma parameters must be > 0",
                name
            ));
        }
        if self.population_fraction < 0.0 {
            return Err(format!("animals.species.{}.population_fraction must be >= 0", name));
        }
        if self.appetite <= 0.0 {
            return Err(format!("animals.species.{}.appetite must be > 0", name));
        }
        Ok(())
    }
}

/// Animal population settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalConfig {
    /// Animals per km²
    pub density: f32,
    /// Upper bound on move/eat/rest cycles per dispersal round
    pub max_iterations: usize,
    /// Leading cycles whose defecated seeds are discarded
    pub burn_in_iterations: usize,
    pub species: BTreeMap<String, SpeciesTraits>,
}

impl Default for AnimalConfig {
    fn default() -> Self {
        let mut species = BTreeMap::new();
        species.insert("bird".to_string(), SpeciesTraits::default());
        Self {
            density: 20.0,
            max_iterations: 10_000,
            burn_in_iterations: 5,
            species,
        }
    }
}

impl AnimalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.density < 0.0 {
            return Err("animals.density must be >= 0".to_string());
        }
        for (name, traits) in &self.species {
            traits.validate(name)?;
        }
        Ok(())
    }
}

/// Tallies of one dispersal round
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnimalDispersalSummary {
    pub iterations: usize,
    pub seeds_eaten: u64,
    /// Seeds defecated after the burn-in
    pub seeds_defecated: u64,
    /// Seeds defecated during the burn-in
    pub seeds_discarded: u64,
    pub germinated: u64,
    pub distance_travelled: f32,
    pub time_resting: f32,
}

pub struct Animal {
    speed: f32,
    appetite: f32,
    gut_passage_time: Gamma<f32>,
    rest_time: Gamma<f32>,
    pub position: Point,
    /// Displacement of the last move
    trajectory: Point,
    travel_time: f32,
    /// Animal clock (s)
    pub curtime: f32,
    moving: bool,
    /// Parent identities of ingested seeds, keyed by rounded defecation time
    stomach: BTreeMap<i64, Vec<TreeId>>,
}

impl Animal {
    pub fn new(traits: &SpeciesTraits) -> SimResult<Self> {
        let gamma = |shape: f32, scale: f32| {
            Gamma::new(shape, scale).map_err(|e| SimError::InvalidConfig(format!("gamma({}, {}): {}", shape, scale, e)))
        };
        Ok(Self {
            speed: traits.speed,
            appetite: traits.appetite,
            gut_passage_time: gamma(traits.gut_passage_time_shape, traits.gut_passage_time_scale)?,
            rest_time: gamma(traits.rest_time_shape, traits.rest_time_scale)?,
            position: Point::default(),
            trajectory: Point::default(),
            travel_time: 0.0,
            curtime: 0.0,
            moving: false,
            stomach: BTreeMap::new(),
        })
    }

    pub fn reset(&mut self) {
        self.curtime = 0.0;
        self.travel_time = 0.0;
        self.moving = false;
        self.stomach.clear();
    }

    pub fn stomach_is_empty(&self) -> bool {
        self.stomach.is_empty()
    }

    pub fn seeds_in_stomach(&self) -> usize {
        self.stomach.values().map(Vec::len).sum()
    }

    /// One move, digest, rest, eat, digest cycle. Eating after the rest spreads
    /// ingestion times over both the trip and the rest.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        species: &str,
        germinate: bool,
        state: &mut State,
        resource_grid: &mut ResourceGrid,
        summary: &mut AnimalDispersalSummary,
        rng: &mut R,
    ) -> SimResult<()> {
        let begin_time = self.curtime;
        summary.distance_travelled += self.travel(species, resource_grid, rng)?;
        self.digest(germinate, state, resource_grid, summary, rng);
        summary.time_resting += self.rest(rng);
        summary.seeds_eaten += self.eat(begin_time, state, resource_grid, rng);
        self.digest(germinate, state, resource_grid, summary, rng);
        Ok(())
    }

    fn travel<R: Rng + ?Sized>(&mut self, species: &str, resource_grid: &mut ResourceGrid, rng: &mut R) -> SimResult<f32> {
        let idx = resource_grid.select_cell(species, self.position, rng)?;
        let destination = resource_grid.random_location_within_cell(idx, rng);
        let (trajectory, distance) = resource_grid.shortest_trajectory(self.position, destination);
        self.trajectory = trajectory;
        self.position = destination;
        self.travel_time = distance / self.speed;
        self.curtime += self.travel_time;
        self.moving = true;
        Ok(distance)
    }

    fn rest<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f32 {
        self.moving = false;
        let rest_time = self.rest_time.sample(rng) * 60.0;
        self.curtime += rest_time;
        rest_time
    }

    /// Eat fruit at the current cell until appetite is met. Returns the number of seeds ingested.
    fn eat<R: Rng + ?Sized>(&mut self, begin_time: f32, state: &State, resource_grid: &mut ResourceGrid, rng: &mut R) -> u64 {
        let idx = resource_grid.cell_index_at_real(self.position);
        let mut appetite = self.appetite;
        let mut consumed: Vec<(f32, TreeId)> = Vec::new();
        while appetite > 0.0 {
            let Some(parent) = resource_grid.extract_fruit(idx, rng) else {
                break;
            };
            let Some(strategy) = state.population.strategy(parent) else {
                continue;
            };
            for _ in 0..strategy.no_seeds_per_diaspore {
                consumed.push((self.gut_passage_time.sample(rng) * 60.0, parent));
            }
            appetite -= strategy.diaspore_mass;
        }
        if consumed.is_empty() {
            return 0;
        }

        // Ingestion is spread evenly over the time since the bout began
        let step = (self.curtime - begin_time) / consumed.len() as f32;
        for (i, (gut_passage_time, parent)) in consumed.iter().enumerate().rev() {
            let ingestion_time = self.curtime - (i + 1) as f32 * step;
            let defecation_time = (ingestion_time + gut_passage_time).round() as i64;
            self.stomach.entry(defecation_time).or_default().push(*parent);
        }
        consumed.len() as u64
    }

    /// Where the animal was `time_since` seconds ago
    fn backtraced_location(&self, time_since: f32) -> Point {
        if !self.moving || self.travel_time <= 0.0 {
            return self.position;
        }
        let fraction = (time_since / self.travel_time).clamp(0.0, 1.0);
        self.position - fraction * self.trajectory
    }

    fn digest<R: Rng + ?Sized>(
        &mut self,
        germinate: bool,
        state: &mut State,
        resource_grid: &ResourceGrid,
        summary: &mut AnimalDispersalSummary,
        rng: &mut R,
    ) {
        let not_due = self.stomach.split_off(&(self.curtime.floor() as i64 + 1));
        let due = std::mem::replace(&mut self.stomach, not_due);
        for (defecation_time, parents) in due {
            if !germinate {
                summary.seeds_discarded += parents.len() as u64;
                continue;
            }
            let location = self.backtraced_location(self.curtime - defecation_time as f32);
            for parent in parents {
                summary.seeds_defecated += 1;
                let Some(strategy) = state.population.strategy(parent).copied() else {
                    continue;
                };
                summary.germinated += self.defecate(location, &strategy, state, resource_grid, rng) as u64;
            }
        }
    }

    fn defecate<R: Rng + ?Sized>(
        &self,
        location: Point,
        strategy: &Strategy,
        state: &mut State,
        resource_grid: &ResourceGrid,
        rng: &mut R,
    ) -> usize {
        let mut germinated = 0;
        for _ in 0..DEPOSITS_PER_SEED {
            let deposit = resource_grid.random_stategrid_location(location, &state.grid, rng);
            germinated += germinate_seeds(state, strategy, deposit, 1, rng);
        }
        germinated
    }
}

/// All animals, grouped by species
pub struct Animals {
    config: AnimalConfig,
    population: BTreeMap<String, Vec<Animal>>,
}

impl Animals {
    /// `round(density × area / 1e6)` animals, split over species by population fraction
    pub fn new(config: &AnimalConfig, area_m2: f32) -> SimResult<Self> {
        let total = (config.density * area_m2 / 1e6).round();
        let mut population = BTreeMap::new();
        for (name, traits) in &config.species {
            let popsize = (total * traits.population_fraction).round() as usize;
            let animals = (0..popsize)
                .map(|_| Animal::new(traits))
                .collect::<SimResult<Vec<_>>>()?;
            population.insert(name.clone(), animals);
        }
        Ok(Self {
            config: config.clone(),
            population,
        })
    }

    pub fn popsize(&self) -> usize {
        self.population.values().map(Vec::len).sum()
    }

    /// Reset every animal and put it at a random position
    pub fn place<R: Rng + ?Sized>(&mut self, grid: &Grid, rng: &mut R) {
        for animal in self.population.values_mut().flatten() {
            animal.reset();
            animal.position = grid.random_real_position(rng);
        }
    }

    fn stomachs_empty(&self) -> bool {
        self.population.values().flatten().all(Animal::stomach_is_empty)
    }

    /// Cycle all animals until `target` seeds have been defecated after the burn-in,
    /// the fruit and stomachs run empty, or the iteration limit is hit
    pub fn disperse<R: Rng + ?Sized>(
        &mut self,
        target: u64,
        state: &mut State,
        resource_grid: &mut ResourceGrid,
        rng: &mut R,
    ) -> SimResult<AnimalDispersalSummary> {
        let mut summary = AnimalDispersalSummary::default();
        if self.popsize() == 0 {
            warn!("No animals in the landscape; {} fruits left undispersed", resource_grid.total_no_fruits());
            return Ok(summary);
        }
        resource_grid.compute_cover_and_fruit_abundance(&state.grid);
        self.place(&state.grid, rng);
        resource_grid.reset_color_arrays();

        loop {
            if summary.seeds_defecated >= target {
                break;
            }
            if !resource_grid.has_fruits() && self.stomachs_empty() {
                break;
            }
            if summary.iterations >= self.config.max_iterations {
                warn!(
                    "Animal dispersal stopped after {} iterations ({} of {} seeds defecated)",
                    summary.iterations, summary.seeds_defecated, target
                );
                break;
            }
            let germinate = summary.iterations >= self.config.burn_in_iterations;
            for (species, animals) in self.population.iter_mut() {
                resource_grid.update_cover_and_fruit_probabilities(species)?;
                for animal in animals.iter_mut() {
                    animal.update(species, germinate, state, resource_grid, &mut summary, rng)?;
                }
            }
            summary.iterations += 1;
            if summary.iterations % 10 == 0 {
                let in_stomachs: usize = self.population.values().flatten().map(Animal::seeds_in_stomach).sum();
                debug!(
                    "Animal iteration {}: eaten {}, defecated {}, germinated {}, in stomachs {}, fruits left {}",
                    summary.iterations,
                    summary.seeds_eaten,
                    summary.seeds_defecated,
                    summary.germinated,
                    in_stomachs,
                    resource_grid.total_no_fruits()
                );
            }
        }
        debug!(
            "Animal dispersal: {} animals, {} iterations, {} seeds defecated, {} germinated",
            self.popsize(),
            summary.iterations,
            summary.seeds_defecated,
            summary.germinated
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use crate::population::TreeConfig;
    use crate::probability::Distribution;
    use crate::strategy::{StrategyConfig, VectorWeights};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn setup(rng: &mut ChaCha8Rng) -> (State, ResourceGrid, AnimalConfig, TreeId) {
        let strategy = StrategyConfig {
            vector_weights: VectorWeights { linear: 0.0, wind: 0.0, animal: 1.0 },
            germination_probability: Distribution::constant(1.0),
            mutation_rate: 0.0,
            ..StrategyConfig::default()
        };
        let trees = TreeConfig {
            max_radius: 5.0,
            saturation_threshold: 1000.0,
            ..TreeConfig::default()
        };
        let mut state = State::new(&GridConfig { gridsize: 40, cellsize: 1.0 }, trees, strategy, 0.05);
        let parent = state.population.add(Point::new(20.0, 20.0), None, Some(4.0), rng);
        state.repopulate_grid();

        let mut config = AnimalConfig::default();
        config.density = 5000.0;
        config.burn_in_iterations = 0;
        config.max_iterations = 500;
        let resource_grid = ResourceGrid::new(&state.grid, 0.25, &config.species);
        (state, resource_grid, config, parent)
    }

    #[test]
    fn test_population_size_from_density() {
        let config = AnimalConfig::default();
        // 20 per km² over 1 km²
        let animals = Animals::new(&config, 1e6).unwrap();
        assert_eq!(animals.popsize(), 20);

        let mut split = config.clone();
        let mut other = SpeciesTraits::default();
        other.population_fraction = 0.25;
        if let Some(bird) = split.species.get_mut("bird") {
            bird.population_fraction = 0.75;
        }
        split.species.insert("monkey".to_string(), other);
        let animals = Animals::new(&split, 1e6).unwrap();
        assert_eq!(animals.popsize(), 20);
    }

    #[test]
    fn test_dispersal_drains_fruit_and_germinates() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (mut state, mut resource_grid, config, parent) = setup(&mut rng);
        resource_grid.add_crop(Point::new(20.0, 20.0), parent, 200);
        let seeds_per = state.population.strategy(parent).map(|s| s.no_seeds_per_diaspore).unwrap_or(0) as u64;

        let mut animals = Animals::new(&config, state.grid.area()).unwrap();
        assert!(animals.popsize() > 0);
        let summary = animals
            .disperse(200 * seeds_per, &mut state, &mut resource_grid, &mut rng)
            .unwrap();

        assert!(summary.seeds_eaten > 0);
        assert!(summary.seeds_defecated <= summary.seeds_eaten);
        assert!(summary.germinated > 0);
        assert_eq!(state.population.size() as u64, 1 + summary.germinated);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_burn_in_discards_seeds() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (mut state, mut resource_grid, mut config, parent) = setup(&mut rng);
        config.burn_in_iterations = usize::MAX;
        config.max_iterations = 200;
        resource_grid.add_crop(Point::new(20.0, 20.0), parent, 100);

        let mut animals = Animals::new(&config, state.grid.area()).unwrap();
        let summary = animals.disperse(10, &mut state, &mut resource_grid, &mut rng).unwrap();
        assert_eq!(summary.seeds_defecated, 0);
        assert_eq!(summary.germinated, 0);
        assert_eq!(state.population.size(), 1);
    }

    #[test]
    fn test_no_animals_is_not_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (mut state, mut resource_grid, mut config, parent) = setup(&mut rng);
        config.density = 0.0;
        resource_grid.add_crop(Point::new(20.0, 20.0), parent, 10);
        let mut animals = Animals::new(&config, state.grid.area()).unwrap();
        let summary = animals.disperse(10, &mut state, &mut resource_grid, &mut rng).unwrap();
        assert_eq!(summary, AnimalDispersalSummary::default());
    }

    #[test]
    fn test_ingestion_spread_over_trip_and_rest() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let (mut state, mut resource_grid, _, parent) = setup(&mut rng);
        resource_grid.add_crop(Point::new(20.0, 20.0), parent, 50);
        resource_grid.compute_cover_and_fruit_abundance(&state.grid);
        resource_grid.update_cover_and_fruit_probabilities("bird").unwrap();

        // Near-instant trip, ~1000 min rest, ~2000 min gut passage
        let traits = SpeciesTraits {
            speed: 1e4,
            gut_passage_time_shape: 1e4,
            gut_passage_time_scale: 0.2,
            rest_time_shape: 1e4,
            rest_time_scale: 0.1,
            ..SpeciesTraits::default()
        };
        let mut animal = Animal::new(&traits).unwrap();
        animal.position = Point::new(20.5, 20.5);
        let mut summary = AnimalDispersalSummary::default();
        animal
            .update("bird", false, &mut state, &mut resource_grid, &mut summary, &mut rng)
            .unwrap();

        assert!(summary.seeds_eaten >= 2);
        assert!(summary.time_resting > 50_000.0);
        assert_eq!(animal.seeds_in_stomach() as u64, summary.seeds_eaten);
        let first = animal.stomach.keys().next().copied().unwrap();
        let last = animal.stomach.keys().next_back().copied().unwrap();
        assert!(last - first > 25_000, "defecation span {}", last - first);
    }

    #[test]
    fn test_backtrace_stays_on_trajectory() {
        let traits = SpeciesTraits::default();
        let mut animal = Animal::new(&traits).unwrap();
        animal.position = Point::new(10.0, 0.0);
        animal.trajectory = Point::new(10.0, 0.0);
        animal.travel_time = 5.0;
        animal.moving = true;
        assert_eq!(animal.backtraced_location(2.5), Point::new(5.0, 0.0));
        assert_eq!(animal.backtraced_location(50.0), Point::new(0.0, 0.0));
        animal.moving = false;
        assert_eq!(animal.backtraced_location(2.5), Point::new(10.0, 0.0));
    }
}

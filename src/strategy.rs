//! Reproductive strategies: the heritable, mutable trait set of a tree.

use crate::probability::{DiscreteDistribution, Distribution};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Mechanism that carries a tree's diaspores away from the parent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispersalVector {
    /// Local diffusion with a linear distance kernel
    Linear,
    /// Anemochory
    Wind,
    /// Zoochory
    Animal,
}

impl DispersalVector {
    pub const ALL: [DispersalVector; 3] = [Self::Linear, Self::Wind, Self::Animal];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Wind => "wind",
            Self::Animal => "animal",
        }
    }

    fn from_index(idx: usize) -> Self {
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }
}

impl std::fmt::Display for DispersalVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Relative frequency of each dispersal vector among freshly sampled strategies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorWeights {
    pub linear: f32,
    pub wind: f32,
    pub animal: f32,
}

impl Default for VectorWeights {
    fn default() -> Self {
        Self {
            linear: 1.0,
            wind: 1.0,
            animal: 1.0,
        }
    }
}

impl VectorWeights {
    fn as_array(&self) -> [f32; 3] {
        [self.linear, self.wind, self.animal]
    }
}

/// Trait-distribution parameters for strategy sampling and mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Probability that an inherited strategy receives a point mutation
    pub mutation_rate: f32,
    /// Seed mass (g); falls back to the state's fixed seed mass when absent
    #[serde(default)]
    pub seed_mass: Option<Distribution>,
    pub seeds_per_diaspore: Distribution,
    /// Accessory tissue (pulp, wing) per diaspore (g)
    pub pulp_mass: Distribution,
    pub germination_probability: Distribution,
    pub vector_weights: VectorWeights,
    /// Terminal descent speed (m/s) per sqrt(g) of diaspore mass
    pub terminal_speed_coefficient: f32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            mutation_rate: 0.1,
            seed_mass: None,
            seeds_per_diaspore: Distribution::Uniform { min: 1.0, max: 4.0 },
            pulp_mass: Distribution::Uniform { min: 0.0, max: 2.0 },
            germination_probability: Distribution::Uniform { min: 0.1, max: 0.5 },
            vector_weights: VectorWeights::default(),
            terminal_speed_coefficient: 0.8,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err("strategy.mutation_rate must be within [0, 1]".to_string());
        }
        if self.terminal_speed_coefficient <= 0.0 {
            return Err("strategy.terminal_speed_coefficient must be > 0".to_string());
        }
        let weights = self.vector_weights.as_array();
        if weights.iter().any(|w| *w < 0.0) || weights.iter().sum::<f32>() <= 0.0 {
            return Err("strategy.vector_weights must be >= 0 with a positive sum".to_string());
        }
        if let Some(seed_mass) = &self.seed_mass {
            seed_mass.validate()?;
        }
        self.seeds_per_diaspore.validate()?;
        self.pulp_mass.validate()?;
        self.germination_probability.validate()
    }
}

/// A tree's reproductive genome
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub vector: DispersalVector,
    /// Mass of a single seed (g)
    pub seed_mass: f32,
    pub no_seeds_per_diaspore: u32,
    /// Accessory tissue per diaspore (g)
    pub pulp_mass: f32,
    /// Derived: seeds plus accessory tissue (g)
    pub diaspore_mass: f32,
    /// Derived: pulp mass relative to total seed mass in a diaspore
    pub pulp_to_seed_ratio: f32,
    /// Derived: terminal descent speed of a diaspore (m/s)
    pub seed_tspeed: f32,
    pub germination_probability: f32,
}

impl Strategy {
    fn recompute_derived(&mut self, terminal_speed_coefficient: f32) {
        let seed_total = self.seed_mass * self.no_seeds_per_diaspore as f32;
        self.diaspore_mass = seed_total + self.pulp_mass;
        self.pulp_to_seed_ratio = if seed_total > 0.0 { self.pulp_mass / seed_total } else { 0.0 };
        self.seed_tspeed = terminal_speed_coefficient * self.diaspore_mass.sqrt();
    }
}

/// Trait resampled by a point mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutatedTrait {
    SeedMass,
    SeedsPerDiaspore,
    PulpMass,
    Vector,
}

const MIN_SEED_MASS: f32 = 1e-4;

/// Samples fresh strategies and derives offspring strategies from parents
#[derive(Clone, Debug)]
pub struct StrategyGenerator {
    config: StrategyConfig,
    fixed_seed_mass: f32,
    vector_distribution: DiscreteDistribution,
}

impl StrategyGenerator {
    pub fn new(config: StrategyConfig, fixed_seed_mass: f32) -> Self {
        let vector_distribution = DiscreteDistribution::from_weights(&config.vector_weights.as_array());
        Self {
            config,
            fixed_seed_mass,
            vector_distribution,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Fresh strategy for the initial population
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Strategy {
        let mut strategy = Strategy {
            vector: self.sample_vector(rng),
            seed_mass: self.sample_seed_mass(rng),
            no_seeds_per_diaspore: self.sample_seeds_per_diaspore(rng),
            pulp_mass: self.sample_pulp_mass(rng),
            diaspore_mass: 0.0,
            pulp_to_seed_ratio: 0.0,
            seed_tspeed: 0.0,
            germination_probability: self
                .config
                .germination_probability
                .sample(rng)
                .clamp(0.0, 1.0),
        };
        strategy.recompute_derived(self.config.terminal_speed_coefficient);
        strategy
    }

    /// Offspring strategy: a copy of the parent's, mutated at `mutation_rate`
    pub fn inherit<R: Rng + ?Sized>(&self, parent: &Strategy, rng: &mut R) -> Strategy {
        let mut child = *parent;
        if rng.gen::<f32>() < self.config.mutation_rate {
            self.mutate(&mut child, rng);
        }
        child
    }

    /// Resample exactly one trait, chosen uniformly, and refresh derived fields
    pub fn mutate<R: Rng + ?Sized>(&self, strategy: &mut Strategy, rng: &mut R) -> MutatedTrait {
        let mutated = match rng.gen_range(0..4) {
            0 => {
                strategy.seed_mass = self.sample_seed_mass(rng);
                MutatedTrait::SeedMass
            }
            1 => {
                strategy.no_seeds_per_diaspore = self.sample_seeds_per_diaspore(rng);
                MutatedTrait::SeedsPerDiaspore
            }
            2 => {
                strategy.pulp_mass = self.sample_pulp_mass(rng);
                MutatedTrait::PulpMass
            }
            _ => {
                strategy.vector = self.sample_vector(rng);
                MutatedTrait::Vector
            }
        };
        strategy.recompute_derived(self.config.terminal_speed_coefficient);
        mutated
    }

    fn sample_vector<R: Rng + ?Sized>(&self, rng: &mut R) -> DispersalVector {
        DispersalVector::from_index(self.vector_distribution.sample(rng))
    }

    fn sample_seed_mass<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match &self.config.seed_mass {
            Some(distribution) => distribution.sample(rng).max(MIN_SEED_MASS),
            None => self.fixed_seed_mass.max(MIN_SEED_MASS),
        }
    }

    fn sample_seeds_per_diaspore<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        self.config.seeds_per_diaspore.sample(rng).round().max(1.0) as u32
    }

    fn sample_pulp_mass<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.config.pulp_mass.sample(rng).max(0.0)
    }
}

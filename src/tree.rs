//! Trees and their seasonal seed crops.

use crate::geometry::Point;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};

/// Unique tree identifier. Zero is reserved as the malformed/unassigned identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId(pub u64);

impl TreeId {
    pub const INVALID: TreeId = TreeId(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for TreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reproductive maturity. The transition to `Reproductive` is one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifePhase {
    NonReproductive,
    Reproductive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    /// Stem position (m)
    pub position: Point,
    /// Crown radius (m)
    pub radius: f32,
    /// Crown radius at the end of the previous timestep
    pub radius_tmin1: f32,
    pub life_phase: LifePhase,
    /// Timestep of the last fire-mortality evaluation
    pub last_mortality_check: Option<u64>,
}

impl Tree {
    pub fn new(id: TreeId, position: Point, radius: f32, seed_bearing_radius: f32) -> Self {
        let mut tree = Self {
            id,
            position,
            radius,
            radius_tmin1: radius,
            life_phase: LifePhase::NonReproductive,
            last_mortality_check: None,
        };
        tree.update_life_phase(seed_bearing_radius);
        tree
    }

    /// Advance one timestep: `r + sqrt(r) * multiplier`, capped at `max_radius`
    pub fn grow(&mut self, growth_rate_multiplier: f32, max_radius: f32, seed_bearing_radius: f32) {
        self.radius_tmin1 = self.radius;
        if self.radius < max_radius {
            self.radius = (self.radius + self.radius.sqrt() * growth_rate_multiplier).min(max_radius);
        }
        self.update_life_phase(seed_bearing_radius);
    }

    pub fn update_life_phase(&mut self, seed_bearing_radius: f32) {
        if self.radius > seed_bearing_radius {
            self.life_phase = LifePhase::Reproductive;
        }
    }

    #[inline]
    pub fn is_reproductive(&self) -> bool {
        self.life_phase == LifePhase::Reproductive
    }

    #[inline]
    pub fn is_within_radius(&self, position: Point) -> bool {
        self.position.dist(position) < self.radius
    }
}

/// Seasonal seed yield of one tree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Crop {
    pub id: TreeId,
    pub origin: Point,
    /// Seed-production mass (g), never negative
    pub mass: f32,
    pub no_diaspora: u64,
    pub no_seeds: u64,
}

impl Crop {
    pub fn new(id: TreeId, origin: Point) -> Self {
        Self {
            id,
            origin,
            mass: 0.0,
            no_diaspora: 0,
            no_seeds: 0,
        }
    }

    /// Recompute from the tree's growth increment.
    /// Returns `true` if the raw mass was negative and had to be clamped.
    pub fn update(&mut self, tree: &Tree, strategy: &Strategy, mass_budget_factor: f32) -> bool {
        self.origin = tree.position;
        let avg_radius = 0.5 * (tree.radius + tree.radius_tmin1);
        let increment = tree.radius.powi(3) - tree.radius_tmin1.powi(3);
        let raw = (avg_radius.powi(3) - increment) * mass_budget_factor * 1000.0;
        let clamped = raw < 0.0;
        self.mass = raw.max(0.0);

        self.no_diaspora = if strategy.diaspore_mass > 0.0 {
            (self.mass / strategy.diaspore_mass).floor() as u64
        } else {
            0
        };
        self.no_seeds = self.no_diaspora * strategy.no_seeds_per_diaspore as u64;
        clamped
    }
}

//! Dispersal kernels: distance/direction models for each dispersal vector.

use crate::geometry::{normal_direction, random_direction, Point};
use crate::probability::{LinearDistribution, PiecewiseCdf};
use crate::strategy::DispersalVector;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bearing spread (degrees) at or above which wind direction is isotropic
pub const FULL_CIRCLE_DEGREES: f32 = 360.0;

/// Linear-diffusion kernel parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearKernelConfig {
    /// Relative density at `min`
    pub lin_diffuse_q1: f32,
    /// Relative density at `max`
    pub lin_diffuse_q2: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for LinearKernelConfig {
    fn default() -> Self {
        Self {
            lin_diffuse_q1: 1.0,
            lin_diffuse_q2: 0.0,
            min: 0.0,
            max: 20.0,
        }
    }
}

/// Wind kernel parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindKernelConfig {
    /// Mean wind speed (m/s)
    pub wspeed_gmean: f32,
    pub wspeed_stdev: f32,
    /// Terminal speed (m/s) for trees without an individual kernel
    pub seed_tspeed: f32,
    /// Abscission height (m)
    pub abs_height: f32,
    /// Prevailing wind bearing (degrees)
    #[serde(default)]
    pub wind_direction: f32,
    /// Bearing spread (degrees); >= 360 means isotropic
    #[serde(default = "default_direction_stdev")]
    pub wind_direction_stdev: f32,
    /// Pieces in the distance CDF
    #[serde(default = "default_resolution")]
    pub resolution: usize,
}

fn default_direction_stdev() -> f32 {
    FULL_CIRCLE_DEGREES
}

fn default_resolution() -> usize {
    100
}

impl Default for WindKernelConfig {
    fn default() -> Self {
        Self {
            wspeed_gmean: 20.0,
            wspeed_stdev: 5.0,
            seed_tspeed: 0.5,
            abs_height: 30.0,
            wind_direction: 0.0,
            wind_direction_stdev: default_direction_stdev(),
            resolution: default_resolution(),
        }
    }
}

/// Parameters for the two globally registered non-animal kernels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    pub linear: LinearKernelConfig,
    pub wind: WindKernelConfig,
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), String> {
        let linear = &self.linear;
        if linear.max < linear.min || linear.min < 0.0 {
            return Err("kernels.linear requires 0 <= min <= max".to_string());
        }
        if linear.lin_diffuse_q1 < 0.0 || linear.lin_diffuse_q2 < 0.0 {
            return Err("kernels.linear densities must be >= 0".to_string());
        }
        let wind = &self.wind;
        if wind.seed_tspeed <= 0.0 || wind.abs_height <= 0.0 {
            return Err("kernels.wind seed_tspeed and abs_height must be > 0".to_string());
        }
        if wind.wspeed_stdev < 0.0 || wind.wind_direction_stdev < 0.0 {
            return Err("kernels.wind standard deviations must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Ballistic wind-dispersal kernel
///
/// A diaspore released at `abs_height` falls at its terminal speed while the
/// wind carries it horizontally, so travel distance is `u * h / v_t` for a
/// wind speed `u ~ Normal(gmean, stdev)` truncated at zero. Distances are
/// drawn from a piecewise-linear CDF of the induced distance density on
/// `[0, dist_max]`.
#[derive(Clone, Debug)]
pub struct WindKernel {
    pub wspeed_gmean: f32,
    pub wspeed_stdev: f32,
    pub seed_tspeed: f32,
    pub abs_height: f32,
    pub wind_direction: f32,
    pub wind_direction_stdev: f32,
    pub dist_max: f32,
    resolution: usize,
    cdf: Option<PiecewiseCdf>,
}

impl WindKernel {
    pub fn new(config: &WindKernelConfig, seed_tspeed: f32, dist_max: f32) -> Self {
        let mut kernel = Self {
            wspeed_gmean: config.wspeed_gmean,
            wspeed_stdev: config.wspeed_stdev,
            seed_tspeed: seed_tspeed.max(f32::EPSILON),
            abs_height: config.abs_height,
            wind_direction: config.wind_direction,
            wind_direction_stdev: config.wind_direction_stdev,
            dist_max,
            resolution: config.resolution,
            cdf: None,
        };
        kernel.cdf = kernel.build_cdf();
        kernel
    }

    /// Copy of this kernel for a diaspore with its own terminal speed
    pub fn individualize(&self, seed_tspeed: f32) -> Self {
        let mut kernel = self.clone();
        kernel.seed_tspeed = seed_tspeed.max(f32::EPSILON);
        kernel.cdf = kernel.build_cdf();
        kernel
    }

    fn build_cdf(&self) -> Option<PiecewiseCdf> {
        if self.wspeed_stdev <= 0.0 {
            return None;
        }
        let descent_time = self.abs_height / self.seed_tspeed;
        let mean = self.wspeed_gmean;
        let two_var = 2.0 * self.wspeed_stdev * self.wspeed_stdev;
        let density = |d: f32| {
            let u = d / descent_time;
            (-(u - mean).powi(2) / two_var).exp()
        };
        PiecewiseCdf::from_pdf(density, 0.0, self.dist_max, self.resolution)
    }

    pub fn sample_distance<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match &self.cdf {
            Some(cdf) => cdf.sample(rng),
            None => (self.wspeed_gmean.max(0.0) * self.abs_height / self.seed_tspeed).min(self.dist_max),
        }
    }

    pub fn sample_direction<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
        if self.wind_direction_stdev < FULL_CIRCLE_DEGREES {
            normal_direction(rng, self.wind_direction, self.wind_direction_stdev)
        } else {
            random_direction(rng)
        }
    }
}

/// Seed-displacement model for one dispersal vector
#[derive(Clone, Debug)]
pub enum Kernel {
    Linear(LinearDistribution),
    Wind(WindKernel),
    /// Displacement emerges from animal movement; nothing to sample directly
    Animal,
}

impl Kernel {
    pub fn linear(config: &LinearKernelConfig) -> Self {
        Kernel::Linear(LinearDistribution::new(
            config.lin_diffuse_q1,
            config.lin_diffuse_q2,
            config.min,
            config.max,
        ))
    }

    pub fn vector(&self) -> DispersalVector {
        match self {
            Kernel::Linear(_) => DispersalVector::Linear,
            Kernel::Wind(_) => DispersalVector::Wind,
            Kernel::Animal => DispersalVector::Animal,
        }
    }

    /// Deposition point `origin + distance * direction`; `None` for the animal kernel
    pub fn deposition_location<R: Rng + ?Sized>(&self, origin: Point, rng: &mut R) -> Option<Point> {
        let (direction, distance) = match self {
            Kernel::Linear(distribution) => (random_direction(rng), distribution.sample(rng)),
            Kernel::Wind(wind) => (wind.sample_direction(rng), wind.sample_distance(rng)),
            Kernel::Animal => return None,
        };
        Some(origin + distance * direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_linear_kernel_respects_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let config = LinearKernelConfig {
            lin_diffuse_q1: 1.0,
            lin_diffuse_q2: 1.0,
            min: 2.0,
            max: 6.0,
        };
        let kernel = Kernel::linear(&config);
        let origin = Point::new(50.0, 50.0);
        for _ in 0..500 {
            let loc = kernel.deposition_location(origin, &mut rng).unwrap();
            let d = loc.dist(origin);
            assert!(d >= 2.0 - 1e-4 && d <= 6.0 + 1e-4, "distance {}", d);
        }
    }

    #[test]
    fn test_animal_kernel_has_no_direct_deposition() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(Kernel::Animal.deposition_location(Point::default(), &mut rng).is_none());
        assert_eq!(Kernel::Animal.vector(), DispersalVector::Animal);
    }

    #[test]
    fn test_wind_distance_within_landscape() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let kernel = WindKernel::new(&WindKernelConfig::default(), 0.5, 200.0);
        for _ in 0..500 {
            let d = kernel.sample_distance(&mut rng);
            assert!((0.0..=200.0).contains(&d));
        }
    }

    #[test]
    fn test_heavier_diaspores_fall_closer() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = WindKernelConfig {
            wspeed_gmean: 5.0,
            wspeed_stdev: 1.0,
            abs_height: 10.0,
            ..WindKernelConfig::default()
        };
        let base = WindKernel::new(&config, 1.0, 500.0);
        let light = base.individualize(0.5);
        let heavy = base.individualize(4.0);
        let mean = |k: &WindKernel, rng: &mut ChaCha8Rng| {
            (0..2000).map(|_| k.sample_distance(rng)).sum::<f32>() / 2000.0
        };
        let light_mean = mean(&light, &mut rng);
        let heavy_mean = mean(&heavy, &mut rng);
        assert!(light_mean > heavy_mean * 4.0, "{} vs {}", light_mean, heavy_mean);
        // Expected travel distance u * h / v_t
        assert!((light_mean - 100.0).abs() < 10.0, "light mean {}", light_mean);
    }

    #[test]
    fn test_prevailing_wind_direction() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let config = WindKernelConfig {
            wind_direction: 0.0,
            wind_direction_stdev: 10.0,
            ..WindKernelConfig::default()
        };
        let kernel = WindKernel::new(&config, 0.5, 200.0);
        let mean_x = (0..500).map(|_| kernel.sample_direction(&mut rng).x).sum::<f32>() / 500.0;
        assert!(mean_x > 0.9);
    }
}

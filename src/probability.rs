//! Probability models used to parameterize traits and dispersal distances.
//!
//! [`Distribution`] is a single tagged sum type over the sampling families the
//! model needs; each variant carries only its own parameters. The discrete and
//! piecewise-linear CDF samplers are standalone because they own precomputed
//! tables.

use rand::Rng;
use rand_distr::{Distribution as RandDistribution, Gamma, Normal};
use serde::{Deserialize, Serialize};

/// Parameterized scalar distribution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    Uniform { min: f32, max: f32 },
    /// Linear density on `[min, max]`; `q1`/`q2` are relative densities at the bounds
    Linear { q1: f32, q2: f32, min: f32, max: f32 },
    Normal { mean: f32, stdev: f32 },
    Gamma { shape: f32, scale: f32 },
    /// Index drawn with probability proportional to `weights`
    Discrete { weights: Vec<f32> },
}

impl Distribution {
    /// Fixed value, expressed as a degenerate uniform
    pub fn constant(value: f32) -> Self {
        Distribution::Uniform { min: value, max: value }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match self {
            Distribution::Uniform { min, max } => uniform(rng, *min, *max),
            Distribution::Linear { q1, q2, min, max } => {
                LinearDistribution::new(*q1, *q2, *min, *max).sample(rng)
            }
            Distribution::Normal { mean, stdev } => match Normal::new(*mean, *stdev) {
                Ok(normal) => normal.sample(rng),
                Err(_) => *mean,
            },
            Distribution::Gamma { shape, scale } => match Gamma::new(*shape, *scale) {
                Ok(gamma) => gamma.sample(rng),
                Err(_) => shape * scale,
            },
            Distribution::Discrete { weights } => {
                DiscreteDistribution::from_weights(weights).sample(rng) as f32
            }
        }
    }

    /// Check parameters; returns a description of the first problem found
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Distribution::Uniform { min, max } if max < min => {
                Err(format!("uniform max ({}) < min ({})", max, min))
            }
            Distribution::Linear { q1, q2, min, max } => {
                if max < min {
                    Err(format!("linear max ({}) < min ({})", max, min))
                } else if *q1 < 0.0 || *q2 < 0.0 {
                    Err("linear densities must be >= 0".to_string())
                } else {
                    Ok(())
                }
            }
            Distribution::Normal { stdev, .. } if *stdev < 0.0 => {
                Err("normal stdev must be >= 0".to_string())
            }
            Distribution::Gamma { shape, scale } if *shape <= 0.0 || *scale <= 0.0 => {
                Err("gamma shape and scale must be > 0".to_string())
            }
            Distribution::Discrete { weights } if weights.iter().any(|w| *w < 0.0) => {
                Err("discrete weights must be >= 0".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[inline]
fn uniform<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    if max <= min {
        return min;
    }
    rng.gen_range(min..max)
}

/// Linear density on `[min, max]`, sampled by inverting its quadratic CDF
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearDistribution {
    pub q1: f32,
    pub q2: f32,
    pub min: f32,
    pub max: f32,
}

impl LinearDistribution {
    pub fn new(q1: f32, q2: f32, min: f32, max: f32) -> Self {
        Self { q1, q2, min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let p: f32 = rng.gen();
        self.min + self.quantile(p) * (self.max - self.min)
    }

    /// Inverse CDF on the unit interval
    fn quantile(&self, p: f32) -> f32 {
        let (a, b) = (self.q1.max(0.0), self.q2.max(0.0));
        if a + b <= 0.0 || (b - a).abs() < 1e-9 {
            return p;
        }
        // F(u) = (a u + (b - a) u^2 / 2) / ((a + b) / 2)
        let disc = a * a + (b - a) * p * (a + b);
        ((-a + disc.max(0.0).sqrt()) / (b - a)).clamp(0.0, 1.0)
    }
}

/// Discrete distribution over indices with a cumulative table for sampling
#[derive(Clone, Debug, Default)]
pub struct DiscreteDistribution {
    pub probabilities: Vec<f32>,
    cdf: Vec<f32>,
}

impl DiscreteDistribution {
    pub fn new(size: usize) -> Self {
        Self {
            probabilities: vec![0.0; size],
            cdf: vec![0.0; size],
        }
    }

    pub fn from_weights(weights: &[f32]) -> Self {
        let mut dist = Self {
            probabilities: weights.to_vec(),
            cdf: vec![0.0; weights.len()],
        };
        let sum = dist.probabilities.iter().sum();
        dist.normalize(sum);
        dist.build_cdf();
        dist
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// Divide every probability by `sum` (no-op for a zero or non-finite sum)
    pub fn normalize(&mut self, sum: f32) {
        if sum <= 0.0 || !sum.is_finite() {
            return;
        }
        let recipr = 1.0 / sum;
        for p in &mut self.probabilities {
            *p *= recipr;
        }
    }

    pub fn build_cdf(&mut self) {
        self.cdf.resize(self.probabilities.len(), 0.0);
        let mut acc = 0.0f32;
        for (c, p) in self.cdf.iter_mut().zip(&self.probabilities) {
            acc += *p;
            *c = acc;
        }
    }

    /// Draw an index; falls back to a uniform draw when the table is degenerate
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let n = self.cdf.len();
        if n == 0 {
            return 0;
        }
        let total = self.cdf[n - 1];
        if total > 0.0 && total.is_finite() {
            let target = rng.gen::<f32>() * total;
            let idx = self.cdf.partition_point(|&c| c <= target);
            if idx < n {
                return idx;
            }
        }
        rng.gen_range(0..n)
    }
}

/// Piecewise-linear CDF built from a density on `[xmin, xmax]`
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseCdf {
    xmin: f32,
    step: f32,
    /// Cumulative probability at each piece boundary, from 0 to 1
    cumulative: Vec<f32>,
}

impl PiecewiseCdf {
    /// Integrate `pdf` with the trapezoid rule over `resolution` pieces.
    /// Returns `None` if the density carries no mass.
    pub fn from_pdf<F: Fn(f32) -> f32>(pdf: F, xmin: f32, xmax: f32, resolution: usize) -> Option<Self> {
        let resolution = resolution.max(1);
        if xmax <= xmin {
            return None;
        }
        let step = (xmax - xmin) / resolution as f32;
        let mut cumulative = Vec::with_capacity(resolution + 1);
        cumulative.push(0.0f32);
        let mut acc = 0.0f32;
        let mut prev = pdf(xmin).max(0.0);
        for i in 1..=resolution {
            let cur = pdf(xmin + i as f32 * step).max(0.0);
            acc += 0.5 * (prev + cur) * step;
            cumulative.push(acc);
            prev = cur;
        }
        if acc <= 0.0 || !acc.is_finite() {
            return None;
        }
        for c in &mut cumulative {
            *c /= acc;
        }
        Some(Self { xmin, step, cumulative })
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.step * (self.cumulative.len() - 1) as f32
    }

    /// Inverse-CDF lookup with linear interpolation within a piece
    pub fn quantile(&self, p: f32) -> f32 {
        let p = p.clamp(0.0, 1.0);
        let idx = self.cumulative.partition_point(|&c| c < p);
        if idx == 0 {
            return self.xmin;
        }
        if idx >= self.cumulative.len() {
            return self.xmax();
        }
        let (lo, hi) = (self.cumulative[idx - 1], self.cumulative[idx]);
        let frac = if hi > lo { (p - lo) / (hi - lo) } else { 0.0 };
        self.xmin + ((idx - 1) as f32 + frac) * self.step
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        self.quantile(rng.gen())
    }
}

/// Logistic curve over `x` rescaled so that `[x_min, x_max]` maps onto `[0, 1]`
pub fn sigmoid(x: f32, x_min: f32, x_max: f32, stretch: f32) -> f32 {
    let span = (x_max - x_min).max(f32::EPSILON);
    let t = (x - x_min) / span;
    1.0 / (1.0 + (-stretch * (t - 0.5)).exp())
}

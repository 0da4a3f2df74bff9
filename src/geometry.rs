//! Real-valued positions and directions on the landscape.

use rand::Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A point (or displacement) in metres
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance, ignoring periodic boundaries
    #[inline]
    pub fn dist(&self, other: Point) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector at `angle` radians from the positive x-axis
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<Point> for f32 {
    type Output = Point;
    fn mul(self, rhs: Point) -> Point {
        Point::new(self * rhs.x, self * rhs.y)
    }
}

/// Uniformly random unit vector
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Point {
    Point::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
}

/// Unit vector whose bearing (degrees) is normally distributed around `mean_deg`
pub fn normal_direction<R: Rng + ?Sized>(rng: &mut R, mean_deg: f32, stdev_deg: f32) -> Point {
    let bearing = match Normal::new(mean_deg, stdev_deg.max(0.0)) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean_deg,
    };
    Point::from_angle(bearing.to_radians())
}

//! Settlement positions and the boundary-radius rule.
//!
//! Every placement and overlap query goes through [`boundaries_overlap`] so
//! they agree: full 3D Euclidean distance against the sum of radii.

use serde::{Deserialize, Serialize};

/// Integer block coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in 3D.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = (self.x as f64) - (other.x as f64);
        let dy = (self.y as f64) - (other.y as f64);
        let dz = (self.z as f64) - (other.z as f64);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Boundary radius of a settlement: one distance unit per inhabitant.
pub fn boundary_radius(population: u32) -> f64 {
    population as f64
}

/// Whether two settlement boundaries collide (strictly closer than the sum of radii).
pub fn boundaries_overlap(a: &Position, a_radius: f64, b: &Position, b_radius: f64) -> bool {
    a.distance(b) < a_radius.max(0.0) + b_radius.max(0.0)
}

//! Placement checks against existing settlement boundaries.

use thiserror::Error;
use town_core::{boundaries_overlap, Position, ValidationError};
use tracing::debug;

use crate::town::{Town, TownId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlacementError {
    #[error("too close to town {name} ({id}): distance {distance:.1}, required {required:.1}")]
    TooClose {
        id: TownId,
        name: String,
        distance: f64,
        required: f64,
    },
    #[error(transparent)]
    InvalidName(#[from] ValidationError),
}

pub struct TownBoundaryService;

impl TownBoundaryService {
    /// Reject a new town whose boundary would touch any existing one.
    ///
    /// Overlap is strict: towns exactly `r1 + r2` apart may coexist.
    pub fn check_placement<'a>(
        position: &Position,
        radius: f64,
        existing: impl IntoIterator<Item = &'a Town>,
    ) -> Result<(), PlacementError> {
        for town in existing {
            let other = town.boundary_radius();
            if boundaries_overlap(position, radius, &town.position(), other) {
                let distance = position.distance(&town.position());
                debug!(town = %town.id(), distance, "placement rejected");
                return Err(PlacementError::TooClose {
                    id: town.id(),
                    name: town.name().to_string(),
                    distance,
                    required: radius + other,
                });
            }
        }
        Ok(())
    }

    /// Every town whose boundary overlaps the given circle.
    pub fn overlapping<'a>(
        position: &Position,
        radius: f64,
        existing: impl IntoIterator<Item = &'a Town>,
    ) -> Vec<TownId> {
        existing
            .into_iter()
            .filter(|t| boundaries_overlap(position, radius, &t.position(), t.boundary_radius()))
            .map(Town::id)
            .collect()
    }
}

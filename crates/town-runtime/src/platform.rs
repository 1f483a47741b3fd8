//! Transport platforms that route visitors between towns.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use town_core::Position;

use crate::town::TownId;

/// A departure point. An empty destination set serves every town.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: u64,
    pub name: String,
    pub enabled: bool,
    pub start_pos: Option<Position>,
    pub end_pos: Option<Position>,
    #[serde(default)]
    pub enabled_destinations: BTreeSet<TownId>,
}

impl Platform {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            start_pos: None,
            end_pos: None,
            enabled_destinations: BTreeSet::new(),
        }
    }

    pub fn serving(mut self, destination: TownId) -> Self {
        self.enabled_destinations.insert(destination);
        self
    }

    pub fn accepts(&self, destination: TownId) -> Result<(), RouteError> {
        if !self.enabled {
            return Err(RouteError::PlatformDisabled(self.id));
        }
        if !self.enabled_destinations.is_empty() && !self.enabled_destinations.contains(&destination) {
            return Err(RouteError::DestinationNotServed {
                platform: self.id,
                destination,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("platform {0} is disabled")]
    PlatformDisabled(u64),
    #[error("platform {platform} does not serve town {destination}")]
    DestinationNotServed { platform: u64, destination: TownId },
    #[error("unknown town {0}")]
    UnknownTown(TownId),
    #[error("town {0} cannot send visitors to itself")]
    SameTown(TownId),
}

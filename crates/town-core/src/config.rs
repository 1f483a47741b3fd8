//! Tunable settlement and simulation parameters.

use serde::{Deserialize, Serialize};

/// Per-world settlement tuning. Every field has a default so partial
/// configuration files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TownConfig {
    /// Population a new settlement starts with; also its initial boundary radius.
    pub default_population: u32,
    /// Visitors required per +1 population. Zero disables visitor growth.
    pub tourists_per_population_increase: u32,
    /// Hard cap on concurrent tourists per settlement.
    pub max_tourists_per_town: u32,
    /// Soft cap on tourists per head of population.
    pub tourists_per_population: f64,
    /// Storage cap of every resource before upgrades.
    pub default_storage_cap: u64,
    /// Radius searched for visitor paths when a settlement is founded.
    pub default_search_radius: u32,
    /// Whether new settlements spawn tourists.
    pub tourist_spawning_enabled: bool,
    /// Lifetime of newly posted rewards.
    pub reward_ttl_days: f64,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            default_population: 5,
            tourists_per_population_increase: 10,
            max_tourists_per_town: 30,
            tourists_per_population: 0.5,
            default_storage_cap: 1000,
            default_search_radius: 32,
            tourist_spawning_enabled: true,
            reward_ttl_days: 7.0,
        }
    }
}

impl TownConfig {
    /// Population-derived tourist limit, monotonic in `population`.
    pub fn tourist_soft_cap(&self, population: u32) -> u32 {
        let cap = (population as f64 * self.tourists_per_population.max(0.0)).floor();
        if cap >= u32::MAX as f64 {
            u32::MAX
        } else {
            cap as u32
        }
    }
}

/// Simulation driver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of in-game days advanced per tick.
    pub tick_days: f64,
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_days: 1.0,
            rng_seed: 42,
        }
    }
}

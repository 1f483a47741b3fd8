//! Serializable read-only snapshot of a town for off-thread scoring and
//! display.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use town_ai::{rank_candidates, ResearchPriority, ResearchState, TownState};
use town_core::{Catalog, ResourceId, TownConfig, UpgradeId};

use crate::town::{Town, TownId};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TownSnapshot {
    pub id: Option<TownId>,
    pub name: String,
    pub population: u32,
    pub tourist_count: u32,
    pub stock: BTreeMap<ResourceId, u64>,
    pub caps: BTreeMap<ResourceId, u64>,
    pub production: BTreeMap<ResourceId, f64>,
    pub consumption: BTreeMap<ResourceId, f64>,
    pub unlocked: BTreeSet<UpgradeId>,
    pub researching: Option<UpgradeId>,
}

impl TownSnapshot {
    pub fn capture(town: &Town, catalog: &Catalog, config: &TownConfig) -> Self {
        let mut snap = Self {
            id: Some(town.id()),
            name: town.name().to_string(),
            population: town.population(),
            tourist_count: town.tourist_count(),
            unlocked: town
                .unlocked()
                .iter()
                .filter(|(_, level)| **level > 0)
                .map(|(id, _)| id.clone())
                .collect(),
            researching: town.research().map(|r| r.node.clone()),
            ..Self::default()
        };
        for resource in catalog.resources.ids() {
            snap.stock
                .insert(resource.clone(), town.economy().resource_count(resource));
            snap.caps
                .insert(resource.clone(), town.storage_cap(resource, catalog, config));
            snap.production
                .insert(resource.clone(), town.production_rate(resource, catalog));
            snap.consumption
                .insert(resource.clone(), town.consumption_rate(resource, catalog));
        }
        snap
    }

    /// Ranked research candidates as seen from this snapshot.
    pub fn priorities(&self, catalog: &Catalog) -> Vec<ResearchPriority> {
        if self.researching.is_some() {
            return Vec::new();
        }
        rank_candidates(self, catalog)
    }
}

impl TownState for TownSnapshot {
    fn stock(&self, resource: &ResourceId) -> u64 {
        self.stock.get(resource).copied().unwrap_or(0)
    }

    fn storage_cap(&self, resource: &ResourceId) -> u64 {
        self.caps.get(resource).copied().unwrap_or(0)
    }

    fn production_rate(&self, resource: &ResourceId) -> f64 {
        self.production.get(resource).copied().unwrap_or(0.0)
    }

    fn consumption_rate(&self, resource: &ResourceId) -> f64 {
        self.consumption.get(resource).copied().unwrap_or(0.0)
    }
}

impl ResearchState for TownSnapshot {
    fn is_unlocked(&self, node: &UpgradeId) -> bool {
        self.unlocked.contains(node)
    }
}

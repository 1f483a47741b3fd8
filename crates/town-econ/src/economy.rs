//! Resource stock and population of one settlement.

use std::collections::BTreeMap;

use town_core::{ResourceAmount, ResourceId};
use tracing::debug;

use crate::{Stockpile, StorageError};

/// Mutable economy ledger owned by exactly one town.
///
/// Holds no growth logic; population changes are driven by the owning town.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TownEconomy {
    resources: Stockpile<ResourceId>,
    population: u32,
}

impl TownEconomy {
    pub fn new(population: u32) -> Self {
        Self {
            resources: Stockpile::new(),
            population,
        }
    }

    /// Add (or with a negative delta, remove) stock. Over-removal fails
    /// without changing the ledger.
    pub fn add_resource(&mut self, resource: &ResourceId, delta: i64) -> Result<u64, StorageError> {
        let next = self.resources.apply(resource, delta)?;
        debug!(%resource, delta, next, "economy stock changed");
        Ok(next)
    }

    /// Add up to `cap` total stock, returning how much was accepted.
    pub fn add_capped(&mut self, resource: &ResourceId, amount: u64, cap: u64) -> u64 {
        let current = self.resources.count(resource);
        let accepted = cap.saturating_sub(current).min(amount);
        if accepted > 0 {
            self.resources.set(resource, current + accepted);
        }
        accepted
    }

    pub fn resource_count(&self, resource: &ResourceId) -> u64 {
        self.resources.count(resource)
    }

    pub fn all_resources(&self) -> &BTreeMap<ResourceId, u64> {
        self.resources.as_map()
    }

    /// Whether every cost can be paid from current stock.
    pub fn can_afford(&self, costs: &[ResourceAmount]) -> bool {
        let mut needed: BTreeMap<&ResourceId, u64> = BTreeMap::new();
        for c in costs {
            let total = needed.entry(&c.resource).or_insert(0);
            *total = total.saturating_add(c.amount);
        }
        needed
            .into_iter()
            .all(|(r, amount)| self.resources.count(r) >= amount)
    }

    /// Pay all costs at once or nothing.
    pub fn pay(&mut self, costs: &[ResourceAmount]) -> Result<(), StorageError> {
        self.resources
            .remove_all(costs.iter().map(|c| (&c.resource, c.amount)))
    }

    pub fn set_population(&mut self, population: u32) {
        self.population = population;
    }

    pub fn population(&self) -> u32 {
        self.population
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheat() -> ResourceId {
        ResourceId::from("wheat")
    }

    #[test]
    fn add_and_remove_resources() {
        let mut eco = TownEconomy::new(5);
        assert_eq!(eco.add_resource(&wheat(), 10).unwrap(), 10);
        assert_eq!(eco.add_resource(&wheat(), -4).unwrap(), 6);
        assert!(eco.add_resource(&wheat(), -7).is_err());
        assert_eq!(eco.resource_count(&wheat()), 6);
        assert_eq!(eco.all_resources().get(&wheat()), Some(&6));
    }

    #[test]
    fn capped_add_accepts_only_room() {
        let mut eco = TownEconomy::new(5);
        assert_eq!(eco.add_capped(&wheat(), 80, 100), 80);
        assert_eq!(eco.add_capped(&wheat(), 80, 100), 20);
        assert_eq!(eco.add_capped(&wheat(), 5, 100), 0);
        assert_eq!(eco.resource_count(&wheat()), 100);
    }

    #[test]
    fn pay_is_all_or_nothing() {
        let mut eco = TownEconomy::new(5);
        eco.add_resource(&wheat(), 10).unwrap();
        let costs = vec![
            ResourceAmount::new("wheat", 5),
            ResourceAmount::new("wood", 1),
        ];
        assert!(!eco.can_afford(&costs));
        assert!(eco.pay(&costs).is_err());
        assert_eq!(eco.resource_count(&wheat()), 10);

        let costs = vec![ResourceAmount::new("wheat", 5), ResourceAmount::new("wheat", 5)];
        assert!(eco.can_afford(&costs));
        eco.pay(&costs).unwrap();
        assert_eq!(eco.resource_count(&wheat()), 0);
    }

    #[test]
    fn population_is_plain_state() {
        let mut eco = TownEconomy::new(5);
        eco.set_population(12);
        assert_eq!(eco.population(), 12);
    }
}

//! Per-world registry of towns.

use std::collections::BTreeMap;
use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use chrono::{DateTime, Utc};
use persistence::{DirtySet, LoadContext, SaveStore};
use rand::Rng;
use town_core::{validate_town_name, Catalog, Position, TownConfig};
use tracing::{debug, info, warn};

use crate::boundary::{PlacementError, TownBoundaryService};
use crate::mirror::TownSnapshot;
use crate::platform::{Platform, RouteError};
use crate::town::{Town, TownId};

/// Store key prefix for town save trees.
pub const TOWN_KEY_PREFIX: &str = "town/";

pub fn store_key(id: TownId) -> String {
    format!("{TOWN_KEY_PREFIX}{id}")
}

/// Aggregate results of one manager tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickSummary {
    pub towns: usize,
    pub cycles: u32,
    pub research_started: u32,
    pub research_completed: u32,
    pub rewards_expired: usize,
    /// Towns swept for having no population left.
    pub towns_removed: Vec<TownId>,
}

/// Owns every town of one world. Inserted into the ECS world as a resource,
/// so systems mutate it through `ResMut` only.
#[derive(Resource, Debug)]
pub struct TownManager {
    catalog: Arc<Catalog>,
    config: TownConfig,
    towns: BTreeMap<TownId, Town>,
    next_id: u64,
    dirty: DirtySet<TownId>,
    removed: DirtySet<TownId>,
}

impl TownManager {
    pub fn new(catalog: Arc<Catalog>, config: TownConfig) -> Self {
        Self {
            catalog,
            config,
            towns: BTreeMap::new(),
            next_id: 1,
            dirty: DirtySet::new(),
            removed: DirtySet::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &TownConfig {
        &self.config
    }

    /// Create a town after name and boundary checks.
    pub fn register_town(&mut self, position: Position, name: &str) -> Result<TownId, PlacementError> {
        let name = validate_town_name(name)?;
        let radius = town_core::boundary_radius(self.config.default_population);
        TownBoundaryService::check_placement(&position, radius, self.towns.values())?;

        let id = TownId(self.next_id);
        self.next_id += 1;
        let mut town = Town::new(id, position, name, &self.config);
        for recipe in self.catalog.recipes.iter() {
            town.activate_recipe(recipe.id.clone());
        }
        info!(town = %id, name = town.name(), %position, "town registered");
        self.towns.insert(id, town);
        self.dirty.mark(id);
        Ok(id)
    }

    pub fn town(&self, id: TownId) -> Option<&Town> {
        self.towns.get(&id)
    }

    /// Mutable access; the town is marked dirty.
    pub fn town_mut(&mut self, id: TownId) -> Option<&mut Town> {
        let town = self.towns.get_mut(&id)?;
        self.dirty.mark(id);
        Some(town)
    }

    pub fn remove_town(&mut self, id: TownId) -> Option<Town> {
        let town = self.towns.remove(&id)?;
        self.removed.mark(id);
        info!(town = %id, name = town.name(), "town removed");
        Some(town)
    }

    pub fn towns(&self) -> impl Iterator<Item = &Town> {
        self.towns.values()
    }

    pub fn len(&self) -> usize {
        self.towns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }

    pub fn mark_dirty(&mut self, id: TownId) {
        if self.towns.contains_key(&id) {
            self.dirty.mark(id);
        }
    }

    pub fn take_dirty(&mut self) -> Vec<TownId> {
        self.dirty.take()
    }

    /// Towns whose boundary overlaps the given one.
    pub fn overlapping(&self, position: &Position, radius: f64) -> Vec<TownId> {
        TownBoundaryService::overlapping(position, radius, self.towns.values())
    }

    /// The town whose boundary contains `position`, nearest first.
    pub fn town_at(&self, position: &Position) -> Option<TownId> {
        self.towns
            .values()
            .filter(|t| position.distance(&t.position()) < t.boundary_radius())
            .min_by(|a, b| {
                position
                    .distance(&a.position())
                    .total_cmp(&position.distance(&b.position()))
            })
            .map(Town::id)
    }

    /// Remove towns left with no population.
    pub fn cleanup_empty(&mut self) -> Vec<TownId> {
        let empty: Vec<TownId> = self
            .towns
            .values()
            .filter(|t| t.population() == 0)
            .map(Town::id)
            .collect();
        for id in &empty {
            self.remove_town(*id);
        }
        empty
    }

    /// Deliver a visitor from `origin` to `destination` through a platform.
    /// Returns the destination's population gain.
    pub fn route_visitor(
        &mut self,
        origin: TownId,
        destination: TownId,
        platform: &Platform,
        now: DateTime<Utc>,
    ) -> Result<u32, RouteError> {
        if origin == destination {
            return Err(RouteError::SameTown(origin));
        }
        platform.accepts(destination)?;
        let origin_position = self
            .towns
            .get(&origin)
            .map(Town::position)
            .ok_or(RouteError::UnknownTown(origin))?;
        let town = self
            .towns
            .get_mut(&destination)
            .ok_or(RouteError::UnknownTown(destination))?;
        let grown = town.add_visitor(origin, origin_position, &self.config, now);
        self.dirty.mark(destination);
        debug!(%origin, %destination, platform = platform.id, grown, "visitor routed");
        Ok(grown)
    }

    /// Run one tick over every town: production, research, research
    /// selection for idle towns and reward expiry, then sweep empty towns.
    pub fn tick<R: Rng>(&mut self, elapsed_days: f64, now: DateTime<Utc>, rng: &mut R) -> TickSummary {
        let catalog = Arc::clone(&self.catalog);
        let mut summary = TickSummary {
            towns: self.towns.len(),
            ..TickSummary::default()
        };
        for (id, town) in self.towns.iter_mut() {
            let outcome = town.tick(elapsed_days, &catalog, &self.config);
            let mut changed = outcome.changed();
            summary.cycles += outcome.cycles;
            if outcome.research_completed.is_some() {
                summary.research_completed += 1;
            }

            if let Some(node) = town.select_research(&catalog, &self.config, rng) {
                match town.start_research(&node, &catalog) {
                    Ok(()) => {
                        summary.research_started += 1;
                        changed = true;
                    }
                    Err(e) => warn!(town = %id, %node, error = %e, "selected research could not start"),
                }
            }

            let expired = town.payment_board_mut().expire_stale(now);
            summary.rewards_expired += expired;
            if changed || expired > 0 {
                self.dirty.mark(*id);
            }
        }
        summary.towns_removed = self.cleanup_empty();
        debug!(?summary, "manager ticked");
        summary
    }

    pub fn snapshot(&self, id: TownId) -> Option<TownSnapshot> {
        self.towns
            .get(&id)
            .map(|t| TownSnapshot::capture(t, &self.catalog, &self.config))
    }

    /// Write every dirty town and drop removed ones. Returns trees written.
    pub fn save_dirty(&mut self, store: &mut dyn SaveStore) -> usize {
        for id in self.removed.take() {
            store.remove(&store_key(id));
        }
        let mut written = 0;
        for id in self.dirty.take() {
            if let Some(town) = self.towns.get(&id) {
                store.put(&store_key(id), town.save());
                written += 1;
            }
        }
        debug!(written, "dirty towns saved");
        written
    }

    /// Load every town tree from `store`, replacing current towns. Malformed
    /// trees are logged and skipped. Returns the number of towns loaded.
    pub fn load_from(&mut self, store: &dyn SaveStore) -> usize {
        let ctx = LoadContext::new(&self.catalog.resources);
        let mut towns = BTreeMap::new();
        for key in store.keys() {
            if !key.starts_with(TOWN_KEY_PREFIX) {
                continue;
            }
            let Some(tree) = store.get(&key) else {
                continue;
            };
            match Town::load(tree, &ctx, &self.config) {
                Ok(town) => {
                    towns.insert(town.id(), town);
                }
                Err(e) => warn!(key = key.as_str(), error = %e, "skipping unreadable town"),
            }
        }
        self.next_id = towns.keys().last().map_or(1, |id| id.0 + 1);
        self.towns = towns;
        self.dirty = DirtySet::new();
        self.removed = DirtySet::new();
        info!(towns = self.towns.len(), "towns loaded");
        self.towns.len()
    }
}

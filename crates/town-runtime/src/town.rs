//! The settlement aggregate root.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use town_ai::{ResearchState, TownState};
use town_core::{
    validate_town_name, ActorId, Catalog, EffectTarget, ItemId, Position, RecipeId, ResourceId,
    TownConfig, UpgradeEffect, UpgradeId, ValidationError,
};
use town_econ::{
    days_to_duration, ActorInventory, ClaimDestination, ClaimError, ClaimedItems, PaymentBoard,
    PersonalStorage, RewardDraft, RewardId, StorageError, TownEconomy,
};
use tracing::{debug, info};

use crate::visits::{VisitHistory, VisitRecord};

/// Stable settlement identifier, unique within one world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TownId(pub u64);

impl fmt::Display for TownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Research currently under way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchProgress {
    pub node: UpgradeId,
    pub remaining_days: f64,
}

/// Errors from starting research.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResearchError {
    #[error("unknown research node {0}")]
    UnknownNode(UpgradeId),
    #[error("already researching {0}")]
    AlreadyResearching(UpgradeId),
    #[error("{0} is already unlocked")]
    AlreadyUnlocked(UpgradeId),
    #[error("{node} requires {prereq}")]
    MissingPrerequisite { node: UpgradeId, prereq: UpgradeId },
    #[error("cannot afford research: {0}")]
    CannotAfford(#[from] StorageError),
}

/// What happened to a town during one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickOutcome {
    /// Completed production cycles across all recipes.
    pub cycles: u32,
    /// Recipes that could not run for lack of inputs or room.
    pub stalled: Vec<RecipeId>,
    /// Output lost to storage caps while at least one other output had room.
    pub discarded: BTreeMap<ResourceId, u64>,
    pub research_completed: Option<UpgradeId>,
}

impl TickOutcome {
    pub fn changed(&self) -> bool {
        self.cycles > 0 || self.research_completed.is_some()
    }
}

/// A settlement: economy, visitors, rewards and research state.
///
/// Mutated only from the tick thread through its owning manager.
#[derive(Clone, Debug, PartialEq)]
pub struct Town {
    pub(crate) id: TownId,
    pub(crate) position: Position,
    pub(crate) name: String,
    pub(crate) economy: TownEconomy,
    pub(crate) tourist_count: u32,
    pub(crate) tourists_received_counter: u32,
    pub(crate) visitors: BTreeMap<TownId, u64>,
    pub(crate) search_radius: u32,
    pub(crate) path_start: Option<Position>,
    pub(crate) path_end: Option<Position>,
    pub(crate) tourist_spawning_enabled: bool,
    pub(crate) visit_history: VisitHistory,
    pub(crate) payment_board: PaymentBoard,
    pub(crate) personal_storage: PersonalStorage,
    pub(crate) unlocked: BTreeMap<UpgradeId, u32>,
    pub(crate) research: Option<ResearchProgress>,
    pub(crate) active_recipes: BTreeSet<RecipeId>,
    pub(crate) production_progress: BTreeMap<RecipeId, f64>,
}

impl Town {
    pub fn new(id: TownId, position: Position, name: impl Into<String>, config: &TownConfig) -> Self {
        Self {
            id,
            position,
            name: name.into(),
            economy: TownEconomy::new(config.default_population),
            tourist_count: 0,
            tourists_received_counter: 0,
            visitors: BTreeMap::new(),
            search_radius: config.default_search_radius,
            path_start: None,
            path_end: None,
            tourist_spawning_enabled: config.tourist_spawning_enabled,
            visit_history: VisitHistory::new(),
            payment_board: PaymentBoard::new(),
            personal_storage: PersonalStorage::new(),
            unlocked: BTreeMap::new(),
            research: None,
            active_recipes: BTreeSet::new(),
            production_progress: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> TownId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: &str) -> Result<(), ValidationError> {
        self.name = validate_town_name(name)?;
        Ok(())
    }

    pub fn population(&self) -> u32 {
        self.economy.population()
    }

    pub fn set_population(&mut self, population: u32) {
        self.economy.set_population(population);
    }

    /// Exclusion radius derived from population.
    pub fn boundary_radius(&self) -> f64 {
        town_core::boundary_radius(self.population())
    }

    pub fn economy(&self) -> &TownEconomy {
        &self.economy
    }

    pub fn economy_mut(&mut self) -> &mut TownEconomy {
        &mut self.economy
    }

    pub fn search_radius(&self) -> u32 {
        self.search_radius
    }

    pub fn set_search_radius(&mut self, radius: u32) {
        self.search_radius = radius;
    }

    pub fn path(&self) -> (Option<Position>, Option<Position>) {
        (self.path_start, self.path_end)
    }

    pub fn set_path(&mut self, start: Option<Position>, end: Option<Position>) {
        self.path_start = start;
        self.path_end = end;
    }

    // --- visitors ---

    /// Record one visitor arriving from `origin`.
    pub fn add_visitor(
        &mut self,
        origin: TownId,
        origin_position: Position,
        config: &TownConfig,
        now: DateTime<Utc>,
    ) -> u32 {
        self.add_visitors(origin, origin_position, 1, config, now)
    }

    /// Record a batch of visitors. Every `tourists_per_population_increase`
    /// visitors add one inhabitant; the remainder carries over to later
    /// arrivals. Returns the population gained.
    pub fn add_visitors(
        &mut self,
        origin: TownId,
        origin_position: Position,
        count: u32,
        config: &TownConfig,
        now: DateTime<Utc>,
    ) -> u32 {
        if count == 0 {
            return 0;
        }
        let tally = self.visitors.entry(origin).or_insert(0);
        *tally = tally.saturating_add(count as u64);
        self.tourists_received_counter = self.tourists_received_counter.saturating_add(count);

        let threshold = config.tourists_per_population_increase;
        let mut grown = 0;
        if threshold > 0 && self.tourists_received_counter >= threshold {
            grown = self.tourists_received_counter / threshold;
            self.tourists_received_counter -= grown * threshold;
            let population = self.population().saturating_add(grown);
            self.economy.set_population(population);
            info!(town = %self.id, grown, population, "population grew from visitors");
        }

        self.visit_history.record(VisitRecord {
            timestamp: now,
            origin,
            count,
            origin_position,
        });
        grown
    }

    pub fn tourists_received_counter(&self) -> u32 {
        self.tourists_received_counter
    }

    pub fn visitors_from(&self, origin: TownId) -> u64 {
        self.visitors.get(&origin).copied().unwrap_or(0)
    }

    pub fn visitors(&self) -> &BTreeMap<TownId, u64> {
        &self.visitors
    }

    pub fn visit_history(&self) -> &VisitHistory {
        &self.visit_history
    }

    // --- tourists ---

    pub fn tourist_count(&self) -> u32 {
        self.tourist_count
    }

    pub fn tourist_spawning_enabled(&self) -> bool {
        self.tourist_spawning_enabled
    }

    pub fn set_tourist_spawning_enabled(&mut self, enabled: bool) {
        self.tourist_spawning_enabled = enabled;
    }

    /// Spawning is enabled and the count is below both the hard cap and the
    /// population-derived cap.
    pub fn can_add_more_tourists(&self, config: &TownConfig) -> bool {
        self.tourist_spawning_enabled
            && self.tourist_count < config.max_tourists_per_town
            && self.tourist_count < config.tourist_soft_cap(self.population())
    }

    pub fn add_tourist(&mut self, config: &TownConfig) -> bool {
        if !self.can_add_more_tourists(config) {
            return false;
        }
        self.tourist_count += 1;
        true
    }

    pub fn remove_tourist(&mut self) {
        self.tourist_count = self.tourist_count.saturating_sub(1);
    }

    // --- rewards and storage ---

    pub fn payment_board(&self) -> &PaymentBoard {
        &self.payment_board
    }

    pub fn payment_board_mut(&mut self) -> &mut PaymentBoard {
        &mut self.payment_board
    }

    pub fn personal_storage(&self) -> &PersonalStorage {
        &self.personal_storage
    }

    /// Post a reward with the configured lifetime.
    pub fn post_reward(&mut self, draft: RewardDraft, config: &TownConfig, now: DateTime<Utc>) -> RewardId {
        self.payment_board
            .post(draft, now, days_to_duration(config.reward_ttl_days))
    }

    pub fn claim_reward(
        &mut self,
        id: RewardId,
        actor: &ActorId,
        destination: ClaimDestination,
        now: DateTime<Utc>,
        inventory: &mut dyn ActorInventory,
    ) -> Result<ClaimedItems, ClaimError> {
        self.payment_board
            .claim(id, actor, destination, now, inventory)
    }

    pub fn add_to_buffer(&mut self, item: &ItemId, delta: i64) -> Result<u64, StorageError> {
        self.payment_board.add_to_buffer(item, delta)
    }

    pub fn add_to_personal_storage(
        &mut self,
        actor: &ActorId,
        item: &ItemId,
        delta: i64,
    ) -> Result<u64, StorageError> {
        self.personal_storage.add(actor, item, delta)
    }

    /// Move items from the shared buffer into an actor's personal storage.
    pub fn withdraw_from_buffer(
        &mut self,
        actor: &ActorId,
        item: &ItemId,
        count: u64,
    ) -> Result<u64, StorageError> {
        self.payment_board
            .withdraw_to_personal(&mut self.personal_storage, actor, item, count)
    }

    // --- production and modifiers ---

    pub fn activate_recipe(&mut self, recipe: RecipeId) -> bool {
        self.active_recipes.insert(recipe)
    }

    pub fn deactivate_recipe(&mut self, recipe: &RecipeId) -> bool {
        self.production_progress.remove(recipe);
        self.active_recipes.remove(recipe)
    }

    pub fn active_recipes(&self) -> &BTreeSet<RecipeId> {
        &self.active_recipes
    }

    /// Effects of every unlocked node, paired with the node's level.
    fn unlocked_effects<'a>(
        &'a self,
        catalog: &'a Catalog,
    ) -> impl Iterator<Item = (&'a UpgradeEffect, u32)> + 'a {
        self.unlocked.iter().flat_map(move |(id, level)| {
            catalog
                .upgrades
                .get(id)
                .into_iter()
                .flat_map(|node| node.effects.iter())
                .map(move |e| (e, *level))
        })
    }

    /// Base cap plus unlocked storage effects.
    pub fn storage_cap(&self, resource: &ResourceId, catalog: &Catalog, config: &TownConfig) -> u64 {
        let bonus: f64 = self
            .unlocked_effects(catalog)
            .filter(|(e, _)| match &e.target {
                EffectTarget::StorageCapAll => true,
                EffectTarget::StorageCap(r) => r == resource,
                EffectTarget::Recipe(_) => false,
            })
            .map(|(e, level)| e.value * level as f64)
            .sum();
        let cap = config.default_storage_cap as f64 + bonus;
        if cap <= 0.0 {
            0
        } else {
            cap.round() as u64
        }
    }

    /// Speed multiplier of a recipe: 1 plus unlocked recipe effects.
    pub fn recipe_speed(&self, recipe: &RecipeId, catalog: &Catalog) -> f64 {
        let bonus: f64 = self
            .unlocked_effects(catalog)
            .filter(|(e, _)| matches!(&e.target, EffectTarget::Recipe(r) if r == recipe))
            .map(|(e, level)| e.value * level as f64)
            .sum();
        (1.0 + bonus).max(0.0)
    }

    /// Units of `resource` produced per day by active recipes.
    pub fn production_rate(&self, resource: &ResourceId, catalog: &Catalog) -> f64 {
        self.active_recipes
            .iter()
            .filter_map(|id| catalog.recipes.get(id))
            .map(|r| r.output_per_day(resource) * self.recipe_speed(&r.id, catalog))
            .sum()
    }

    /// Units of `resource` consumed per day by active recipes.
    pub fn consumption_rate(&self, resource: &ResourceId, catalog: &Catalog) -> f64 {
        self.active_recipes
            .iter()
            .filter_map(|id| catalog.recipes.get(id))
            .map(|r| r.input_per_day(resource) * self.recipe_speed(&r.id, catalog))
            .sum()
    }

    // --- research ---

    pub fn research(&self) -> Option<&ResearchProgress> {
        self.research.as_ref()
    }

    pub fn unlock_level(&self, node: &UpgradeId) -> u32 {
        self.unlocked.get(node).copied().unwrap_or(0)
    }

    pub fn unlocked(&self) -> &BTreeMap<UpgradeId, u32> {
        &self.unlocked
    }

    /// Validate and pay for a research node, then start it.
    pub fn start_research(&mut self, node_id: &UpgradeId, catalog: &Catalog) -> Result<(), ResearchError> {
        if let Some(current) = &self.research {
            return Err(ResearchError::AlreadyResearching(current.node.clone()));
        }
        let node = catalog
            .upgrades
            .get(node_id)
            .ok_or_else(|| ResearchError::UnknownNode(node_id.clone()))?;
        if !node.repeatable && self.unlock_level(node_id) > 0 {
            return Err(ResearchError::AlreadyUnlocked(node_id.clone()));
        }
        if let Some(missing) = node.prereq_nodes.iter().find(|p| self.unlock_level(p) == 0) {
            return Err(ResearchError::MissingPrerequisite {
                node: node_id.clone(),
                prereq: missing.clone(),
            });
        }
        self.economy.pay(&node.costs)?;
        self.research = Some(ResearchProgress {
            node: node_id.clone(),
            remaining_days: node.research_days,
        });
        info!(town = %self.id, node = %node_id, days = node.research_days, "research started");
        Ok(())
    }

    /// Pick the next research node, or `None` while research is under way.
    pub fn select_research<R: Rng>(
        &self,
        catalog: &Catalog,
        config: &TownConfig,
        rng: &mut R,
    ) -> Option<UpgradeId> {
        if self.research.is_some() {
            return None;
        }
        town_ai::select_next_research(&self.view(catalog, config), catalog, rng)
    }

    /// Live read-only view used for scoring.
    pub fn view<'a>(&'a self, catalog: &'a Catalog, config: &'a TownConfig) -> TownView<'a> {
        TownView {
            town: self,
            catalog,
            config,
        }
    }

    // --- tick ---

    /// Advance production and research by `elapsed_days`.
    pub fn tick(&mut self, elapsed_days: f64, catalog: &Catalog, config: &TownConfig) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if !(elapsed_days.is_finite() && elapsed_days > 0.0) {
            return outcome;
        }

        let active: Vec<RecipeId> = self.active_recipes.iter().cloned().collect();
        for id in active {
            let Some(recipe) = catalog.recipes.get(&id) else {
                continue;
            };
            let speed = self.recipe_speed(&id, catalog);
            let caps: Vec<u64> = recipe
                .outputs
                .iter()
                .map(|o| self.storage_cap(&o.resource, catalog, config))
                .collect();
            let mut progress = self.production_progress.get(&id).copied().unwrap_or(0.0)
                + elapsed_days * speed / recipe.base_cycle_time_days;
            while progress >= 1.0 {
                let room = recipe
                    .outputs
                    .iter()
                    .zip(&caps)
                    .any(|(o, cap)| self.economy.resource_count(&o.resource) < *cap);
                if !room || self.economy.pay(&recipe.inputs).is_err() {
                    progress = 1.0;
                    outcome.stalled.push(id.clone());
                    break;
                }
                for (o, cap) in recipe.outputs.iter().zip(&caps) {
                    let accepted = self.economy.add_capped(&o.resource, o.amount, *cap);
                    if accepted < o.amount {
                        *outcome.discarded.entry(o.resource.clone()).or_insert(0) += o.amount - accepted;
                    }
                }
                outcome.cycles += 1;
                progress -= 1.0;
            }
            self.production_progress.insert(id, progress);
        }

        if let Some(mut research) = self.research.take() {
            research.remaining_days -= elapsed_days;
            if research.remaining_days <= 0.0 {
                let level = self.unlocked.entry(research.node.clone()).or_insert(0);
                *level += 1;
                info!(town = %self.id, node = %research.node, level = *level, "research completed");
                outcome.research_completed = Some(research.node);
            } else {
                self.research = Some(research);
            }
        }
        if !outcome.discarded.is_empty() {
            debug!(town = %self.id, discarded = ?outcome.discarded, "output clamped to storage caps");
        }
        debug!(town = %self.id, cycles = outcome.cycles, stalled = outcome.stalled.len(), "town ticked");
        outcome
    }
}

/// An authoritative town paired with the registries needed to read it.
#[derive(Clone, Copy)]
pub struct TownView<'a> {
    town: &'a Town,
    catalog: &'a Catalog,
    config: &'a TownConfig,
}

impl<'a> TownView<'a> {
    pub fn town(&self) -> &'a Town {
        self.town
    }
}

impl TownState for TownView<'_> {
    fn stock(&self, resource: &ResourceId) -> u64 {
        self.town.economy.resource_count(resource)
    }

    fn storage_cap(&self, resource: &ResourceId) -> u64 {
        self.town.storage_cap(resource, self.catalog, self.config)
    }

    fn production_rate(&self, resource: &ResourceId) -> f64 {
        self.town.production_rate(resource, self.catalog)
    }

    fn consumption_rate(&self, resource: &ResourceId) -> f64 {
        self.town.consumption_rate(resource, self.catalog)
    }
}

impl ResearchState for TownView<'_> {
    fn is_unlocked(&self, node: &UpgradeId) -> bool {
        self.town.unlock_level(node) > 0
    }
}

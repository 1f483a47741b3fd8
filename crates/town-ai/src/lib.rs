#![deny(warnings)]

//! Research prioritization for settlements.
//!
//! Scoring ([`calculate_score`]) is a pure function of settlement state and a
//! research node, so the same numbers can be shown to players. Randomness
//! only enters at final selection ([`select_with_bias`]), where a small
//! uniform bias keeps near-ties from always resolving the same way.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use town_core::{Catalog, EffectTarget, ResourceId, UpgradeId, UpgradeNode};
use tracing::debug;

/// Read-only view of settlement state needed to score research.
///
/// Implemented by the authoritative settlement and by its read-only mirror.
pub trait TownState {
    fn stock(&self, resource: &ResourceId) -> u64;
    fn storage_cap(&self, resource: &ResourceId) -> u64;
    /// Units produced per day.
    fn production_rate(&self, resource: &ResourceId) -> f64;
    /// Units consumed per day.
    fn consumption_rate(&self, resource: &ResourceId) -> f64;
}

/// State needed on top of [`TownState`] to decide which nodes are candidates.
pub trait ResearchState: TownState {
    fn is_unlocked(&self, node: &UpgradeId) -> bool;
}

/// Average fullness above which a global storage upgrade gets a flat bonus.
pub const GLOBAL_FULLNESS_THRESHOLD: f64 = 0.8;
pub const GLOBAL_FULLNESS_BONUS: f64 = 10.0;
pub const FULLNESS_WEIGHT: f64 = 5.0;
pub const CRITICAL_FULLNESS: f64 = 0.9;
pub const CRITICAL_FULLNESS_BONUS: f64 = 20.0;
pub const HIGH_FULLNESS: f64 = 0.75;
pub const HIGH_FULLNESS_BONUS: f64 = 10.0;
pub const DEFICIT_BONUS: f64 = 15.0;
pub const DEFICIT_WEIGHT: f64 = 2.0;
pub const SURPLUS_SCORE: f64 = 1.0;
pub const LOW_STOCK_RATIO: f64 = 0.2;
pub const LOW_STOCK_BONUS: f64 = 5.0;
/// Upper bound (exclusive) of the selection-time random bias.
pub const SELECTION_BIAS: f64 = 2.0;

/// A candidate node and its unbiased score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchPriority {
    pub node: UpgradeId,
    pub score: f64,
}

/// `stock / cap`, or zero when the cap is zero.
pub fn fullness<S: TownState + ?Sized>(state: &S, resource: &ResourceId) -> f64 {
    let cap = state.storage_cap(resource);
    if cap == 0 {
        return 0.0;
    }
    state.stock(resource) as f64 / cap as f64
}

/// Mean fullness over every registered resource with a positive cap.
pub fn average_fullness<S: TownState + ?Sized>(state: &S, catalog: &Catalog) -> f64 {
    let (sum, n) = catalog
        .resources
        .ids()
        .filter(|r| state.storage_cap(r) > 0)
        .fold((0.0, 0usize), |(sum, n), r| (sum + fullness(state, r), n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Unbiased priority of a research node, summed over its effects.
pub fn calculate_score<S: TownState + ?Sized>(state: &S, node: &UpgradeNode, catalog: &Catalog) -> f64 {
    node.effects
        .iter()
        .map(|effect| match &effect.target {
            EffectTarget::StorageCapAll => {
                let avg = average_fullness(state, catalog);
                let bonus = if avg > GLOBAL_FULLNESS_THRESHOLD {
                    GLOBAL_FULLNESS_BONUS
                } else {
                    0.0
                };
                bonus + avg * FULLNESS_WEIGHT
            }
            EffectTarget::StorageCap(resource) => {
                let f = fullness(state, resource);
                let bonus = if f > CRITICAL_FULLNESS {
                    CRITICAL_FULLNESS_BONUS
                } else if f > HIGH_FULLNESS {
                    HIGH_FULLNESS_BONUS
                } else {
                    0.0
                };
                bonus + f * FULLNESS_WEIGHT
            }
            EffectTarget::Recipe(id) => match catalog.recipes.get(id) {
                Some(recipe) => recipe
                    .outputs
                    .iter()
                    .map(|out| output_score(state, &out.resource))
                    .sum(),
                None => 0.0,
            },
        })
        .sum()
}

fn output_score<S: TownState + ?Sized>(state: &S, resource: &ResourceId) -> f64 {
    let production = state.production_rate(resource);
    let consumption = state.consumption_rate(resource);
    let mut score = if consumption > production {
        DEFICIT_BONUS + (consumption - production) * DEFICIT_WEIGHT
    } else {
        SURPLUS_SCORE
    };
    if state.storage_cap(resource) > 0 && fullness(state, resource) < LOW_STOCK_RATIO {
        score += LOW_STOCK_BONUS;
    }
    score
}

/// Whether all prerequisites are unlocked, the node is not already unlocked
/// (unless repeatable), and its costs are covered by current stock.
pub fn is_candidate<S: ResearchState + ?Sized>(state: &S, node: &UpgradeNode) -> bool {
    if !node.repeatable && state.is_unlocked(&node.id) {
        return false;
    }
    if !node.prereq_nodes.iter().all(|p| state.is_unlocked(p)) {
        return false;
    }
    let mut needed: BTreeMap<&ResourceId, u64> = BTreeMap::new();
    for cost in &node.costs {
        let total = needed.entry(&cost.resource).or_insert(0);
        *total = total.saturating_add(cost.amount);
    }
    needed.into_iter().all(|(r, amount)| state.stock(r) >= amount)
}

/// Candidates with unbiased scores, highest first (ties by id).
pub fn rank_candidates<S: ResearchState + ?Sized>(state: &S, catalog: &Catalog) -> Vec<ResearchPriority> {
    let mut ranked: Vec<ResearchPriority> = catalog
        .upgrades
        .iter()
        .filter(|node| is_candidate(state, node))
        .map(|node| ResearchPriority {
            node: node.id.clone(),
            score: calculate_score(state, node, catalog),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.node.cmp(&b.node))
    });
    ranked
}

/// Pick the best candidate after adding a uniform `[0, SELECTION_BIAS)` bias
/// to each score.
pub fn select_with_bias<R: Rng>(scored: &[ResearchPriority], rng: &mut R) -> Option<UpgradeId> {
    let mut best: Option<(&UpgradeId, f64)> = None;
    for p in scored {
        let biased = p.score + rng.gen_range(0.0..SELECTION_BIAS);
        match best {
            Some((_, top)) if biased <= top => {}
            _ => best = Some((&p.node, biased)),
        }
    }
    best.map(|(id, _)| id.clone())
}

/// Choose the next node a settlement should research, if any is available.
pub fn select_next_research<S: ResearchState + ?Sized, R: Rng>(
    state: &S,
    catalog: &Catalog,
    rng: &mut R,
) -> Option<UpgradeId> {
    let ranked = rank_candidates(state, catalog);
    let choice = select_with_bias(&ranked, rng);
    debug!(candidates = ranked.len(), choice = ?choice, "research selected");
    choice
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;
    use town_core::{
        ProductionRecipe, ProductionRegistry, RecipeId, ResourceAmount, ResourceRegistry,
        ResourceType, UpgradeRegistry,
    };

    #[derive(Default)]
    struct FakeState {
        stock: BTreeMap<ResourceId, u64>,
        cap: BTreeMap<ResourceId, u64>,
        production: BTreeMap<ResourceId, f64>,
        consumption: BTreeMap<ResourceId, f64>,
        unlocked: BTreeSet<UpgradeId>,
    }

    impl FakeState {
        fn with(mut self, r: &str, stock: u64, cap: u64, prod: f64, cons: f64) -> Self {
            let id = ResourceId::from(r);
            self.stock.insert(id.clone(), stock);
            self.cap.insert(id.clone(), cap);
            self.production.insert(id.clone(), prod);
            self.consumption.insert(id, cons);
            self
        }
    }

    impl TownState for FakeState {
        fn stock(&self, r: &ResourceId) -> u64 {
            self.stock.get(r).copied().unwrap_or(0)
        }
        fn storage_cap(&self, r: &ResourceId) -> u64 {
            self.cap.get(r).copied().unwrap_or(0)
        }
        fn production_rate(&self, r: &ResourceId) -> f64 {
            self.production.get(r).copied().unwrap_or(0.0)
        }
        fn consumption_rate(&self, r: &ResourceId) -> f64 {
            self.consumption.get(r).copied().unwrap_or(0.0)
        }
    }

    impl ResearchState for FakeState {
        fn is_unlocked(&self, node: &UpgradeId) -> bool {
            self.unlocked.contains(node)
        }
    }

    fn catalog(nodes: Vec<UpgradeNode>) -> Catalog {
        let resources = ResourceRegistry::from_types([
            ResourceType::new("wheat", "minecraft:wheat"),
            ResourceType::new("wood", "minecraft:oak_log"),
        ])
        .unwrap();
        let recipes = ProductionRegistry::from_recipes([ProductionRecipe {
            id: RecipeId::from("bread_recipe"),
            display_name: "Bread".into(),
            base_cycle_time_days: 1.0,
            outputs: vec![ResourceAmount::new("wheat", 1)],
            inputs: vec![],
        }])
        .unwrap();
        Catalog::new(resources, recipes, UpgradeRegistry::from_nodes(nodes).unwrap())
    }

    fn n1() -> UpgradeNode {
        UpgradeNode::new("n1", 2.0).with_effect("bread_recipe", 1.0)
    }

    fn n2() -> UpgradeNode {
        UpgradeNode::new("n2", 2.0).with_effect("storage_cap_wheat", 50.0)
    }

    #[test]
    fn deficit_recipe_beats_high_fullness_cap() {
        let cat = catalog(vec![n1(), n2()]);
        let state = FakeState::default().with("wheat", 90, 100, 5.0, 8.0);
        // 15 + (8 - 5) * 2
        assert_eq!(calculate_score(&state, &n1(), &cat), 21.0);
        // 0.9 is not > 0.9, so the 0.75 tier applies: 10 + 0.9 * 5
        assert_eq!(calculate_score(&state, &n2(), &cat), 14.5);
        let ranked = rank_candidates(&state, &cat);
        assert_eq!(ranked[0].node, UpgradeId::from("n1"));
    }

    #[test]
    fn critical_fullness_overtakes_deficit() {
        let cat = catalog(vec![n1(), n2()]);
        let state = FakeState::default().with("wheat", 95, 100, 5.0, 8.0);
        assert_eq!(calculate_score(&state, &n1(), &cat), 21.0);
        assert_eq!(calculate_score(&state, &n2(), &cat), 24.75);
        let ranked = rank_candidates(&state, &cat);
        assert_eq!(ranked[0].node, UpgradeId::from("n2"));
    }

    #[test]
    fn surplus_and_low_stock_scores() {
        let cat = catalog(vec![n1()]);
        let surplus = FakeState::default().with("wheat", 50, 100, 8.0, 5.0);
        assert_eq!(calculate_score(&surplus, &n1(), &cat), 1.0);
        let low = FakeState::default().with("wheat", 10, 100, 8.0, 5.0);
        assert_eq!(calculate_score(&low, &n1(), &cat), 6.0);
        // Zero cap never triggers the low-stock bonus.
        let no_cap = FakeState::default().with("wheat", 0, 0, 8.0, 5.0);
        assert_eq!(calculate_score(&no_cap, &n1(), &cat), 1.0);
    }

    #[test]
    fn global_cap_uses_average_fullness() {
        let node = UpgradeNode::new("silo", 1.0).with_effect("storage_cap_all", 100.0);
        let cat = catalog(vec![node.clone()]);
        let mid = FakeState::default()
            .with("wheat", 90, 100, 0.0, 0.0)
            .with("wood", 50, 100, 0.0, 0.0);
        assert!((calculate_score(&mid, &node, &cat) - 3.5).abs() < 1e-9);
        let full = FakeState::default()
            .with("wheat", 90, 100, 0.0, 0.0)
            .with("wood", 90, 100, 0.0, 0.0);
        assert!((calculate_score(&full, &node, &cat) - 14.5).abs() < 1e-9);
        // Resources without a cap are left out of the average.
        let one = FakeState::default().with("wheat", 90, 100, 0.0, 0.0);
        assert!((calculate_score(&one, &node, &cat) - 14.5).abs() < 1e-9);
    }

    #[test]
    fn effects_are_summed_and_unknown_recipes_ignored() {
        let node = UpgradeNode::new("combo", 1.0)
            .with_effect("bread_recipe", 1.0)
            .with_effect("storage_cap_wheat", 10.0)
            .with_effect("no_such_recipe", 1.0);
        let cat = catalog(vec![node.clone()]);
        let state = FakeState::default().with("wheat", 90, 100, 5.0, 8.0);
        assert_eq!(calculate_score(&state, &node, &cat), 21.0 + 14.5);
    }

    #[test]
    fn candidate_filter() {
        let locked = UpgradeNode::new("locked", 1.0).with_prereq("n1");
        let pricey = UpgradeNode::new("pricey", 1.0).with_cost("wood", 10);
        let again = UpgradeNode::new("again", 1.0).repeatable();
        let cat = catalog(vec![n1(), n2(), locked, pricey, again]);
        let mut state = FakeState::default().with("wood", 9, 100, 0.0, 0.0);
        let ids: Vec<String> = rank_candidates(&state, &cat)
            .into_iter()
            .map(|p| p.node.0)
            .collect();
        assert!(ids.contains(&"n1".to_string()));
        assert!(!ids.contains(&"locked".to_string()));
        assert!(!ids.contains(&"pricey".to_string()));

        state.unlocked.insert(UpgradeId::from("n1"));
        state.unlocked.insert(UpgradeId::from("again"));
        state.stock.insert(ResourceId::from("wood"), 10);
        let ids: Vec<String> = rank_candidates(&state, &cat)
            .into_iter()
            .map(|p| p.node.0)
            .collect();
        assert!(!ids.contains(&"n1".to_string()));
        assert!(ids.contains(&"locked".to_string()));
        assert!(ids.contains(&"pricey".to_string()));
        assert!(ids.contains(&"again".to_string()));
    }

    #[test]
    fn nothing_to_select_yields_none() {
        let cat = catalog(vec![]);
        let state = FakeState::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(select_next_research(&state, &cat, &mut rng), None);
    }

    #[test]
    fn ties_are_broken_fairly() {
        let cat = catalog(vec![UpgradeNode::new("a", 1.0), UpgradeNode::new("b", 1.0)]);
        let state = FakeState::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut picks_a = 0;
        let rounds = 10_000;
        for _ in 0..rounds {
            if select_next_research(&state, &cat, &mut rng) == Some(UpgradeId::from("a")) {
                picks_a += 1;
            }
        }
        assert!((4_500..=5_500).contains(&picks_a), "a picked {picks_a} times");
    }

    #[test]
    fn clear_winner_survives_bias() {
        let cat = catalog(vec![n1(), UpgradeNode::new("idle", 1.0)]);
        let state = FakeState::default().with("wheat", 90, 100, 5.0, 8.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(
                select_next_research(&state, &cat, &mut rng),
                Some(UpgradeId::from("n1"))
            );
        }
    }

    proptest! {
        #[test]
        fn score_is_deterministic(stock in 0u64..200, cap in 0u64..200,
                                  prod in 0.0f64..20.0, cons in 0.0f64..20.0) {
            let cat = catalog(vec![n1(), n2()]);
            let state = FakeState::default().with("wheat", stock, cap, prod, cons);
            for node in [n1(), n2()] {
                let a = calculate_score(&state, &node, &cat);
                let b = calculate_score(&state, &node, &cat);
                prop_assert_eq!(a, b);
                prop_assert!(a >= 0.0);
            }
        }
    }
}

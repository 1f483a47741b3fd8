use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use persistence::{MemoryStore, SaveStore};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use town_core::{
    Catalog, Position, ProductionRecipe, ProductionRegistry, ResourceAmount, ResourceRegistry,
    ResourceId, ResourceType, SimConfig, TownConfig, UpgradeId, UpgradeNode, UpgradeRegistry,
};
use town_econ::{
    ActorInventory, ClaimDestination, ClaimError, DeliveryRejected, ItemStack, RewardDraft,
    RewardSource, RewardStatus,
};
use town_runtime::{store_key, Platform, Simulation, TownId, TownManager, TownSnapshot};

fn now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap()
}

/// Wheat produced at 5/day and milled at 8/day, capped at 100.
fn wheat_catalog() -> Arc<Catalog> {
    let resources = ResourceRegistry::from_types([
        ResourceType::new("wheat", "minecraft:wheat"),
        ResourceType::new("flour", "example:flour"),
    ])
    .unwrap();
    let recipes = ProductionRegistry::from_recipes([
        ProductionRecipe {
            id: "wheat_field".into(),
            display_name: "Wheat field".into(),
            base_cycle_time_days: 1.0,
            outputs: vec![ResourceAmount::new("wheat", 5)],
            inputs: vec![],
        },
        ProductionRecipe {
            id: "mill".into(),
            display_name: "Mill".into(),
            base_cycle_time_days: 1.0,
            outputs: vec![ResourceAmount::new("flour", 1)],
            inputs: vec![ResourceAmount::new("wheat", 8)],
        },
    ])
    .unwrap();
    let upgrades = UpgradeRegistry::from_nodes([
        UpgradeNode::new("n1", 2.0).with_effect("wheat_field", 1.0),
        UpgradeNode::new("n2", 2.0).with_effect("storage_cap_wheat", 50.0),
    ])
    .unwrap();
    Arc::new(Catalog::new(resources, recipes, upgrades))
}

fn wheat_config() -> TownConfig {
    TownConfig {
        default_storage_cap: 100,
        ..TownConfig::default()
    }
}

fn scores_at(stock: i64) -> (f64, f64, Option<UpgradeId>) {
    let mut manager = TownManager::new(wheat_catalog(), wheat_config());
    let id = manager.register_town(Position::new(0, 64, 0), "Millbrook").unwrap();
    manager
        .town_mut(id)
        .unwrap()
        .economy_mut()
        .add_resource(&"wheat".into(), stock)
        .unwrap();

    let snapshot = manager.snapshot(id).unwrap();
    let ranked = snapshot.priorities(manager.catalog());
    let score = |node: &str| {
        ranked
            .iter()
            .find(|p| p.node == UpgradeId::from(node))
            .map(|p| p.score)
            .unwrap()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let town = manager.town(id).unwrap();
    let pick = town.select_research(manager.catalog(), manager.config(), &mut rng);
    (score("n1"), score("n2"), pick)
}

#[test]
fn deficit_outranks_storage_at_ninety_percent() {
    let (n1, n2, pick) = scores_at(90);
    assert_eq!(n1, 21.0);
    assert_eq!(n2, 14.5);
    assert_eq!(pick, Some(UpgradeId::from("n1")));
}

#[test]
fn storage_outranks_deficit_at_ninety_five_percent() {
    let (n1, n2, pick) = scores_at(95);
    assert_eq!(n1, 21.0);
    assert_eq!(n2, 24.75);
    assert_eq!(pick, Some(UpgradeId::from("n2")));
}

#[test]
fn snapshot_serializes_for_display() {
    let mut manager = TownManager::new(wheat_catalog(), wheat_config());
    let id = manager.register_town(Position::new(0, 64, 0), "Millbrook").unwrap();
    let snapshot = manager.snapshot(id).unwrap();
    let text = serde_json::to_string(&snapshot).unwrap();
    let back: TownSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back, snapshot);
    assert_eq!(back.production.get(&ResourceId::from("wheat")), Some(&5.0));
    assert_eq!(back.consumption.get(&ResourceId::from("wheat")), Some(&8.0));
}

#[test]
fn growth_carries_the_remainder_forward() {
    let config = TownConfig::default();
    let mut manager = TownManager::new(wheat_catalog(), config.clone());
    let a = manager.register_town(Position::new(0, 64, 0), "Alpha").unwrap();
    let b = manager.register_town(Position::new(100, 64, 0), "Beta").unwrap();
    let platform = Platform::new(1, "main");
    let k = config.tourists_per_population_increase;

    for _ in 0..(k + 3) {
        manager.route_visitor(a, b, &platform, now()).unwrap();
    }
    let town = manager.town(b).unwrap();
    assert_eq!(town.population(), config.default_population + 1);
    assert_eq!(town.tourists_received_counter(), 3);

    let town = manager.town_mut(a).unwrap();
    let grown = town.add_visitors(b, Position::new(100, 64, 0), 2 * k + 4, &config, now());
    assert_eq!(grown, 2);
    assert_eq!(town.population(), config.default_population + 2);
    assert_eq!(town.tourists_received_counter(), 4);
}

struct Hands {
    received: Vec<ItemStack>,
}

impl ActorInventory for Hands {
    fn deliver(&mut self, _: &town_core::ActorId, items: &[ItemStack]) -> Result<(), DeliveryRejected> {
        self.received.extend_from_slice(items);
        Ok(())
    }
}

#[test]
fn a_reward_is_claimed_at_most_once() {
    let config = TownConfig::default();
    let mut manager = TownManager::new(wheat_catalog(), config.clone());
    let id = manager.register_town(Position::new(0, 64, 0), "Alpha").unwrap();
    let town = manager.town_mut(id).unwrap();
    let reward = town.post_reward(
        RewardDraft::new(RewardSource::Trade, vec![ItemStack::new("minecraft:emerald", 3)]),
        &config,
        now(),
    );
    let steve = town_core::ActorId::from("steve");
    let mut hands = Hands { received: Vec::new() };

    town.claim_reward(reward, &steve, ClaimDestination::Direct, now(), &mut hands)
        .unwrap();
    let again = town.claim_reward(reward, &steve, ClaimDestination::Direct, now(), &mut hands);
    assert!(matches!(again, Err(ClaimError::AlreadyResolved { .. })));
    assert_eq!(hands.received, vec![ItemStack::new("minecraft:emerald", 3)]);

    let late = town.post_reward(
        RewardDraft::new(RewardSource::Other, vec![ItemStack::new("minecraft:emerald", 1)]),
        &config,
        now(),
    );
    let after_ttl = now() + Duration::days(8);
    let expired = town.claim_reward(late, &steve, ClaimDestination::Buffer, after_ttl, &mut hands);
    assert_eq!(expired, Err(ClaimError::Expired(late)));
    assert_eq!(
        town.payment_board().get(late).map(|e| e.status),
        Some(RewardStatus::Expired)
    );
}

#[test]
fn saved_world_reloads_and_migrates_legacy_towns() {
    let content = content::base_content().unwrap();
    let catalog = Arc::new(content.catalog);
    let mut manager = TownManager::new(Arc::clone(&catalog), content.config.clone());
    let a = manager.register_town(Position::new(0, 64, 0), "Alpha").unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    manager.tick(3.0, now(), &mut rng);

    let mut store = MemoryStore::new();
    manager.save_dirty(&mut store);
    store.put(
        &store_key(TownId(40)),
        json!({
            "id": 40,
            "name": "Legacy",
            "posX": 500, "posY": 64, "posZ": 500,
            "economy": { "resources": { "wheat": 12 }, "population": 9 },
            "communalStorage": { "minecraft:emerald": 6 }
        })
        .as_object()
        .unwrap()
        .clone(),
    );

    let mut restored = TownManager::new(catalog, content.config);
    assert_eq!(restored.load_from(&store), 2);
    assert_eq!(restored.town(a), manager.town(a));
    let legacy = restored.town(TownId(40)).unwrap();
    assert_eq!(legacy.population(), 9);
    assert_eq!(
        legacy
            .payment_board()
            .buffer_count(&town_core::ItemId::from("minecraft:emerald")),
        6
    );
    let next = restored.register_town(Position::new(-300, 64, 0), "Gamma").unwrap();
    assert_eq!(next, TownId(41));
}

#[test]
fn items_outside_the_catalog_survive_a_reload() {
    let config = TownConfig::default();
    let mut manager = TownManager::new(wheat_catalog(), config.clone());
    let id = manager.register_town(Position::new(0, 64, 0), "Alpha").unwrap();
    let diamond = town_core::ItemId::from("minecraft:diamond");
    let town = manager.town_mut(id).unwrap();
    town.add_to_buffer(&diamond, 7).unwrap();
    let reward = town.post_reward(
        RewardDraft::new(RewardSource::Trade, vec![ItemStack::new("minecraft:diamond", 2)]),
        &config,
        now(),
    );

    let mut store = MemoryStore::new();
    manager.save_dirty(&mut store);
    let mut restored = TownManager::new(wheat_catalog(), config);
    assert_eq!(restored.load_from(&store), 1);
    let town = restored.town(id).unwrap();
    assert_eq!(town.payment_board().buffer_count(&diamond), 7);
    assert_eq!(
        town.payment_board().get(reward).map(|e| e.rewards.clone()),
        Some(vec![ItemStack::new("minecraft:diamond", 2)])
    );
    assert_eq!(restored.town(id), manager.town(id));
}

#[test]
fn base_content_simulation_respects_caps() {
    let content = content::base_content().unwrap();
    let catalog = Arc::new(content.catalog);
    let mut manager = TownManager::new(Arc::clone(&catalog), content.config.clone());
    for i in 0..4 {
        manager
            .register_town(Position::new(i * 40, 64, 0), &format!("Town {i}"))
            .unwrap();
    }
    let start = now();
    let mut sim = Simulation::new(manager, &SimConfig { tick_days: 1.0, rng_seed: 5 }, start);
    let stats = sim.run_ticks(60);
    assert_eq!(stats.ticks, 60);
    assert!(stats.cycles > 0);
    assert!(stats.research_started > 0);

    let manager = sim.manager();
    for town in manager.towns() {
        for resource in catalog.resources.ids() {
            let cap = town.storage_cap(resource, &catalog, manager.config());
            assert!(town.economy().resource_count(resource) <= cap);
        }
    }
}

#[test]
fn same_seed_same_world() {
    let run = || {
        let content = content::base_content().unwrap();
        let mut manager = TownManager::new(Arc::new(content.catalog), content.config);
        manager.register_town(Position::new(0, 64, 0), "Alpha").unwrap();
        manager.register_town(Position::new(0, 64, 60), "Beta").unwrap();
        let mut sim = Simulation::new(manager, &SimConfig { tick_days: 1.0, rng_seed: 99 }, now());
        sim.run_ticks(45);
        sim.manager().towns().map(|t| t.save()).collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registered_towns_never_overlap(
        spots in proptest::collection::vec((-60i32..60, 60i32..70, -60i32..60), 1..40)
    ) {
        let config = TownConfig::default();
        let mut manager = TownManager::new(wheat_catalog(), config.clone());
        for (i, (x, y, z)) in spots.into_iter().enumerate() {
            let _ = manager.register_town(Position::new(x, y, z), &format!("T{i}"));
        }
        let towns: Vec<_> = manager.towns().collect();
        for (i, a) in towns.iter().enumerate() {
            for b in &towns[i + 1..] {
                let d = a.position().distance(&b.position());
                prop_assert!(d >= a.boundary_radius() + b.boundary_radius());
            }
        }
    }
}

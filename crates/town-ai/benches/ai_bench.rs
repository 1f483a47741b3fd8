use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use town_ai::{rank_candidates, select_next_research, ResearchState, TownState};
use town_core::{
    Catalog, ProductionRecipe, ProductionRegistry, RecipeId, ResourceAmount, ResourceId,
    ResourceRegistry, ResourceType, UpgradeId, UpgradeNode, UpgradeRegistry,
};

struct Flat {
    unlocked: BTreeSet<UpgradeId>,
}

impl TownState for Flat {
    fn stock(&self, r: &ResourceId) -> u64 {
        r.as_str().len() as u64 * 10
    }
    fn storage_cap(&self, _r: &ResourceId) -> u64 {
        100
    }
    fn production_rate(&self, _r: &ResourceId) -> f64 {
        3.0
    }
    fn consumption_rate(&self, r: &ResourceId) -> f64 {
        r.as_str().len() as f64
    }
}

impl ResearchState for Flat {
    fn is_unlocked(&self, node: &UpgradeId) -> bool {
        self.unlocked.contains(node)
    }
}

fn build_catalog(n_resources: usize, n_nodes: usize) -> Catalog {
    let resources = ResourceRegistry::from_types(
        (0..n_resources).map(|i| ResourceType::new(format!("res{i}"), format!("item:res{i}"))),
    )
    .unwrap();
    let recipes = ProductionRegistry::from_recipes((0..n_resources).map(|i| ProductionRecipe {
        id: RecipeId(format!("recipe{i}")),
        display_name: format!("Recipe {i}"),
        base_cycle_time_days: 1.0,
        outputs: vec![ResourceAmount::new(format!("res{i}"), 2)],
        inputs: vec![],
    }))
    .unwrap();
    let upgrades = UpgradeRegistry::from_nodes((0..n_nodes).map(|i| {
        let mut node = UpgradeNode::new(&format!("node{i}"), 3.0)
            .with_effect(&format!("recipe{}", i % n_resources), 0.5)
            .with_effect(&format!("storage_cap_res{}", (i + 1) % n_resources), 25.0);
        if i % 4 == 0 {
            node = node.with_effect("storage_cap_all", 10.0);
        }
        if i > 0 {
            node = node.with_prereq(&format!("node{}", i - 1));
        }
        node
    }))
    .unwrap();
    Catalog::new(resources, recipes, upgrades)
}

fn bench_selection(c: &mut Criterion) {
    let catalog = build_catalog(40, 200);
    let state = Flat {
        unlocked: (0..100).map(|i| UpgradeId(format!("node{i}"))).collect(),
    };
    c.bench_function("rank 200 nodes", |b| {
        b.iter(|| black_box(rank_candidates(&state, &catalog)))
    });
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    c.bench_function("select next research", |b| {
        b.iter(|| black_box(select_next_research(&state, &catalog, &mut rng)))
    });
}

criterion_group!(benches, bench_selection);
criterion_main!(benches);

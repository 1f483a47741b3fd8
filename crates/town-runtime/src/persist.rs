//! Save-tree encoding of a whole town.

use std::collections::BTreeMap;

use persistence::{
    load_economy, load_legacy_communal, load_payment_board, load_personal_storage, save_economy,
    save_payment_board, save_personal_storage, tree::time_value, LoadContext, LoadError, SaveTree,
    TreeExt,
};
use serde_json::Value;
use town_core::{Position, RecipeId, TownConfig, UpgradeId};
use town_econ::PaymentBoard;
use tracing::warn;

use crate::town::{ResearchProgress, Town, TownId};
use crate::visits::{VisitHistory, VisitRecord};

fn position_tree(p: &Position) -> Value {
    let mut t = SaveTree::new();
    t.insert("x".into(), Value::from(p.x));
    t.insert("y".into(), Value::from(p.y));
    t.insert("z".into(), Value::from(p.z));
    Value::Object(t)
}

fn read_position(tree: &SaveTree) -> Result<Position, LoadError> {
    Ok(Position::new(
        coord(tree, "x")?,
        coord(tree, "y")?,
        coord(tree, "z")?,
    ))
}

fn optional_position(tree: &SaveTree, key: &str) -> Result<Option<Position>, LoadError> {
    if !tree.has(key) {
        return Ok(None);
    }
    read_position(tree.get_tree(key)?).map(Some)
}

impl Town {
    pub fn save(&self) -> SaveTree {
        let mut t = SaveTree::new();
        t.insert("id".into(), Value::from(self.id.0));
        t.insert("name".into(), Value::from(self.name.clone()));
        t.insert("posX".into(), Value::from(self.position.x));
        t.insert("posY".into(), Value::from(self.position.y));
        t.insert("posZ".into(), Value::from(self.position.z));
        t.insert("touristCount".into(), Value::from(self.tourist_count));
        t.insert(
            "touristsReceivedCounter".into(),
            Value::from(self.tourists_received_counter),
        );
        t.insert(
            "visitors".into(),
            Value::Object(
                self.visitors
                    .iter()
                    .map(|(id, n)| (id.to_string(), Value::from(*n)))
                    .collect(),
            ),
        );
        t.insert("economy".into(), Value::Object(save_economy(&self.economy)));
        if let Some(p) = &self.path_start {
            t.insert("PathStart".into(), position_tree(p));
        }
        if let Some(p) = &self.path_end {
            t.insert("PathEnd".into(), position_tree(p));
        }
        t.insert("searchRadius".into(), Value::from(self.search_radius));
        t.insert(
            "touristSpawningEnabled".into(),
            Value::from(self.tourist_spawning_enabled),
        );
        t.insert(
            "visitHistory".into(),
            Value::Array(
                self.visit_history
                    .iter()
                    .map(|r| {
                        let mut e = SaveTree::new();
                        e.insert("timestamp".into(), time_value(r.timestamp));
                        e.insert("townId".into(), Value::from(r.origin.0));
                        e.insert("count".into(), Value::from(r.count));
                        e.insert("pos".into(), position_tree(&r.origin_position));
                        Value::Object(e)
                    })
                    .collect(),
            ),
        );
        t.insert(
            "paymentBoard".into(),
            Value::Object(save_payment_board(&self.payment_board)),
        );
        t.insert(
            "personalStorage".into(),
            Value::Object(save_personal_storage(&self.personal_storage)),
        );
        t.insert(
            "unlocked".into(),
            Value::Object(
                self.unlocked
                    .iter()
                    .map(|(id, level)| (id.to_string(), Value::from(*level)))
                    .collect(),
            ),
        );
        if let Some(r) = &self.research {
            let mut e = SaveTree::new();
            e.insert("node".into(), Value::from(r.node.as_str()));
            e.insert("remainingDays".into(), Value::from(r.remaining_days));
            t.insert("research".into(), Value::Object(e));
        }
        t.insert(
            "activeRecipes".into(),
            Value::Array(
                self.active_recipes
                    .iter()
                    .map(|r| Value::from(r.as_str()))
                    .collect(),
            ),
        );
        t.insert(
            "productionProgress".into(),
            Value::Object(
                self.production_progress
                    .iter()
                    .map(|(r, p)| (r.to_string(), Value::from(*p)))
                    .collect(),
            ),
        );
        t
    }

    /// Rebuild a town from its save tree.
    ///
    /// Optional sections fall back to defaults. A legacy `communalStorage`
    /// section is folded into the payment board buffer when no board was
    /// saved.
    pub fn load(tree: &SaveTree, ctx: &LoadContext<'_>, config: &TownConfig) -> Result<Self, LoadError> {
        let id = TownId(tree.get_u64("id")?);
        let position = Position::new(
            coord(tree, "posX")?,
            coord(tree, "posY")?,
            coord(tree, "posZ")?,
        );
        let mut town = Town::new(id, position, tree.get_str("name")?, config);

        if tree.has("economy") {
            town.economy = load_economy(tree.get_tree("economy")?, ctx)?;
        }
        if tree.has("touristCount") {
            town.tourist_count = tree.get_u32("touristCount")?;
        }
        if tree.has("touristsReceivedCounter") {
            town.tourists_received_counter = tree.get_u32("touristsReceivedCounter")?;
        }
        if tree.has("visitors") {
            for (key, count) in tree.get_tree("visitors")? {
                match (key.parse::<u64>(), count.as_u64()) {
                    (Ok(origin), Some(n)) => {
                        town.visitors.insert(TownId(origin), n);
                    }
                    _ => warn!(town = %id, key = key.as_str(), "skipping malformed visitor tally"),
                }
            }
        }
        town.path_start = optional_position(tree, "PathStart")?;
        town.path_end = optional_position(tree, "PathEnd")?;
        if tree.has("searchRadius") {
            town.search_radius = tree.get_u32("searchRadius")?;
        }
        if tree.has("touristSpawningEnabled") {
            town.tourist_spawning_enabled = tree.get_bool("touristSpawningEnabled")?;
        }
        if tree.has("visitHistory") {
            let mut records = Vec::new();
            for (idx, entry) in tree.get_list("visitHistory")?.iter().enumerate() {
                let Some(entry) = entry.as_object() else {
                    warn!(town = %id, idx, "skipping non-tree visit record");
                    continue;
                };
                match read_visit(entry) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(town = %id, idx, error = %e, "skipping malformed visit record"),
                }
            }
            town.visit_history = VisitHistory::from_newest_first(records);
        }

        town.payment_board = if tree.has("paymentBoard") {
            load_payment_board(tree.get_tree("paymentBoard")?, ctx)?
        } else {
            let mut board = PaymentBoard::new();
            if tree.has("communalStorage") {
                load_legacy_communal(tree.get_tree("communalStorage")?, ctx, &mut board);
            }
            board
        };
        if tree.has("personalStorage") {
            town.personal_storage = load_personal_storage(tree.get_tree("personalStorage")?, ctx);
        }

        if tree.has("unlocked") {
            for (key, level) in tree.get_tree("unlocked")? {
                let Some(level) = level.as_u64().and_then(|l| u32::try_from(l).ok()) else {
                    warn!(town = %id, node = key.as_str(), "skipping malformed unlock level");
                    continue;
                };
                town.unlocked.insert(UpgradeId::from(key.as_str()), level);
            }
        }
        if tree.has("research") {
            match tree.get_tree("research").and_then(read_research) {
                Ok(research) => town.research = Some(research),
                Err(e) => warn!(town = %id, error = %e, "dropping malformed research progress"),
            }
        }
        if tree.has("activeRecipes") {
            town.active_recipes = tree
                .get_list("activeRecipes")?
                .iter()
                .filter_map(Value::as_str)
                .map(RecipeId::from)
                .collect();
        }
        if tree.has("productionProgress") {
            let progress: BTreeMap<RecipeId, f64> = tree
                .get_tree("productionProgress")?
                .iter()
                .filter_map(|(k, v)| v.as_f64().map(|p| (RecipeId::from(k.as_str()), p)))
                .collect();
            town.production_progress = progress;
        }
        Ok(town)
    }
}

fn read_visit(entry: &SaveTree) -> Result<VisitRecord, LoadError> {
    Ok(VisitRecord {
        timestamp: entry.get_time("timestamp")?,
        origin: TownId(entry.get_u64("townId")?),
        count: entry.get_u32("count")?,
        origin_position: read_position(entry.get_tree("pos")?)?,
    })
}

fn read_research(r: &SaveTree) -> Result<ResearchProgress, LoadError> {
    Ok(ResearchProgress {
        node: UpgradeId::from(r.get_str("node")?),
        remaining_days: r.get_f64("remainingDays")?,
    })
}

fn coord(tree: &SaveTree, key: &str) -> Result<i32, LoadError> {
    i32::try_from(tree.get_i64(key)?).map_err(|_| LoadError::WrongType {
        field: key.to_string(),
        expected: "i32",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use town_core::{ActorId, ItemId, ResourceId, ResourceRegistry, ResourceType};
    use town_econ::{ItemStack, RewardDraft, RewardSource};

    fn registry() -> ResourceRegistry {
        ResourceRegistry::from_types([
            ResourceType::new("wheat", "minecraft:wheat"),
            ResourceType::new("emerald", "minecraft:emerald"),
        ])
        .unwrap()
    }

    #[test]
    fn town_round_trips_through_save_tree() {
        let config = TownConfig::default();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut town = Town::new(TownId(3), Position::new(10, 64, -5), "Riverside", &config);
        town.economy_mut()
            .add_resource(&ResourceId::from("wheat"), 42)
            .unwrap();
        town.add_visitors(TownId(1), Position::new(0, 64, 0), 13, &config, now);
        town.set_path(Some(Position::new(1, 2, 3)), None);
        town.add_to_buffer(&ItemId::from("minecraft:emerald"), 4).unwrap();
        town.add_to_personal_storage(&ActorId::from("alice"), &ItemId::from("minecraft:wheat"), 2)
            .unwrap();
        town.post_reward(
            RewardDraft::new(
                RewardSource::Milestone,
                vec![ItemStack::new("minecraft:emerald", 1)],
            ),
            &config,
            now,
        );
        town.unlocked.insert(UpgradeId::from("granary"), 2);
        town.research = Some(ResearchProgress {
            node: UpgradeId::from("better_ovens"),
            remaining_days: 1.5,
        });
        town.activate_recipe(RecipeId::from("wheat_farm"));

        let resources = registry();
        let ctx = LoadContext::new(&resources);
        let restored = Town::load(&town.save(), &ctx, &config).unwrap();
        assert_eq!(restored, town);
    }

    #[test]
    fn legacy_communal_storage_becomes_buffer() {
        let resources = registry();
        let ctx = LoadContext::new(&resources);
        let tree = json!({
            "id": 7,
            "name": "Old Town",
            "posX": 0, "posY": 70, "posZ": 0,
            "economy": { "resources": { "wheat": 5 }, "population": 12 },
            "communalStorage": { "minecraft:emerald": 9, " ": 3 }
        });
        let town = Town::load(tree.as_object().unwrap(), &ctx, &TownConfig::default()).unwrap();
        assert_eq!(town.population(), 12);
        assert_eq!(town.payment_board().buffer_count(&ItemId::from("minecraft:emerald")), 9);
        assert_eq!(town.payment_board().buffer().len(), 1);
    }

    #[test]
    fn malformed_visit_records_and_research_are_skipped() {
        let resources = registry();
        let ctx = LoadContext::new(&resources);
        let tree = json!({
            "id": 4,
            "name": "Hillcrest",
            "posX": 0, "posY": 64, "posZ": 0,
            "visitHistory": [
                { "timestamp": 1_700_000_000_000i64, "townId": 2, "count": 3,
                  "pos": { "x": 10, "y": 64, "z": 0 } },
                { "timestamp": "bad", "townId": 2, "count": 1,
                  "pos": { "x": 10, "y": 64, "z": 0 } },
                "garbage"
            ],
            "research": { "node": "granary" }
        });
        let town = Town::load(tree.as_object().unwrap(), &ctx, &TownConfig::default()).unwrap();
        assert_eq!(town.visit_history().len(), 1);
        assert_eq!(town.visit_history().latest().map(|r| r.count), Some(3));
        assert!(town.research().is_none());
    }

    #[test]
    fn missing_position_is_an_error() {
        let resources = registry();
        let ctx = LoadContext::new(&resources);
        let tree = json!({ "id": 1, "name": "x", "posX": 0, "posY": 0 });
        let err = Town::load(tree.as_object().unwrap(), &ctx, &TownConfig::default()).unwrap_err();
        assert_eq!(err, LoadError::MissingField("posZ".into()));
    }
}

//! Save/load of the per-settlement ledgers.

use serde_json::Value;
use town_core::ActorId;
use town_econ::{
    ItemStack, PaymentBoard, PersonalStorage, RewardEntry, RewardId, RewardSource, RewardStatus,
    Stockpile, TownEconomy,
};
use tracing::{info, warn};

use crate::tree::{read_counts, time_value, write_counts, LoadContext, LoadError, SaveTree, TreeExt};

pub fn save_economy(economy: &TownEconomy) -> SaveTree {
    let mut t = SaveTree::new();
    t.insert(
        "resources".into(),
        Value::Object(write_counts(
            economy.all_resources().iter().map(|(k, v)| (k, *v)),
        )),
    );
    t.insert("population".into(), Value::from(economy.population()));
    t
}

pub fn load_economy(tree: &SaveTree, ctx: &LoadContext<'_>) -> Result<TownEconomy, LoadError> {
    let mut economy = TownEconomy::new(tree.get_u32("population")?);
    if tree.has("resources") {
        for (resource, count) in read_counts(tree.get_tree("resources")?, |k| ctx.resource(k)) {
            let delta = i64::try_from(count).map_err(|_| LoadError::WrongType {
                field: format!("resources.{resource}"),
                expected: "count",
            })?;
            economy
                .add_resource(&resource, delta)
                .map_err(|_| LoadError::WrongType {
                    field: format!("resources.{resource}"),
                    expected: "count",
                })?;
        }
    }
    Ok(economy)
}

fn save_stacks(stacks: &[ItemStack]) -> Value {
    Value::Array(
        stacks
            .iter()
            .map(|s| {
                let mut t = SaveTree::new();
                t.insert("item".into(), Value::from(s.item.as_str()));
                t.insert("count".into(), Value::from(s.count));
                Value::Object(t)
            })
            .collect(),
    )
}

fn load_stacks(list: &[Value], ctx: &LoadContext<'_>) -> Vec<ItemStack> {
    list.iter()
        .filter_map(|v| {
            let t = v.as_object()?;
            let count = t.get_u64("count").ok()?;
            let item = ctx.item(t.get_str("item").ok()?)?;
            Some(ItemStack { item, count })
        })
        .collect()
}

fn save_reward(entry: &RewardEntry) -> Value {
    let mut t = SaveTree::new();
    t.insert("id".into(), Value::from(entry.id.0));
    t.insert("timestamp".into(), time_value(entry.timestamp));
    t.insert("expirationTime".into(), time_value(entry.expiration_time));
    t.insert("source".into(), Value::from(entry.source.as_str()));
    t.insert("rewards".into(), save_stacks(&entry.rewards));
    t.insert("status".into(), Value::from(entry.status.as_str()));
    t.insert("eligibility".into(), Value::from(entry.eligibility.as_str()));
    t.insert(
        "metadata".into(),
        Value::Object(
            entry
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect(),
        ),
    );
    Value::Object(t)
}

fn load_reward(t: &SaveTree, ctx: &LoadContext<'_>) -> Result<RewardEntry, LoadError> {
    let source: RewardSource = t.get_str("source")?.parse().map_err(|_| LoadError::WrongType {
        field: "source".into(),
        expected: "reward source",
    })?;
    let status: RewardStatus = t.get_str("status")?.parse().map_err(|_| LoadError::WrongType {
        field: "status".into(),
        expected: "reward status",
    })?;
    let metadata = match t.get("metadata").and_then(Value::as_object) {
        Some(m) => m
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        None => Default::default(),
    };
    Ok(RewardEntry {
        id: RewardId(t.get_u64("id")?),
        timestamp: t.get_time("timestamp")?,
        expiration_time: t.get_time("expirationTime")?,
        source,
        rewards: load_stacks(t.get_list("rewards")?, ctx),
        status,
        eligibility: t.get_str("eligibility").unwrap_or_default().to_string(),
        metadata,
    })
}

pub fn save_payment_board(board: &PaymentBoard) -> SaveTree {
    let mut t = SaveTree::new();
    t.insert(
        "buffer".into(),
        Value::Object(write_counts(board.buffer().iter().map(|(k, v)| (k, *v)))),
    );
    t.insert(
        "rewards".into(),
        Value::Array(board.rewards().iter().map(save_reward).collect()),
    );
    t.insert("nextRewardId".into(), Value::from(board.next_reward_id()));
    t
}

/// Load a payment board. Malformed reward entries are logged and skipped.
pub fn load_payment_board(tree: &SaveTree, ctx: &LoadContext<'_>) -> Result<PaymentBoard, LoadError> {
    let mut buffer = Stockpile::new();
    if tree.has("buffer") {
        for (item, count) in read_counts(tree.get_tree("buffer")?, |k| ctx.item(k)) {
            buffer.set(&item, count);
        }
    }
    let mut rewards = Vec::new();
    if tree.has("rewards") {
        for (idx, v) in tree.get_list("rewards")?.iter().enumerate() {
            let Some(entry_tree) = v.as_object() else {
                warn!(idx, "skipping non-tree reward entry");
                continue;
            };
            match load_reward(entry_tree, ctx) {
                Ok(entry) => rewards.push(entry),
                Err(e) => warn!(idx, error = %e, "skipping malformed reward entry"),
            }
        }
    }
    let next = tree.get_u64("nextRewardId").unwrap_or(0);
    Ok(PaymentBoard::from_parts(buffer, rewards, next))
}

/// Move every entry of a legacy `communalStorage` tree into the board's buffer.
pub fn load_legacy_communal(
    communal: &SaveTree,
    ctx: &LoadContext<'_>,
    board: &mut PaymentBoard,
) -> usize {
    let mut migrated = 0;
    for (item, count) in read_counts(communal, |k| ctx.item(k)) {
        let Ok(delta) = i64::try_from(count) else {
            warn!(%item, count, "skipping oversized legacy count");
            continue;
        };
        match board.add_to_buffer(&item, delta) {
            Ok(_) => migrated += 1,
            Err(e) => warn!(%item, error = %e, "failed to migrate legacy entry"),
        }
    }
    info!(migrated, "migrated legacy communal storage into payment board buffer");
    migrated
}

pub fn save_personal_storage(storage: &PersonalStorage) -> SaveTree {
    storage
        .actors()
        .map(|(actor, items)| {
            (
                actor.to_string(),
                Value::Object(write_counts(items.iter().map(|(k, v)| (k, *v)))),
            )
        })
        .collect()
}

pub fn load_personal_storage(tree: &SaveTree, ctx: &LoadContext<'_>) -> PersonalStorage {
    let mut storage = PersonalStorage::new();
    for (actor, items) in tree {
        let Some(items) = items.as_object() else {
            warn!(actor = actor.as_str(), "skipping malformed personal storage");
            continue;
        };
        let actor = ActorId::from(actor.as_str());
        for (item, count) in read_counts(items, |k| ctx.item(k)) {
            let Ok(delta) = i64::try_from(count) else {
                continue;
            };
            if let Err(e) = storage.add(&actor, &item, delta) {
                warn!(%actor, %item, error = %e, "skipping personal storage entry");
            }
        }
    }
    storage
}

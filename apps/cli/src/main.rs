#![deny(warnings)]

//! Headless CLI: load content, place a handful of towns, route visitors
//! between them and tick the world forward.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use persistence::{MemoryStore, SaveStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use town_core::{Position, SimConfig};
use town_runtime::{Platform, Simulation, TownId, TownManager};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    content: Option<String>,
    days: u64,
    seed: u64,
    towns: u32,
    visitors_per_day: u32,
    save: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        content: None,
        days: 30,
        seed: 42,
        towns: 4,
        visitors_per_day: 3,
        save: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--content" => args.content = Some(value()?),
            "--days" => args.days = value()?.parse().context("--days")?,
            "--seed" => args.seed = value()?.parse().context("--seed")?,
            "--towns" => args.towns = value()?.parse().context("--towns")?,
            "--visitors" => args.visitors_per_day = value()?.parse().context("--visitors")?,
            "--save" => args.save = Some(value()?),
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    info!(
        content = ?args.content,
        days = args.days,
        seed = args.seed,
        towns = args.towns,
        sha = env!("GIT_SHA"),
        "starting CLI"
    );

    let loaded = match &args.content {
        Some(dir) => content::load_dir(dir).with_context(|| format!("loading content from {dir}"))?,
        None => content::base_content().context("loading built-in content")?,
    };
    info!(packs = ?loaded.packs, "content loaded");

    let mut manager = TownManager::new(Arc::new(loaded.catalog), loaded.config);
    let spacing = (manager.config().default_population as i32 * 2 + 10).max(16);
    let side = (args.towns as f64).sqrt().ceil().max(1.0) as i32;
    let mut ids: Vec<TownId> = Vec::new();
    for i in 0..args.towns as i32 {
        let position = Position::new((i % side) * spacing, 64, (i / side) * spacing);
        match manager.register_town(position, &format!("Town {}", i + 1)) {
            Ok(id) => ids.push(id),
            Err(e) => warn!(%position, error = %e, "town not placed"),
        }
    }

    let start: DateTime<Utc> = Utc::now();
    let config = SimConfig {
        tick_days: 1.0,
        rng_seed: args.seed,
    };
    let mut sim = Simulation::new(manager, &config, start);
    let mut traffic = ChaCha8Rng::seed_from_u64(args.seed.wrapping_add(1));
    let platform = Platform::new(1, "Central Station");

    for _ in 0..args.days {
        sim.run_ticks(1);
        if ids.len() < 2 {
            continue;
        }
        let now = sim.clock().now();
        let mut manager = sim.manager_mut();
        for _ in 0..args.visitors_per_day {
            let origin = ids[traffic.gen_range(0..ids.len())];
            let destination = ids[traffic.gen_range(0..ids.len())];
            if origin == destination {
                continue;
            }
            if let Err(e) = manager.route_visitor(origin, destination, &platform, now) {
                warn!(%origin, %destination, error = %e, "visitor not routed");
            }
        }
    }

    let stats = sim.stats().clone();
    let manager = sim.manager();
    println!(
        "Sim OK | build: {} ({}) | days: {} | towns: {} | cycles: {} | research started: {} | completed: {}",
        env!("GIT_SHA"),
        env!("BUILD_DATE"),
        stats.ticks,
        manager.len(),
        stats.cycles,
        stats.research_started,
        stats.research_completed
    );
    for town in manager.towns() {
        let snapshot = manager
            .snapshot(town.id())
            .context("town vanished while reporting")?;
        let next = snapshot
            .priorities(manager.catalog())
            .first()
            .map(|p| format!("{} ({:.2})", p.node, p.score))
            .unwrap_or_else(|| "-".to_string());
        let stock: Vec<String> = snapshot
            .stock
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(r, n)| format!("{r}={n}"))
            .collect();
        println!(
            "{} [{}] @ {} | pop: {} | unlocked: {} | researching: {} | next: {} | stock: {}",
            town.name(),
            town.id(),
            town.position(),
            town.population(),
            snapshot.unlocked.len(),
            snapshot
                .researching
                .as_ref()
                .map_or("-".to_string(), |n| n.to_string()),
            next,
            stock.join(" ")
        );
    }

    if let Some(path) = &args.save {
        let mut manager = sim.manager_mut();
        for id in &ids {
            manager.mark_dirty(*id);
        }
        let mut store = MemoryStore::new();
        let written = manager.save_dirty(&mut store);
        let trees: serde_json::Map<String, serde_json::Value> = store
            .keys()
            .into_iter()
            .filter_map(|k| store.get(&k).map(|t| (k.clone(), serde_json::Value::Object(t.clone()))))
            .collect();
        std::fs::write(path, serde_json::to_string_pretty(&trees)?)
            .with_context(|| format!("writing {path}"))?;
        info!(written, path = path.as_str(), "world saved");
    }

    Ok(())
}

//! ECS tick driver: clock, deterministic RNG and the tick systems.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use town_core::SimConfig;
use town_econ::days_to_duration;

use crate::manager::{TickSummary, TownManager};

/// Simulation clock. Advanced at the start of every tick so towns see the
/// time the tick ends at.
#[derive(Resource, Clone, Debug)]
pub struct SimClock {
    pub start: DateTime<Utc>,
    pub elapsed_days: f64,
    pub tick_days: f64,
    pub ticks: u64,
}

impl SimClock {
    pub fn new(start: DateTime<Utc>, tick_days: f64) -> Self {
        Self {
            start,
            elapsed_days: 0.0,
            tick_days,
            ticks: 0,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.start + days_to_duration(self.elapsed_days)
    }
}

#[derive(Resource)]
pub struct SimRng(pub ChaCha8Rng);

/// Running totals across all ticks.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct SimStats {
    pub ticks: u64,
    pub cycles: u64,
    pub research_started: u64,
    pub research_completed: u64,
    pub rewards_expired: u64,
    pub towns_removed: u64,
    pub last: TickSummary,
}

pub fn advance_clock(mut clock: ResMut<SimClock>) {
    clock.elapsed_days += clock.tick_days;
    clock.ticks += 1;
}

pub fn tick_towns(
    clock: Res<SimClock>,
    mut rng: ResMut<SimRng>,
    mut manager: ResMut<TownManager>,
    mut stats: ResMut<SimStats>,
) {
    let summary = manager.tick(clock.tick_days, clock.now(), &mut rng.0);
    stats.ticks += 1;
    stats.cycles += summary.cycles as u64;
    stats.research_started += summary.research_started as u64;
    stats.research_completed += summary.research_completed as u64;
    stats.rewards_expired += summary.rewards_expired as u64;
    stats.towns_removed += summary.towns_removed.len() as u64;
    stats.last = summary;
}

/// A world plus the schedule that advances it.
pub struct Simulation {
    world: World,
    schedule: Schedule,
}

impl Simulation {
    pub fn new(manager: TownManager, config: &SimConfig, start: DateTime<Utc>) -> Self {
        let mut world = World::new();
        world.insert_resource(manager);
        world.insert_resource(SimClock::new(start, config.tick_days));
        world.insert_resource(SimRng(ChaCha8Rng::seed_from_u64(config.rng_seed)));
        world.insert_resource(SimStats::default());

        // Single-threaded so RNG consumption order is reproducible.
        let mut schedule = Schedule::default();
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);
        schedule.add_systems((advance_clock, tick_towns).chain());
        Self { world, schedule }
    }

    pub fn run_ticks(&mut self, n: u64) -> SimStats {
        for _ in 0..n {
            self.schedule.run(&mut self.world);
        }
        self.stats().clone()
    }

    pub fn stats(&self) -> &SimStats {
        self.world.resource::<SimStats>()
    }

    pub fn clock(&self) -> &SimClock {
        self.world.resource::<SimClock>()
    }

    pub fn manager(&self) -> &TownManager {
        self.world.resource::<TownManager>()
    }

    pub fn manager_mut(&mut self) -> Mut<'_, TownManager> {
        self.world.resource_mut::<TownManager>()
    }

    pub fn world(&self) -> &World {
        &self.world
    }
}

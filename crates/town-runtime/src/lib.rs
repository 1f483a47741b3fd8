#![deny(warnings)]

//! Settlement runtime: the `Town` aggregate, the per-world `TownManager`,
//! boundary checks, platform routing, the read-only snapshot mirror and the
//! ECS schedule that ticks everything.

pub mod boundary;
pub mod manager;
pub mod mirror;
pub mod persist;
pub mod platform;
pub mod schedule;
pub mod town;
pub mod visits;

pub use boundary::{PlacementError, TownBoundaryService};
pub use manager::{store_key, TickSummary, TownManager};
pub use mirror::TownSnapshot;
pub use platform::{Platform, RouteError};
pub use schedule::{SimClock, SimRng, SimStats, Simulation};
pub use town::{ResearchError, ResearchProgress, TickOutcome, Town, TownId, TownView};
pub use visits::{VisitHistory, VisitRecord, MAX_VISIT_HISTORY};

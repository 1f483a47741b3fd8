#![deny(warnings)]

//! Per-settlement ledgers: resource economy, payment board, personal storage.
//!
//! All ledgers share the same clamp rule: a removal larger than the current
//! holding fails with [`StorageError`] and leaves the ledger untouched.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use town_core::ItemId;

pub mod economy;
pub mod payment_board;
pub mod personal;
pub mod stockpile;

pub use economy::TownEconomy;
pub use payment_board::{
    ActorInventory, ClaimDestination, ClaimError, ClaimedItems, DeliveryRejected, PaymentBoard,
    RewardDraft, RewardEntry, RewardId, RewardSource, RewardStatus,
};
pub use personal::PersonalStorage;
pub use stockpile::{Stockpile, StorageError};

/// An item and a count, the unit rewards are granted in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemId,
    pub count: u64,
}

impl ItemStack {
    pub fn new(item: impl Into<String>, count: u64) -> Self {
        Self {
            item: ItemId(item.into()),
            count,
        }
    }
}

/// Convert fractional in-game days into a chrono duration (millisecond precision).
pub fn days_to_duration(days: f64) -> Duration {
    if !days.is_finite() || days <= 0.0 {
        return Duration::zero();
    }
    let ms = (days * 86_400_000.0).min(i64::MAX as f64 / 2.0);
    Duration::milliseconds(ms as i64)
}

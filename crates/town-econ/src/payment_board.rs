//! Payment board: communal buffer storage plus a ledger of claimable rewards.
//!
//! A reward moves `Unclaimed -> Claimed` through [`PaymentBoard::claim`] or
//! `Unclaimed -> Expired` once its expiration time passes. Expiry is lazy:
//! it is evaluated whenever an entry is queried or claimed, there is no timer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use town_core::{ActorId, ItemId};
use tracing::{debug, info};

use crate::{ItemStack, PersonalStorage, Stockpile, StorageError};

/// Unique reward identifier within one board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RewardId(pub u64);

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reward#{}", self.0)
    }
}

/// Origin category of a reward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardSource {
    TouristPayment,
    TouristArrival,
    Milestone,
    Trade,
    Delivery,
    Other,
}

/// Lifecycle state of a reward. `Claimed` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    Unclaimed,
    Claimed,
    Expired,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($ty))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(RewardSource {
    TouristPayment => "TOURIST_PAYMENT",
    TouristArrival => "TOURIST_ARRIVAL",
    Milestone => "MILESTONE",
    Trade => "TRADE",
    Delivery => "DELIVERY",
    Other => "OTHER",
});

str_enum!(RewardStatus {
    Unclaimed => "UNCLAIMED",
    Claimed => "CLAIMED",
    Expired => "EXPIRED",
});

/// Eligibility qualifier restricting a reward to one actor.
const ACTOR_PREFIX: &str = "actor:";

/// A claimable, time-bounded grant of items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub id: RewardId,
    pub timestamp: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub source: RewardSource,
    pub rewards: Vec<ItemStack>,
    pub status: RewardStatus,
    /// Empty or `any` for everyone, `actor:<id>` for one actor. Other
    /// qualifiers are tags for collaborators and do not restrict claims here.
    pub eligibility: String,
    pub metadata: BTreeMap<String, String>,
}

impl RewardEntry {
    /// Status with lazy expiry applied, without mutating.
    pub fn status_at(&self, now: DateTime<Utc>) -> RewardStatus {
        match self.status {
            RewardStatus::Unclaimed if now >= self.expiration_time => RewardStatus::Expired,
            s => s,
        }
    }

    /// Whether `actor` satisfies the eligibility qualifier.
    pub fn is_eligible(&self, actor: &ActorId) -> bool {
        match self.eligibility.trim().strip_prefix(ACTOR_PREFIX) {
            Some(only) => only == actor.as_str(),
            None => true,
        }
    }

    fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == RewardStatus::Unclaimed && now >= self.expiration_time {
            self.status = RewardStatus::Expired;
            return true;
        }
        false
    }
}

/// Parameters of a reward about to be posted.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardDraft {
    pub source: RewardSource,
    pub rewards: Vec<ItemStack>,
    pub eligibility: String,
    pub metadata: BTreeMap<String, String>,
}

impl RewardDraft {
    pub fn new(source: RewardSource, rewards: Vec<ItemStack>) -> Self {
        Self {
            source,
            rewards,
            eligibility: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn for_actor(mut self, actor: &ActorId) -> Self {
        self.eligibility = format!("{ACTOR_PREFIX}{actor}");
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Where claimed items go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimDestination {
    /// The settlement's shared buffer storage.
    Buffer,
    /// The claiming actor's own inventory, via [`ActorInventory`].
    Direct,
}

/// Items granted by a successful claim.
pub type ClaimedItems = Vec<ItemStack>;

/// Rejection reported by an external inventory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("delivery rejected: {0}")]
pub struct DeliveryRejected(pub String);

/// External inventory collaborator used for direct claims.
pub trait ActorInventory {
    /// Hand items to an actor. Must either accept all of them or none.
    fn deliver(&mut self, actor: &ActorId, items: &[ItemStack]) -> Result<(), DeliveryRejected>;
}

/// Errors produced by reward claims.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("{0} not found")]
    NotFound(RewardId),
    #[error("{id} already processed ({status})")]
    AlreadyResolved { id: RewardId, status: RewardStatus },
    #[error("{0} has expired")]
    Expired(RewardId),
    #[error("{id} is not claimable by {actor}")]
    NotEligible { id: RewardId, actor: ActorId },
    #[error(transparent)]
    Delivery(#[from] DeliveryRejected),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reward ledger and shared buffer of one settlement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaymentBoard {
    buffer: Stockpile<ItemId>,
    rewards: Vec<RewardEntry>,
    next_reward_id: u64,
}

impl PaymentBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a board from persisted parts. The id counter is raised past
    /// every existing entry.
    pub fn from_parts(
        buffer: Stockpile<ItemId>,
        rewards: Vec<RewardEntry>,
        next_reward_id: u64,
    ) -> Self {
        let floor = rewards.iter().map(|r| r.id.0 + 1).max().unwrap_or(0);
        Self {
            buffer,
            rewards,
            next_reward_id: next_reward_id.max(floor),
        }
    }

    /// Post a new unclaimed reward expiring `ttl` after `now`.
    pub fn post(&mut self, draft: RewardDraft, now: DateTime<Utc>, ttl: Duration) -> RewardId {
        let id = RewardId(self.next_reward_id);
        self.next_reward_id += 1;
        debug!(%id, source = %draft.source, items = draft.rewards.len(), "reward posted");
        self.rewards.push(RewardEntry {
            id,
            timestamp: now,
            expiration_time: now + ttl,
            source: draft.source,
            rewards: draft.rewards,
            status: RewardStatus::Unclaimed,
            eligibility: draft.eligibility,
            metadata: draft.metadata,
        });
        id
    }

    /// Claim a reward for `actor`. The only legal `Unclaimed -> Claimed` path.
    pub fn claim(
        &mut self,
        id: RewardId,
        actor: &ActorId,
        destination: ClaimDestination,
        now: DateTime<Utc>,
        inventory: &mut dyn ActorInventory,
    ) -> Result<ClaimedItems, ClaimError> {
        let entry = self
            .rewards
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ClaimError::NotFound(id))?;
        if entry.refresh_expiry(now) {
            debug!(%id, "reward expired at claim time");
        }
        match entry.status {
            RewardStatus::Unclaimed => {}
            RewardStatus::Expired => return Err(ClaimError::Expired(id)),
            status => return Err(ClaimError::AlreadyResolved { id, status }),
        }
        if !entry.is_eligible(actor) {
            return Err(ClaimError::NotEligible {
                id,
                actor: actor.clone(),
            });
        }
        match destination {
            ClaimDestination::Buffer => {
                self.buffer
                    .add_all(entry.rewards.iter().map(|s| (&s.item, s.count)))?;
            }
            ClaimDestination::Direct => inventory.deliver(actor, &entry.rewards)?,
        }
        entry.status = RewardStatus::Claimed;
        info!(%id, %actor, ?destination, "reward claimed");
        Ok(entry.rewards.clone())
    }

    /// Materialize lazy expiry, returning how many entries expired.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> usize {
        self.rewards
            .iter_mut()
            .map(|e| e.refresh_expiry(now))
            .filter(|expired| *expired)
            .count()
    }

    /// Drop resolved entries created before `before`. Returns how many were removed.
    pub fn prune_resolved(&mut self, now: DateTime<Utc>, before: DateTime<Utc>) -> usize {
        let len = self.rewards.len();
        self.rewards
            .retain(|e| e.status_at(now) == RewardStatus::Unclaimed || e.timestamp >= before);
        len - self.rewards.len()
    }

    pub fn get(&self, id: RewardId) -> Option<&RewardEntry> {
        self.rewards.iter().find(|e| e.id == id)
    }

    /// Entries still claimable at `now`, oldest first.
    pub fn unclaimed(&self, now: DateTime<Utc>) -> impl Iterator<Item = &RewardEntry> {
        self.rewards
            .iter()
            .filter(move |e| e.status_at(now) == RewardStatus::Unclaimed)
    }

    pub fn rewards(&self) -> &[RewardEntry] {
        &self.rewards
    }

    pub fn next_reward_id(&self) -> u64 {
        self.next_reward_id
    }

    /// Add to (or with a negative delta, remove from) the shared buffer.
    pub fn add_to_buffer(&mut self, item: &ItemId, delta: i64) -> Result<u64, StorageError> {
        self.buffer.apply(item, delta)
    }

    pub fn remove_from_buffer(&mut self, item: &ItemId, count: u64) -> Result<u64, StorageError> {
        self.buffer.remove(item, count)
    }

    pub fn buffer_count(&self, item: &ItemId) -> u64 {
        self.buffer.count(item)
    }

    pub fn buffer(&self) -> &BTreeMap<ItemId, u64> {
        self.buffer.as_map()
    }

    /// Move items from the shared buffer into an actor's personal storage.
    pub fn withdraw_to_personal(
        &mut self,
        personal: &mut PersonalStorage,
        actor: &ActorId,
        item: &ItemId,
        count: u64,
    ) -> Result<u64, StorageError> {
        let delta = i64::try_from(count).map_err(|_| StorageError::Overflow(item.to_string()))?;
        let available = self.buffer.count(item);
        if available < count {
            return Err(StorageError::Insufficient {
                key: item.to_string(),
                requested: count,
                available,
            });
        }
        // personal.add fails without mutating
        let held = personal.add(actor, item, delta)?;
        self.buffer.remove(item, count)?;
        Ok(held)
    }
}

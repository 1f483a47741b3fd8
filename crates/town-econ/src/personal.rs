//! Per-actor storage scoped to one settlement.

use std::collections::BTreeMap;

use town_core::{ActorId, ItemId};

use crate::{Stockpile, StorageError};

/// Actor-keyed item holdings. Actors get a map on first deposit; entries
/// that reach zero are dropped, and so are actors left with nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonalStorage {
    actors: BTreeMap<ActorId, Stockpile<ItemId>>,
}

impl PersonalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a signed delta to one actor's holding of `item`.
    pub fn add(&mut self, actor: &ActorId, item: &ItemId, delta: i64) -> Result<u64, StorageError> {
        if delta < 0 && !self.actors.contains_key(actor) {
            return Err(StorageError::Insufficient {
                key: item.to_string(),
                requested: delta.unsigned_abs(),
                available: 0,
            });
        }
        let pile = self.actors.entry(actor.clone()).or_default();
        let result = pile.apply(item, delta);
        if pile.is_empty() {
            self.actors.remove(actor);
        }
        result
    }

    pub fn count(&self, actor: &ActorId, item: &ItemId) -> u64 {
        self.actors.get(actor).map(|p| p.count(item)).unwrap_or(0)
    }

    /// Holdings of one actor, if they have any.
    pub fn holdings(&self, actor: &ActorId) -> Option<&BTreeMap<ItemId, u64>> {
        self.actors.get(actor).map(|p| p.as_map())
    }

    pub fn actors(&self) -> impl Iterator<Item = (&ActorId, &BTreeMap<ItemId, u64>)> {
        self.actors.iter().map(|(a, p)| (a, p.as_map()))
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

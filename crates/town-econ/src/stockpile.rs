//! Keyed non-negative counters with all-or-nothing removal.

use std::collections::BTreeMap;
use std::fmt::Display;

use thiserror::Error;

/// Errors produced by storage mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Removal asked for more than is held.
    #[error("insufficient {key}: requested {requested}, available {available}")]
    Insufficient {
        key: String,
        requested: u64,
        available: u64,
    },
    /// Addition would overflow the counter.
    #[error("counter overflow for {0}")]
    Overflow(String),
}

/// Map of key to count. Zero counts are never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stockpile<K: Ord> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord> Default for Stockpile<K> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + Display> Stockpile<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Apply a signed delta. Returns the new count, or fails without mutating
    /// when the removal exceeds the holding.
    pub fn apply(&mut self, key: &K, delta: i64) -> Result<u64, StorageError> {
        let current = self.count(key);
        let next = if delta >= 0 {
            current
                .checked_add(delta as u64)
                .ok_or_else(|| StorageError::Overflow(key.to_string()))?
        } else {
            let requested = delta.unsigned_abs();
            current
                .checked_sub(requested)
                .ok_or_else(|| StorageError::Insufficient {
                    key: key.to_string(),
                    requested,
                    available: current,
                })?
        };
        self.set(key, next);
        Ok(next)
    }

    pub fn add(&mut self, key: &K, amount: u64) -> Result<u64, StorageError> {
        let next = self
            .count(key)
            .checked_add(amount)
            .ok_or_else(|| StorageError::Overflow(key.to_string()))?;
        self.set(key, next);
        Ok(next)
    }

    pub fn remove(&mut self, key: &K, amount: u64) -> Result<u64, StorageError> {
        let available = self.count(key);
        let next = available
            .checked_sub(amount)
            .ok_or_else(|| StorageError::Insufficient {
                key: key.to_string(),
                requested: amount,
                available,
            })?;
        self.set(key, next);
        Ok(next)
    }

    /// Overwrite a count; zero removes the key.
    pub fn set(&mut self, key: &K, count: u64) {
        if count == 0 {
            self.counts.remove(key);
        } else {
            self.counts.insert(key.clone(), count);
        }
    }

    /// Remove several amounts at once; nothing changes unless all succeed.
    pub fn remove_all<'a>(
        &mut self,
        items: impl IntoIterator<Item = (&'a K, u64)>,
    ) -> Result<(), StorageError>
    where
        K: 'a,
    {
        let mut needed: BTreeMap<&K, u64> = BTreeMap::new();
        for (key, amount) in items {
            let total = needed.entry(key).or_insert(0);
            *total = total.saturating_add(amount);
        }
        for (key, requested) in &needed {
            let available = self.count(key);
            if available < *requested {
                return Err(StorageError::Insufficient {
                    key: key.to_string(),
                    requested: *requested,
                    available,
                });
            }
        }
        for (key, amount) in needed {
            let left = self.count(key) - amount;
            self.set(key, left);
        }
        Ok(())
    }

    /// Add several amounts at once; nothing changes unless all fit.
    pub fn add_all<'a>(
        &mut self,
        items: impl IntoIterator<Item = (&'a K, u64)>,
    ) -> Result<(), StorageError>
    where
        K: 'a,
    {
        let mut staged: BTreeMap<&K, u64> = BTreeMap::new();
        for (key, amount) in items {
            let base = match staged.get(key) {
                Some(v) => *v,
                None => self.count(key),
            };
            let next = base
                .checked_add(amount)
                .ok_or_else(|| StorageError::Overflow(key.to_string()))?;
            staged.insert(key, next);
        }
        for (key, count) in staged {
            self.set(key, count);
        }
        Ok(())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    pub fn as_map(&self) -> &BTreeMap<K, u64> {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

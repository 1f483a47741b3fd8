//! Dirty tracking and the store the external save subsystem writes to.

use std::collections::{BTreeMap, BTreeSet};

use crate::SaveTree;

/// Keys whose state changed since the last save. Marking is fire-and-forget;
/// the save subsystem drains the set when it gets around to writing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtySet<K: Ord> {
    keys: BTreeSet<K>,
}

impl<K: Ord> Default for DirtySet<K> {
    fn default() -> Self {
        Self {
            keys: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> DirtySet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, key: K) {
        self.keys.insert(key);
    }

    pub fn is_dirty(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Drain all dirty keys in order.
    pub fn take(&mut self) -> Vec<K> {
        std::mem::take(&mut self.keys).into_iter().collect()
    }
}

/// Destination for serialized settlement trees.
pub trait SaveStore {
    fn put(&mut self, key: &str, tree: SaveTree);
    fn get(&self, key: &str) -> Option<&SaveTree>;
    fn remove(&mut self, key: &str) -> Option<SaveTree>;
    fn keys(&self) -> Vec<String>;
}

/// In-memory store, used by the CLI and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    trees: BTreeMap<String, SaveTree>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `put` calls served.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Every stored tree, keyed by store key.
    pub fn into_trees(self) -> BTreeMap<String, SaveTree> {
        self.trees
    }
}

impl SaveStore for MemoryStore {
    fn put(&mut self, key: &str, tree: SaveTree) {
        self.writes += 1;
        self.trees.insert(key.to_string(), tree);
    }

    fn get(&self, key: &str) -> Option<&SaveTree> {
        self.trees.get(key)
    }

    fn remove(&mut self, key: &str) -> Option<SaveTree> {
        self.trees.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.trees.keys().cloned().collect()
    }
}

//! Resource catalog: maps stable resource keys to concrete countable items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ItemId, ResourceId, ValidationError};

/// A resource type and the item it is counted in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: ResourceId,
    /// Canonical countable unit, e.g. "minecraft:wheat".
    #[serde(rename = "item")]
    pub canonical_item: ItemId,
}

impl ResourceType {
    pub fn new(id: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            id: ResourceId(id.into()),
            canonical_item: ItemId(item.into()),
        }
    }
}

/// Immutable registry of resource types with item lookups in both directions.
#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    types: BTreeMap<ResourceId, ResourceType>,
    by_item: BTreeMap<ItemId, ResourceId>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list, rejecting duplicate resource ids or items.
    pub fn from_types(
        types: impl IntoIterator<Item = ResourceType>,
    ) -> Result<Self, ValidationError> {
        let mut reg = Self::new();
        for t in types {
            reg.register(t)?;
        }
        Ok(reg)
    }

    pub fn register(&mut self, t: ResourceType) -> Result<(), ValidationError> {
        if self.types.contains_key(&t.id) {
            return Err(ValidationError::DuplicateId(t.id.0.clone()));
        }
        if self.by_item.contains_key(&t.canonical_item) {
            return Err(ValidationError::DuplicateId(t.canonical_item.0.clone()));
        }
        self.by_item.insert(t.canonical_item.clone(), t.id.clone());
        self.types.insert(t.id.clone(), t);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceType> {
        self.types.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.types.contains_key(id)
    }

    /// Item a resource is counted in.
    pub fn item_for(&self, id: &ResourceId) -> Option<&ItemId> {
        self.types.get(id).map(|t| &t.canonical_item)
    }

    /// Resource an item belongs to, if any.
    pub fn resource_for_item(&self, item: &ItemId) -> Option<&ResourceId> {
        self.by_item.get(item)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.types.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

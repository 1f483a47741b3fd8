#![deny(warnings)]

//! Core domain models and invariants for the settlement simulation.
//!
//! This crate defines the static content catalog (resources, production
//! recipes, research nodes), the tunable [`TownConfig`], and the geometry
//! shared by placement and overlap checks. Everything here is immutable once
//! loaded; mutable settlement state lives in `town-econ` and `town-runtime`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod geometry;
pub mod production;
pub mod resource;
pub mod upgrade;

pub use config::{SimConfig, TownConfig};
pub use geometry::{boundaries_overlap, boundary_radius, Position};
pub use production::{ProductionRecipe, ProductionRegistry};
pub use resource::{ResourceRegistry, ResourceType};
pub use upgrade::{EffectTarget, UpgradeEffect, UpgradeNode, UpgradeRegistry};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Stable key of a resource type, e.g. "wheat".
    ResourceId
);
string_id!(
    /// Concrete countable unit a resource maps to, e.g. "minecraft:wheat".
    ItemId
);
string_id!(
    /// Production recipe identifier, e.g. "bread_recipe".
    RecipeId
);
string_id!(
    /// Research node identifier.
    UpgradeId
);
string_id!(
    /// Identifier of an actor (player) holding personal storage or claiming rewards.
    ActorId
);

/// A resource paired with a quantity, used for recipe inputs/outputs and costs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmount {
    pub resource: ResourceId,
    pub amount: u64,
}

impl ResourceAmount {
    pub fn new(resource: impl Into<String>, amount: u64) -> Self {
        Self {
            resource: ResourceId(resource.into()),
            amount,
        }
    }
}

/// Validation errors for content and settlement invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The same identifier was registered twice.
    #[error("duplicate identifier: {0}")]
    DuplicateId(String),
    /// A recipe or upgrade refers to a resource type that is not registered.
    #[error("unknown resource `{resource}` referenced by `{owner}`")]
    UnknownResource { owner: String, resource: String },
    /// A research node lists a prerequisite that does not exist.
    #[error("prerequisite `{prereq}` of `{node}` not found")]
    PrerequisiteNotFound { node: String, prereq: String },
    /// The prerequisite graph contains a cycle through the named node.
    #[error("prerequisite cycle through `{0}`")]
    PrerequisiteCycle(String),
    /// Numeric field must be finite and strictly positive.
    #[error("`{0}` must be finite and > 0")]
    NonPositive(String),
    /// Settlement names must be 1..=32 characters after trimming.
    #[error("name must be between 1 and {max} characters, got {len}")]
    NameLength { len: usize, max: usize },
}

/// Maximum settlement name length accepted by [`validate_town_name`].
pub const MAX_TOWN_NAME_LEN: usize = 32;

/// Validate a settlement name, returning the trimmed form.
pub fn validate_town_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_TOWN_NAME_LEN {
        return Err(ValidationError::NameLength {
            len,
            max: MAX_TOWN_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// The full static content catalog a world runs against.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub resources: ResourceRegistry,
    pub recipes: ProductionRegistry,
    pub upgrades: UpgradeRegistry,
}

impl Catalog {
    pub fn new(
        resources: ResourceRegistry,
        recipes: ProductionRegistry,
        upgrades: UpgradeRegistry,
    ) -> Self {
        Self {
            resources,
            recipes,
            upgrades,
        }
    }

    /// Validate cross-references between registries and the prerequisite DAG.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.recipes.validate(&self.resources)?;
        self.upgrades.validate(&self.resources)?;
        Ok(())
    }
}

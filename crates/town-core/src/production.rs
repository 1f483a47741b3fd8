//! Production recipes: inputs, outputs and base cycle time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{RecipeId, ResourceAmount, ResourceId, ResourceRegistry, ValidationError};

/// A production process a settlement can run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecipe {
    pub id: RecipeId,
    pub display_name: String,
    /// Days one cycle takes at base speed (> 0).
    pub base_cycle_time_days: f64,
    #[serde(default)]
    pub outputs: Vec<ResourceAmount>,
    #[serde(default)]
    pub inputs: Vec<ResourceAmount>,
}

impl ProductionRecipe {
    /// Amount of `resource` produced per day at base speed.
    pub fn output_per_day(&self, resource: &ResourceId) -> f64 {
        per_day(&self.outputs, resource, self.base_cycle_time_days)
    }

    /// Amount of `resource` consumed per day at base speed.
    pub fn input_per_day(&self, resource: &ResourceId) -> f64 {
        per_day(&self.inputs, resource, self.base_cycle_time_days)
    }
}

fn per_day(list: &[ResourceAmount], resource: &ResourceId, cycle_days: f64) -> f64 {
    if cycle_days <= 0.0 {
        return 0.0;
    }
    let total: u64 = list
        .iter()
        .filter(|ra| &ra.resource == resource)
        .map(|ra| ra.amount)
        .sum();
    total as f64 / cycle_days
}

/// Immutable registry of production recipes.
#[derive(Clone, Debug, Default)]
pub struct ProductionRegistry {
    recipes: BTreeMap<RecipeId, ProductionRecipe>,
}

impl ProductionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_recipes(
        recipes: impl IntoIterator<Item = ProductionRecipe>,
    ) -> Result<Self, ValidationError> {
        let mut reg = Self::new();
        for r in recipes {
            reg.register(r)?;
        }
        Ok(reg)
    }

    pub fn register(&mut self, recipe: ProductionRecipe) -> Result<(), ValidationError> {
        if !(recipe.base_cycle_time_days.is_finite() && recipe.base_cycle_time_days > 0.0) {
            return Err(ValidationError::NonPositive(format!(
                "{}.base_cycle_time_days",
                recipe.id
            )));
        }
        if self.recipes.contains_key(&recipe.id) {
            return Err(ValidationError::DuplicateId(recipe.id.0.clone()));
        }
        self.recipes.insert(recipe.id.clone(), recipe);
        Ok(())
    }

    pub fn get(&self, id: &RecipeId) -> Option<&ProductionRecipe> {
        self.recipes.get(id)
    }

    /// Look up by raw string, as effect targets refer to recipes by id.
    pub fn get_str(&self, id: &str) -> Option<&ProductionRecipe> {
        self.recipes.get(&RecipeId::from(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductionRecipe> {
        self.recipes.values()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Check every input/output refers to a registered resource.
    pub fn validate(&self, resources: &ResourceRegistry) -> Result<(), ValidationError> {
        for r in self.recipes.values() {
            for ra in r.inputs.iter().chain(&r.outputs) {
                if !resources.contains(&ra.resource) {
                    return Err(ValidationError::UnknownResource {
                        owner: r.id.0.clone(),
                        resource: ra.resource.0.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

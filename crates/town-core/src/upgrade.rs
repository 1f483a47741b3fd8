//! Research nodes: prerequisites, costs and effects.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RecipeId, ResourceAmount, ResourceId, ResourceRegistry, UpgradeId, ValidationError};

const STORAGE_CAP_ALL: &str = "storage_cap_all";
const STORAGE_CAP_PREFIX: &str = "storage_cap_";

/// What an upgrade effect modifies.
///
/// Serialized as a string: `storage_cap_all`, `storage_cap_<resource>`, or a
/// production recipe id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectTarget {
    /// Storage cap of every resource.
    StorageCapAll,
    /// Storage cap of one resource.
    StorageCap(ResourceId),
    /// Speed of a production recipe.
    Recipe(RecipeId),
}

impl EffectTarget {
    pub fn parse(s: &str) -> Self {
        if s == STORAGE_CAP_ALL {
            EffectTarget::StorageCapAll
        } else if let Some(res) = s.strip_prefix(STORAGE_CAP_PREFIX).filter(|r| !r.is_empty()) {
            EffectTarget::StorageCap(ResourceId::from(res))
        } else {
            EffectTarget::Recipe(RecipeId::from(s))
        }
    }
}

impl From<String> for EffectTarget {
    fn from(s: String) -> Self {
        EffectTarget::parse(&s)
    }
}

impl From<EffectTarget> for String {
    fn from(t: EffectTarget) -> Self {
        t.to_string()
    }
}

impl fmt::Display for EffectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectTarget::StorageCapAll => f.write_str(STORAGE_CAP_ALL),
            EffectTarget::StorageCap(r) => write!(f, "{STORAGE_CAP_PREFIX}{r}"),
            EffectTarget::Recipe(r) => f.write_str(r.as_str()),
        }
    }
}

/// A single modifier applied while a node is unlocked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeEffect {
    pub target: EffectTarget,
    /// Added to a storage cap, or to a recipe's speed multiplier.
    pub value: f64,
}

impl UpgradeEffect {
    pub fn new(target: &str, value: f64) -> Self {
        Self {
            target: EffectTarget::parse(target),
            value,
        }
    }
}

/// A research node in the upgrade tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeNode {
    pub id: UpgradeId,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prereq_nodes: BTreeSet<UpgradeId>,
    #[serde(default)]
    pub costs: Vec<ResourceAmount>,
    #[serde(default)]
    pub effects: Vec<UpgradeEffect>,
    pub research_days: f64,
    #[serde(default)]
    pub repeatable: bool,
}

impl UpgradeNode {
    /// Minimal node with no prerequisites, costs or effects.
    pub fn new(id: &str, research_days: f64) -> Self {
        Self {
            id: UpgradeId::from(id),
            display_name: id.to_string(),
            description: String::new(),
            prereq_nodes: BTreeSet::new(),
            costs: Vec::new(),
            effects: Vec::new(),
            research_days,
            repeatable: false,
        }
    }

    pub fn with_effect(mut self, target: &str, value: f64) -> Self {
        self.effects.push(UpgradeEffect::new(target, value));
        self
    }

    pub fn with_cost(mut self, resource: &str, amount: u64) -> Self {
        self.costs.push(ResourceAmount::new(resource, amount));
        self
    }

    pub fn with_prereq(mut self, id: &str) -> Self {
        self.prereq_nodes.insert(UpgradeId::from(id));
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }
}

/// Immutable registry of research nodes.
#[derive(Clone, Debug, Default)]
pub struct UpgradeRegistry {
    nodes: BTreeMap<UpgradeId, UpgradeNode>,
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = UpgradeNode>) -> Result<Self, ValidationError> {
        let mut reg = Self::new();
        for n in nodes {
            reg.register(n)?;
        }
        Ok(reg)
    }

    pub fn register(&mut self, node: UpgradeNode) -> Result<(), ValidationError> {
        if !(node.research_days.is_finite() && node.research_days > 0.0) {
            return Err(ValidationError::NonPositive(format!(
                "{}.research_days",
                node.id
            )));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(ValidationError::DuplicateId(node.id.0.clone()));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn get(&self, id: &UpgradeId) -> Option<&UpgradeNode> {
        self.nodes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpgradeNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check prerequisites exist, referenced resources are registered, and
    /// the prerequisite graph is acyclic.
    pub fn validate(&self, resources: &ResourceRegistry) -> Result<(), ValidationError> {
        for node in self.nodes.values() {
            for prereq in &node.prereq_nodes {
                if !self.nodes.contains_key(prereq) {
                    return Err(ValidationError::PrerequisiteNotFound {
                        node: node.id.0.clone(),
                        prereq: prereq.0.clone(),
                    });
                }
            }
            let cap_targets = node.effects.iter().filter_map(|e| match &e.target {
                EffectTarget::StorageCap(r) => Some(r),
                _ => None,
            });
            for res in node.costs.iter().map(|c| &c.resource).chain(cap_targets) {
                if !resources.contains(res) {
                    return Err(ValidationError::UnknownResource {
                        owner: node.id.0.clone(),
                        resource: res.0.clone(),
                    });
                }
            }
        }
        self.check_acyclic()?;
        debug!(nodes = self.nodes.len(), "upgrade registry validated");
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), ValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: BTreeMap<&UpgradeId, Mark> = BTreeMap::new();
        for root in self.nodes.keys() {
            if marks.contains_key(root) {
                continue;
            }
            // Iterative DFS: (node, next prerequisite index)
            let mut stack: Vec<(&UpgradeId, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::Visiting);
            while let Some((id, idx)) = stack.pop() {
                let prereqs: Vec<&UpgradeId> = self
                    .nodes
                    .get(id)
                    .map(|n| n.prereq_nodes.iter().collect())
                    .unwrap_or_default();
                if let Some(next) = prereqs.get(idx).copied() {
                    stack.push((id, idx + 1));
                    match marks.get(next) {
                        Some(Mark::Visiting) => {
                            return Err(ValidationError::PrerequisiteCycle(next.0.clone()))
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(next, Mark::Visiting);
                            stack.push((next, 0));
                        }
                    }
                } else {
                    marks.insert(id, Mark::Done);
                }
            }
        }
        Ok(())
    }
}

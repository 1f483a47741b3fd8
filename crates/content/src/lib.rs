#![deny(warnings)]

//! YAML content packs: resource types, production recipes, research nodes and
//! optional settlement tuning, loaded once at startup into a validated
//! [`Catalog`].

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use town_core::{
    Catalog, ProductionRecipe, ProductionRegistry, ResourceRegistry, ResourceType, TownConfig,
    UpgradeNode, UpgradeRegistry, ValidationError,
};
use tracing::info;

/// Content shipped with the engine.
pub const BASE_PACK: &str = include_str!("../../../assets/content/base.yaml");

/// Metadata for a content pack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// One pack file as written on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPack {
    #[serde(default)]
    pub meta: Option<PackMeta>,
    #[serde(default)]
    pub config: Option<TownConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceType>,
    #[serde(default)]
    pub recipes: Vec<ProductionRecipe>,
    #[serde(default)]
    pub upgrades: Vec<UpgradeNode>,
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid content yaml: {0}")]
    InvalidYaml(String),
    #[error("io error: {0}")]
    Io(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<std::io::Error> for ContentError {
    fn from(e: std::io::Error) -> Self {
        ContentError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ContentError {
    fn from(e: serde_yaml::Error) -> Self {
        ContentError::InvalidYaml(e.to_string())
    }
}

/// A validated catalog plus the settlement tuning that came with it.
#[derive(Debug, Clone)]
pub struct LoadedContent {
    pub catalog: Catalog,
    pub config: TownConfig,
    pub packs: Vec<String>,
}

pub fn parse_pack(text: &str) -> Result<ContentPack, ContentError> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn load_pack<P: AsRef<Path>>(path: P) -> Result<ContentPack, ContentError> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_pack(&text)
}

/// Merge packs in order and validate the result. Later packs may not
/// redefine ids from earlier ones; the last pack with a `config` wins.
pub fn build(packs: Vec<ContentPack>) -> Result<LoadedContent, ContentError> {
    let mut resources = ResourceRegistry::new();
    let mut recipes = ProductionRegistry::new();
    let mut upgrades = UpgradeRegistry::new();
    let mut config = TownConfig::default();
    let mut names = Vec::with_capacity(packs.len());
    for pack in packs {
        let name = pack
            .meta
            .as_ref()
            .map(|m| m.id.clone())
            .unwrap_or_else(|| "unnamed".to_string());
        for r in pack.resources {
            resources.register(r)?;
        }
        for r in pack.recipes {
            recipes.register(r)?;
        }
        for u in pack.upgrades {
            upgrades.register(u)?;
        }
        if let Some(c) = pack.config {
            config = c;
        }
        names.push(name);
    }
    let catalog = Catalog::new(resources, recipes, upgrades);
    catalog.validate()?;
    info!(
        packs = ?names,
        resources = catalog.resources.len(),
        recipes = catalog.recipes.len(),
        upgrades = catalog.upgrades.len(),
        "content loaded"
    );
    Ok(LoadedContent {
        catalog,
        config,
        packs: names,
    })
}

/// The built-in pack on its own.
pub fn base_content() -> Result<LoadedContent, ContentError> {
    build(vec![parse_pack(BASE_PACK)?])
}

/// Load every `*.yaml` file in `dir` (sorted by file name) as one catalog.
pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<LoadedContent, ContentError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for ent in fs::read_dir(dir.as_ref())? {
        let ent = ent?;
        if !ent.file_type()?.is_file() {
            continue;
        }
        let path = ent.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            paths.push(path);
        }
    }
    paths.sort();
    let packs = paths
        .iter()
        .map(load_pack)
        .collect::<Result<Vec<_>, _>>()?;
    build(packs)
}

//! Persistence for fitted forecast models.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::types::VillageId;
use crate::error::{DispatchError, Result};

use super::VillageModel;

/// Repository of fitted per-village forecast models.
pub trait ModelStore {
    /// Returns the stored model for `village`, if any.
    fn load(&self, village: &VillageId) -> Result<Option<VillageModel>>;

    /// Stores (or replaces) the model for `village`.
    fn save(&mut self, village: &VillageId, model: &VillageModel) -> Result<()>;
}

/// Process-local store; nothing survives the run.
#[derive(Debug, Default, Clone)]
pub struct InMemoryModelStore {
    models: BTreeMap<VillageId, VillageModel>,
}

impl InMemoryModelStore {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, village: &VillageId) -> Result<Option<VillageModel>> {
        Ok(self.models.get(village).cloned())
    }

    fn save(&mut self, village: &VillageId, model: &VillageModel) -> Result<()> {
        self.models.insert(village.clone(), model.clone());
        Ok(())
    }
}

/// Single TOML file holding one table per village.
#[derive(Debug, Clone)]
pub struct TomlModelStore {
    path: PathBuf,
}

impl TomlModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, VillageModel>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            DispatchError::Store(format!("cannot parse \"{}\": {e}", self.path.display()))
        })
    }
}

impl ModelStore for TomlModelStore {
    fn load(&self, village: &VillageId) -> Result<Option<VillageModel>> {
        Ok(self.read_all()?.remove(village.as_str()))
    }

    fn save(&mut self, village: &VillageId, model: &VillageModel) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(village.to_string(), model.clone());
        let content = toml::to_string(&all).map_err(|e| DispatchError::Store(e.to_string()))?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

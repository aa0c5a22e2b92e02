//! Registry operations over `registry.toml`
//!
//! The registry holds nothing in memory between calls: every read goes back
//! to disk and every mutation commits before returning.

use crate::atomic::write_atomic;
use crate::errors::RegistryError;
use crate::types::{ExtensionRecord, RegistryFile};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    path: PathBuf,
}

impl ExtensionRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExtensionRegistry { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full on-disk state; a missing file is an empty registry
    pub fn snapshot(&self) -> Result<RegistryFile, RegistryError> {
        if !self.path.exists() {
            return Ok(RegistryFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut file: RegistryFile =
            toml::from_str(&content).map_err(|source| RegistryError::Parse {
                path: self.path.clone(),
                source,
            })?;
        file.sort();
        Ok(file)
    }

    /// All records, sorted by name
    pub fn list(&self) -> Result<Vec<ExtensionRecord>, RegistryError> {
        Ok(self.snapshot()?.extensions)
    }

    pub fn get(&self, name: &str) -> Result<ExtensionRecord, RegistryError> {
        self.snapshot()?
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.snapshot()?.get(name).is_some())
    }

    /// Insert or replace by name, returning the replaced record
    pub fn put(&self, record: ExtensionRecord) -> Result<Option<ExtensionRecord>, RegistryError> {
        let mut file = self.snapshot()?;
        tracing::debug!(name = %record.name, version = %record.version, "Registering extension");
        let previous = file.upsert(record);
        self.commit(file)?;
        Ok(previous)
    }

    /// Remove by name; `false` when nothing was registered under it
    pub fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        let mut file = self.snapshot()?;
        if file.remove(name).is_none() {
            return Ok(false);
        }
        tracing::debug!(name, "Removed extension record");
        self.commit(file)?;
        Ok(true)
    }

    /// Set the enabled flag, returning whether the stored value changed
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool, RegistryError> {
        let mut file = self.snapshot()?;
        let record = file
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if record.enabled == enabled {
            return Ok(false);
        }
        record.enabled = enabled;
        self.commit(file)?;
        Ok(true)
    }

    /// Find a linked record by the path it was linked from, or by name
    pub fn find_linked(&self, path_or_name: &str) -> Result<Option<ExtensionRecord>, RegistryError> {
        let file = self.snapshot()?;
        let as_path = Path::new(path_or_name);
        let found = file
            .extensions
            .into_iter()
            .filter(|r| r.linked)
            .find(|r| r.install_path == as_path || r.name == path_or_name);
        Ok(found)
    }

    /// Drop every record
    pub fn clear(&self) -> Result<(), RegistryError> {
        self.commit(RegistryFile::default())
    }

    fn commit(&self, mut file: RegistryFile) -> Result<(), RegistryError> {
        file.sort();
        file.updated_at = chrono::Utc::now().to_rfc3339();
        let content = toml::to_string_pretty(&file)?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }
}

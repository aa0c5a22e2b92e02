//! Core package data shipped with the application
//!
//! The document is `package.json` shaped: `dependencies` pins every core
//! package to an exact version, and the `quantlab` section lists which of
//! them are plugin or mime extensions.

use crate::errors::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const EMBEDDED_CORE: &str = include_str!("../assets/core.json");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default, rename = "mimeExtensions")]
    pub mime_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreData {
    pub name: String,
    pub version: String,
    /// Toolchain entry points copied into the staging `package.json`
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub quantlab: CoreSection,
}

impl CoreData {
    /// The document compiled into the binary
    pub fn embedded() -> Result<Self, RegistryError> {
        Self::from_json(EMBEDDED_CORE)
    }

    /// Load a replacement document, or the embedded one when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading core package data");
                let content = std::fs::read_to_string(path)?;
                Self::from_json(&content)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let data: CoreData = serde_json::from_str(content)?;
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() || self.version.trim().is_empty() {
            return Err(RegistryError::InvalidCore(
                "core data requires a name and a version".to_string(),
            ));
        }
        let unpinned = self
            .quantlab
            .extensions
            .iter()
            .chain(&self.quantlab.mime_extensions)
            .find(|ext| !self.dependencies.contains_key(*ext));
        if let Some(ext) = unpinned {
            return Err(RegistryError::InvalidCore(format!(
                "core extension '{}' has no pinned version",
                ext
            )));
        }
        Ok(())
    }

    pub fn packages(&self) -> CorePackageSet<'_> {
        CorePackageSet { data: self }
    }
}

/// Read-only view of the non-removable core packages
#[derive(Debug, Clone, Copy)]
pub struct CorePackageSet<'a> {
    data: &'a CoreData,
}

impl<'a> CorePackageSet<'a> {
    pub fn contains(&self, name: &str) -> bool {
        self.data.dependencies.contains_key(name)
    }

    pub fn pinned_version(&self, name: &str) -> Option<&'a str> {
        self.data.dependencies.get(name).map(String::as_str)
    }

    /// `(name, version)` pairs sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.data
            .dependencies
            .iter()
            .map(|(name, version)| (name.as_str(), version.as_str()))
    }

    pub fn extensions(&self) -> &'a [String] {
        &self.data.quantlab.extensions
    }

    pub fn mime_extensions(&self) -> &'a [String] {
        &self.data.quantlab.mime_extensions
    }

    pub fn len(&self) -> usize {
        self.data.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.dependencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_core_is_valid() -> Result<(), Box<dyn std::error::Error>> {
        let core = CoreData::embedded()?;
        let set = core.packages();
        assert!(set.contains("@quantlab/application"));
        assert!(set.contains("@quantlab/notebook-extension"));
        assert!(!set.contains("@quantlab/not-a-core-package"));
        assert!(set.extensions().iter().all(|e| set.contains(e)));
        assert!(!set.mime_extensions().is_empty());
        Ok(())
    }

    #[test]
    fn test_iter_is_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let core = CoreData::embedded()?;
        let names: Vec<&str> = core.packages().iter().map(|(n, _)| n).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        Ok(())
    }

    #[test]
    fn test_extension_without_pin_is_rejected() {
        let json = r#"{
            "name": "app",
            "version": "1.0.0",
            "dependencies": { "@quantlab/application": "1.0.0" },
            "quantlab": { "extensions": ["@quantlab/missing-extension"] }
        }"#;
        assert!(matches!(
            CoreData::from_json(json),
            Err(RegistryError::InvalidCore(_))
        ));
    }

    #[test]
    fn test_load_replacement_document() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("core.json");
        std::fs::write(
            &path,
            r#"{"name": "tiny", "version": "2.0.0", "dependencies": {"@quantlab/application": "2.0.0"}}"#,
        )?;

        let core = CoreData::load(Some(&path))?;
        assert_eq!(core.version, "2.0.0");
        assert_eq!(core.packages().pinned_version("@quantlab/application"), Some("2.0.0"));
        assert_eq!(core.packages().len(), 1);
        Ok(())
    }
}

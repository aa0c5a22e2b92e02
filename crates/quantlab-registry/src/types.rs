//! Persisted records of an app directory's extensions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Schema version written to `registry.toml`
pub const REGISTRY_VERSION: &str = "1.0";

/// Where a record's content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Registry,
    LocalPath,
    Url,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::Registry => "registry",
            SourceKind::LocalPath => "local-path",
            SourceKind::Url => "url",
        };
        f.write_str(label)
    }
}

/// Whether a package contributes plugins to the application or is only a
/// dependency made available to the build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    Extension,
    LinkedPackage,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Extension => "extension",
            RecordKind::LinkedPackage => "linked-package",
        };
        f.write_str(label)
    }
}

/// One installed or linked package. `name` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub name: String,
    pub version: String,
    pub source: SourceKind,
    /// Registry URL, archive URL, or absolute path the content came from
    pub location: String,
    pub kind: RecordKind,
    pub enabled: bool,
    /// Content is read from `install_path` directly at build time instead of
    /// from the extensions cache
    #[serde(default)]
    pub linked: bool,
    pub install_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_extension: Option<String>,
    /// The spec string the user passed
    #[serde(default)]
    pub spec: String,
    #[serde(default)]
    pub installed_at: String,
}

impl ExtensionRecord {
    pub fn is_extension(&self) -> bool {
        self.kind == RecordKind::Extension
    }
}

/// On-disk layout of `registry.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFile {
    pub version: String,
    pub updated_at: String,
    #[serde(default)]
    pub extensions: Vec<ExtensionRecord>,
}

impl Default for RegistryFile {
    fn default() -> Self {
        RegistryFile {
            version: REGISTRY_VERSION.to_string(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            extensions: Vec::new(),
        }
    }
}

impl RegistryFile {
    pub fn get(&self, name: &str) -> Option<&ExtensionRecord> {
        self.extensions.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ExtensionRecord> {
        self.extensions.iter_mut().find(|r| r.name == name)
    }

    /// Insert or replace by name, returning the replaced record
    pub fn upsert(&mut self, record: ExtensionRecord) -> Option<ExtensionRecord> {
        match self.get_mut(&record.name) {
            Some(existing) => Some(std::mem::replace(existing, record)),
            None => {
                self.extensions.push(record);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ExtensionRecord> {
        let idx = self.extensions.iter().position(|r| r.name == name)?;
        Some(self.extensions.remove(idx))
    }

    pub fn sort(&mut self) {
        self.extensions.sort_by(|a, b| a.name.cmp(&b.name));
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn test_upsert_replaces_by_name() {
        let mut file = RegistryFile::default();
        assert!(file.upsert(record("foo", "1.0.0")).is_none());
        let previous = file.upsert(record("foo", "2.0.0"));

        assert_eq!(previous.map(|r| r.version), Some("1.0.0".to_string()));
        assert_eq!(file.extensions.len(), 1);
        assert_eq!(file.get("foo").map(|r| r.version.as_str()), Some("2.0.0"));
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut file = RegistryFile::default();
        file.upsert(record("foo", "1.0.0"));
        assert!(file.remove("bar").is_none());
        assert!(file.remove("foo").is_some());
        assert!(file.is_empty());
    }

    #[test]
    fn test_kind_serializes_kebab_case() -> Result<(), Box<dyn std::error::Error>> {
        let mut linked = record("@scope/util", "0.2.0");
        linked.kind = RecordKind::LinkedPackage;
        linked.source = SourceKind::LocalPath;

        let text = toml::to_string(&linked)?;
        assert!(text.contains("kind = \"linked-package\""));
        assert!(text.contains("source = \"local-path\""));
        assert!(!text.contains("mime_extension"));

        let back: ExtensionRecord = toml::from_str(&text)?;
        assert_eq!(back, linked);
        Ok(())
    }
}

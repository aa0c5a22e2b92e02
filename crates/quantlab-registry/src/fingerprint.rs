//! Build fingerprints
//!
//! A fingerprint captures everything that decides the content of a build:
//! the registry records, the core package document, the app name and version
//! and the toolchain commands. Two
//! registry states that contain the same records produce identical bytes, no
//! matter in which order the records were written.

use crate::atomic::write_atomic;
use crate::core_data::CoreData;
use crate::errors::RegistryError;
use crate::types::{ExtensionRecord, RecordKind, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Bumped whenever the staging layout or the fingerprint shape changes
pub const BUILD_SCHEMA: &str = "quantlab-build/2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub kind: RecordKind,
    pub source: SourceKind,
    pub location: String,
    pub linked: bool,
    pub install_path: String,
    pub extension: Option<String>,
    pub mime_extension: Option<String>,
}

impl From<&ExtensionRecord> for FingerprintEntry {
    fn from(record: &ExtensionRecord) -> Self {
        FingerprintEntry {
            name: record.name.clone(),
            version: record.version.clone(),
            enabled: record.enabled,
            kind: record.kind,
            source: record.source,
            location: record.location.clone(),
            linked: record.linked,
            install_path: record.install_path.display().to_string(),
            extension: record.extension.clone(),
            mime_extension: record.mime_extension.clone(),
        }
    }
}

/// Build inputs that come from configuration rather than the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSettings {
    pub app_name: String,
    pub app_version: String,
    /// Marker a user bumps by hand to force a rebuild after a toolchain upgrade
    pub toolchain: String,
    pub install_command: Vec<String>,
    pub build_command: Vec<String>,
}

impl BuildSettings {
    fn same_tool(&self, other: &BuildSettings) -> bool {
        self.toolchain == other.toolchain
            && self.install_command == other.install_command
            && self.build_command == other.build_command
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFingerprint {
    pub schema: String,
    pub settings: BuildSettings,
    pub core_name: String,
    pub core_version: String,
    pub core: BTreeMap<String, String>,
    pub core_extensions: Vec<String>,
    pub core_mime_extensions: Vec<String>,
    pub core_scripts: BTreeMap<String, String>,
    pub core_dev_dependencies: BTreeMap<String, String>,
    pub entries: Vec<FingerprintEntry>,
}

impl BuildFingerprint {
    pub fn compute(records: &[ExtensionRecord], core: &CoreData, settings: &BuildSettings) -> Self {
        let mut entries: Vec<FingerprintEntry> = records.iter().map(FingerprintEntry::from).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        BuildFingerprint {
            schema: BUILD_SCHEMA.to_string(),
            settings: settings.clone(),
            core_name: core.name.clone(),
            core_version: core.version.clone(),
            core: core.dependencies.clone(),
            core_extensions: core.quantlab.extensions.clone(),
            core_mime_extensions: core.quantlab.mime_extensions.clone(),
            core_scripts: core.scripts.clone(),
            core_dev_dependencies: core.dev_dependencies.clone(),
            entries,
        }
    }

    fn same_core(&self, other: &BuildFingerprint) -> bool {
        self.core_name == other.core_name
            && self.core_version == other.core_version
            && self.core == other.core
            && self.core_extensions == other.core_extensions
            && self.core_mime_extensions == other.core_mime_extensions
            && self.core_scripts == other.core_scripts
            && self.core_dev_dependencies == other.core_dev_dependencies
    }

    /// Canonical serialized form, compared byte for byte
    pub fn to_canonical_json(&self) -> Result<String, RegistryError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn parse(text: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Raw bytes of the persisted fingerprint, `None` if there is none
    pub fn read_persisted(path: &Path) -> Result<Option<String>, RegistryError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let text = self.to_canonical_json()?;
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    /// Human readable differences from `previous`, in name order
    pub fn describe_changes(&self, previous: &BuildFingerprint) -> Vec<String> {
        let mut changes = Vec::new();

        if self.schema != previous.schema || !self.settings.same_tool(&previous.settings) {
            changes.push("build tool changed".to_string());
        }
        if self.settings.app_name != previous.settings.app_name
            || self.settings.app_version != previous.settings.app_version
        {
            changes.push(format!(
                "app changed: {} {} -> {} {}",
                previous.settings.app_name,
                previous.settings.app_version,
                self.settings.app_name,
                self.settings.app_version
            ));
        }
        if self.core_version != previous.core_version {
            changes.push(format!(
                "core changed: {} -> {}",
                previous.core_version, self.core_version
            ));
        } else if !self.same_core(previous) {
            changes.push("core packages changed".to_string());
        }

        let before: BTreeMap<&str, &FingerprintEntry> =
            previous.entries.iter().map(|e| (e.name.as_str(), e)).collect();
        let after: BTreeMap<&str, &FingerprintEntry> =
            self.entries.iter().map(|e| (e.name.as_str(), e)).collect();

        for (name, entry) in &after {
            match before.get(name) {
                None => changes.push(format!("installed: {}", name)),
                Some(old) if old.enabled != entry.enabled => {
                    let verb = if entry.enabled { "enabled" } else { "disabled" };
                    changes.push(format!("{}: {}", verb, name));
                }
                Some(old) if *old != *entry => changes.push(format!("changed: {}", name)),
                Some(_) => {}
            }
        }
        for name in before.keys().filter(|n| !after.contains_key(*n)) {
            changes.push(format!("removed: {}", name));
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::record;

    fn core() -> Result<CoreData, RegistryError> {
        CoreData::embedded()
    }

    fn tool(toolchain: &str) -> BuildSettings {
        BuildSettings {
            app_name: "QuantLab".to_string(),
            app_version: "0.4.0".to_string(),
            toolchain: toolchain.to_string(),
            install_command: vec!["yarn".to_string(), "install".to_string()],
            build_command: vec!["yarn".to_string(), "build".to_string()],
        }
    }

    #[test]
    fn test_record_order_does_not_matter() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let a = BuildFingerprint::compute(&[record("a", "1.0.0"), record("b", "1.0.0")], &core, &tool("yarn"));
        let b = BuildFingerprint::compute(&[record("b", "1.0.0"), record("a", "1.0.0")], &core, &tool("yarn"));
        assert_eq!(a.to_canonical_json()?, b.to_canonical_json()?);
        Ok(())
    }

    #[test]
    fn test_install_time_is_not_fingerprinted() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let first = record("a", "1.0.0");
        let mut later = first.clone();
        later.installed_at = "2030-01-01T00:00:00+00:00".to_string();

        let a = BuildFingerprint::compute(&[first], &core, &tool("yarn"));
        let b = BuildFingerprint::compute(&[later], &core, &tool("yarn"));
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_save_and_read_back_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("build_fingerprint.json");
        assert!(BuildFingerprint::read_persisted(&path)?.is_none());

        let fp = BuildFingerprint::compute(&[record("a", "1.0.0")], &core()?, &tool("yarn"));
        fp.save(&path)?;

        let persisted = BuildFingerprint::read_persisted(&path)?;
        assert_eq!(persisted, Some(fp.to_canonical_json()?));
        assert_eq!(BuildFingerprint::parse(&fp.to_canonical_json()?)?, fp);
        Ok(())
    }

    #[test]
    fn test_describe_changes() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let mut disabled = record("keep", "1.0.0");
        disabled.enabled = false;

        let previous = BuildFingerprint::compute(
            &[record("keep", "1.0.0"), record("gone", "1.0.0"), record("bump", "1.0.0")],
            &core,
            &tool("yarn"),
        );
        let current = BuildFingerprint::compute(
            &[disabled, record("new", "0.1.0"), record("bump", "2.0.0")],
            &core,
            &tool("yarn-4"),
        );

        let changes = current.describe_changes(&previous);
        assert_eq!(
            changes,
            vec![
                "build tool changed",
                "changed: bump",
                "disabled: keep",
                "installed: new",
                "removed: gone",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_core_extension_lists_are_fingerprinted() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let mut trimmed = core.clone();
        trimmed.quantlab.extensions.clear();

        let before = BuildFingerprint::compute(&[], &core, &tool("yarn"));
        let after = BuildFingerprint::compute(&[], &trimmed, &tool("yarn"));
        assert_ne!(before.to_canonical_json()?, after.to_canonical_json()?);
        assert_eq!(after.describe_changes(&before), vec!["core packages changed"]);
        Ok(())
    }

    #[test]
    fn test_app_identity_and_commands_are_fingerprinted() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let base = BuildFingerprint::compute(&[], &core, &tool("yarn"));

        let mut renamed = tool("yarn");
        renamed.app_name = "Research Desk".to_string();
        let renamed = BuildFingerprint::compute(&[], &core, &renamed);
        assert_ne!(renamed, base);
        assert_eq!(
            renamed.describe_changes(&base),
            vec!["app changed: QuantLab 0.4.0 -> Research Desk 0.4.0"]
        );

        let mut rebuilt = tool("yarn");
        rebuilt.build_command = vec!["yarn".to_string(), "build:prod".to_string()];
        let rebuilt = BuildFingerprint::compute(&[], &core, &rebuilt);
        assert_eq!(rebuilt.describe_changes(&base), vec!["build tool changed"]);
        Ok(())
    }

    #[test]
    fn test_entry_point_change_is_fingerprinted() -> Result<(), Box<dyn std::error::Error>> {
        let core = core()?;
        let mut moved = record("a", "1.0.0");
        moved.extension = Some("a/lib/plugin".to_string());

        let before = BuildFingerprint::compute(&[record("a", "1.0.0")], &core, &tool("yarn"));
        let after = BuildFingerprint::compute(&[moved], &core, &tool("yarn"));
        assert_eq!(after.describe_changes(&before), vec!["changed: a"]);
        Ok(())
    }
}

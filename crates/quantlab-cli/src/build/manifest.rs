//! What a build contains, and its rendering into the staging workspace
//!
//! The toolchain reads two files from staging: `package.json`, whose
//! `dependencies` pull in the core pins plus every included package through
//! a `file:` spec, and `index.js`, the entry module that registers each
//! enabled extension with the application.

use crate::errors::QuantlabError;
use quantlab_config::app_paths::BUILD_OUTPUT_DIR;
use quantlab_registry::{ExtensionRecord, RecordKind, SourceKind};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const INDEX_TEMPLATE: &str = include_str!("../../assets/index.js.in");

pub const STAGING_PACKAGE_JSON: &str = "package.json";
pub const STAGING_INDEX_JS: &str = "index.js";

/// Where the toolchain reads an entry's content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// Copied into the extensions cache at install time
    Cached(PathBuf),
    /// Linked; re-read from its original location on every build
    External(PathBuf),
}

impl ManifestSource {
    pub fn path(&self) -> &Path {
        match self {
            ManifestSource::Cached(p) | ManifestSource::External(p) => p,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ManifestSource::External(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub version: String,
    pub kind: RecordKind,
    pub origin: SourceKind,
    pub source: ManifestSource,
    pub enabled: bool,
    pub extension: Option<String>,
    pub mime_extension: Option<String>,
}

impl From<&ExtensionRecord> for ManifestEntry {
    fn from(record: &ExtensionRecord) -> Self {
        let source = if record.linked {
            ManifestSource::External(record.install_path.clone())
        } else {
            ManifestSource::Cached(record.install_path.clone())
        };
        ManifestEntry {
            name: record.name.clone(),
            version: record.version.clone(),
            kind: record.kind,
            origin: record.source,
            source,
            enabled: record.enabled,
            extension: record.extension.clone(),
            mime_extension: record.mime_extension.clone(),
        }
    }
}

/// The complete input of one build
#[derive(Debug, Clone)]
pub struct BuildManifest {
    pub app_name: String,
    pub app_version: String,
    pub core_name: String,
    pub core_version: String,
    /// Every core package with its pinned version, by name
    pub core: BTreeMap<String, String>,
    pub core_extensions: Vec<String>,
    pub core_mime_extensions: Vec<String>,
    pub scripts: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    /// Included registry entries, by name
    pub entries: Vec<ManifestEntry>,
}

impl BuildManifest {
    /// Plugin entry points, core first, in load order
    pub fn extension_modules(&self) -> Vec<String> {
        let mut modules = self.core_extensions.clone();
        modules.extend(
            self.entries
                .iter()
                .filter(|e| e.enabled)
                .filter_map(|e| e.extension.clone()),
        );
        modules
    }

    pub fn mime_extension_modules(&self) -> Vec<String> {
        let mut modules = self.core_mime_extensions.clone();
        modules.extend(
            self.entries
                .iter()
                .filter(|e| e.enabled)
                .filter_map(|e| e.mime_extension.clone()),
        );
        modules
    }

    pub fn linked_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| e.source.is_external())
    }

    /// The staging `package.json`
    pub fn package_json(&self) -> Value {
        let mut dependencies: Map<String, Value> = self
            .core
            .iter()
            .map(|(name, version)| (name.clone(), Value::String(version.clone())))
            .collect();
        for entry in &self.entries {
            dependencies.insert(
                entry.name.clone(),
                Value::String(format!("file:{}", entry.source.path().display())),
            );
        }

        let linked: Map<String, Value> = self
            .linked_entries()
            .map(|e| (e.name.clone(), Value::String(e.source.path().display().to_string())))
            .collect();

        json!({
            "name": self.core_name,
            "version": self.core_version,
            "private": true,
            "scripts": self.scripts,
            "dependencies": dependencies,
            "devDependencies": self.dev_dependencies,
            "quantlab": {
                "name": self.app_name,
                "version": self.app_version,
                "outputDir": BUILD_OUTPUT_DIR,
                "extensions": self.extension_modules(),
                "mimeExtensions": self.mime_extension_modules(),
                "linkedPackages": linked,
            }
        })
    }

    /// The generated entry module
    pub fn index_js(&self) -> String {
        let mime = self
            .mime_extension_modules()
            .iter()
            .map(|module| guarded_require(module, "mimeExtensions.push(require({}));"))
            .collect::<String>();
        let plugins = self
            .extension_modules()
            .iter()
            .map(|module| guarded_require(module, "lab.registerPluginModule(require({}));"))
            .collect::<String>();

        INDEX_TEMPLATE
            .replace("{{APP_NAME}}", &js_string(&self.app_name))
            .replace("{{MIME_EXTENSIONS}}", mime.trim_end_matches('\n'))
            .replace("{{EXTENSIONS}}", plugins.trim_end_matches('\n'))
    }

    /// Write `package.json` and `index.js` into `staging`
    pub fn materialize(&self, staging: &Path) -> Result<(), QuantlabError> {
        std::fs::create_dir_all(staging)?;
        let mut package_json = serde_json::to_string_pretty(&self.package_json())
            .map_err(|e| QuantlabError::Configuration(format!("cannot render build manifest: {}", e)))?;
        package_json.push('\n');
        std::fs::write(staging.join(STAGING_PACKAGE_JSON), package_json)?;
        std::fs::write(staging.join(STAGING_INDEX_JS), self.index_js())?;
        tracing::debug!(
            staging = %staging.display(),
            entries = self.entries.len(),
            "Materialized build manifest"
        );
        Ok(())
    }
}

/// Quote through JSON so names can never break out of the string literal
fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn guarded_require(module: &str, statement: &str) -> String {
    let quoted = js_string(module);
    format!(
        "    try {{\n        if (disabled.indexOf({q}) === -1) {{\n            {stmt}\n        }}\n    }} catch (e) {{\n        console.error(e);\n    }}\n",
        q = quoted,
        stmt = statement.replace("{}", &quoted)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, linked: bool, enabled: bool) -> ManifestEntry {
        let path = PathBuf::from("/app/extensions").join(name);
        ManifestEntry {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            kind: RecordKind::Extension,
            origin: SourceKind::Registry,
            source: if linked {
                ManifestSource::External(path)
            } else {
                ManifestSource::Cached(path)
            },
            enabled,
            extension: Some(name.to_string()),
            mime_extension: None,
        }
    }

    fn manifest(entries: Vec<ManifestEntry>) -> BuildManifest {
        BuildManifest {
            app_name: "QuantLab".to_string(),
            app_version: "0.4.0".to_string(),
            core_name: "@quantlab/application-top".to_string(),
            core_version: "0.4.0".to_string(),
            core: [("@quantlab/application".to_string(), "0.4.0".to_string())]
                .into_iter()
                .collect(),
            core_extensions: vec!["@quantlab/application-extension".to_string()],
            core_mime_extensions: vec!["@quantlab/vega2-extension".to_string()],
            scripts: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            entries,
        }
    }

    #[test]
    fn test_package_json_dependencies_and_sections() {
        let m = manifest(vec![entry("foo", false, true), entry("dev", true, true)]);
        let pkg = m.package_json();

        assert_eq!(pkg["dependencies"]["@quantlab/application"], "0.4.0");
        assert_eq!(pkg["dependencies"]["foo"], "file:/app/extensions/foo");
        assert_eq!(pkg["quantlab"]["outputDir"], "build");
        assert_eq!(pkg["quantlab"]["linkedPackages"]["dev"], "/app/extensions/dev");
        assert!(pkg["quantlab"]["linkedPackages"].get("foo").is_none());
        assert_eq!(
            pkg["quantlab"]["extensions"],
            json!(["@quantlab/application-extension", "foo", "dev"])
        );
    }

    #[test]
    fn test_index_js_requires_every_module() {
        let m = manifest(vec![entry("foo", false, true), entry("off", false, false)]);
        let js = m.index_js();

        assert!(js.contains(r#"lab.registerPluginModule(require("foo"));"#));
        assert!(js.contains(r#"mimeExtensions.push(require("@quantlab/vega2-extension"));"#));
        assert!(!js.contains(r#"require("off")"#));
        assert!(js.contains(r#"|| "QuantLab";"#));
        assert!(!js.contains("{{"));
    }

    #[test]
    fn test_module_names_are_quoted() {
        let mut hostile = entry("x", false, true);
        hostile.extension = Some("x');alert(1);//".to_string());
        let js = manifest(vec![hostile]).index_js();
        assert!(js.contains(r#"require("x');alert(1);//")"#));
    }

    #[test]
    fn test_materialize_writes_both_files() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::TempDir::new()?;
        let staging = temp.path().join("staging");
        manifest(Vec::new()).materialize(&staging)?;

        let written: Value = serde_json::from_str(&std::fs::read_to_string(staging.join(STAGING_PACKAGE_JSON))?)?;
        assert_eq!(written["name"], "@quantlab/application-top");
        assert!(staging.join(STAGING_INDEX_JS).is_file());
        Ok(())
    }
}

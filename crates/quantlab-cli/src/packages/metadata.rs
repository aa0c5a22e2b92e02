//! `package.json` metadata of a candidate package

use crate::errors::QuantlabError;
use crate::packages::package_spec::validate_package_name;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const PACKAGE_JSON: &str = "package.json";

/// Used when a package omits its version; only linked development
/// checkouts do that in practice
const UNVERSIONED: &str = "0.0.0";

#[derive(Debug, Deserialize)]
struct RawPackageJson {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    quantlab: Option<RawQuantlabSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RawQuantlabSection {
    extension: Option<Value>,
    #[serde(rename = "mimeExtension")]
    mime_extension: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    /// Runtime and peer dependencies, name to range
    pub dependencies: BTreeMap<String, String>,
    /// Module the application loads as a plugin, if any
    pub extension: Option<String>,
    /// Module the application loads as a mime renderer, if any
    pub mime_extension: Option<String>,
}

impl PackageMetadata {
    /// Read `package.json` from a package root directory
    pub fn read_dir(dir: &Path) -> Result<Self, QuantlabError> {
        let path = dir.join(PACKAGE_JSON);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            QuantlabError::InvalidPackage(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content, &path.display().to_string())
    }

    pub fn from_json(content: &str, origin: &str) -> Result<Self, QuantlabError> {
        let raw: RawPackageJson = serde_json::from_str(content).map_err(|e| {
            QuantlabError::InvalidPackage(format!("malformed {}: {}", origin, e))
        })?;

        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| QuantlabError::InvalidPackage(format!("{} has no name", origin)))?;
        validate_package_name(&name)?;

        let version = match raw.version.filter(|v| !v.trim().is_empty()) {
            Some(v) => v,
            None => {
                tracing::debug!(name = %name, "Package has no version, using {}", UNVERSIONED);
                UNVERSIONED.to_string()
            }
        };

        let section = raw.quantlab.unwrap_or_default();
        let extension = entry_point(&name, section.extension.as_ref())?;
        let mime_extension = entry_point(&name, section.mime_extension.as_ref())?;

        let mut dependencies = raw.peer_dependencies;
        dependencies.extend(raw.dependencies);

        Ok(PackageMetadata {
            name,
            version,
            dependencies,
            extension,
            mime_extension,
        })
    }

    /// Whether the package contributes to the application, as opposed to
    /// only being a dependency other extensions import
    pub fn is_extension(&self) -> bool {
        self.extension.is_some() || self.mime_extension.is_some()
    }
}

/// `true` points at the package main module, a string at a module path
/// inside the package
fn entry_point(name: &str, value: Option<&Value>) -> Result<Option<String>, QuantlabError> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some(name.to_string())),
        Some(Value::String(path)) => {
            let path = path.trim().trim_start_matches("./");
            if path.is_empty() {
                Ok(Some(name.to_string()))
            } else if path.split('/').any(|part| part == "..") {
                Err(QuantlabError::InvalidPackage(format!(
                    "{} declares an entry point outside the package: {}",
                    name, path
                )))
            } else {
                Ok(Some(format!("{}/{}", name, path)))
            }
        }
        Some(other) => Err(QuantlabError::InvalidPackage(format!(
            "{} has an invalid quantlab entry point: {}",
            name, other
        ))),
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_APP_NAME: &str = "QuantLab";
pub const DEFAULT_TOOLCHAIN_VERSION: &str = "yarn";

const DEFAULT_INSTALL_COMMAND: &[&str] = &["yarn", "install", "--non-interactive"];
const DEFAULT_BUILD_COMMAND: &[&str] = &["yarn", "run", "build:prod"];

/// Keys accepted by [`Config::get`] and [`Config::set`]
pub const KEYS: &[&str] = &[
    "registry",
    "core-manifest",
    "app-name",
    "app-version",
    "toolchain-version",
    "build-timeout-secs",
];

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: io::Error },
    Write { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Write { path, source } => {
                write!(f, "Failed to write config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid config {}: {}", path.display(), source)
            }
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {}", e),
            ConfigError::UnknownKey(key) => {
                write!(f, "Unknown config key '{}' (expected one of: {})", key, KEYS.join(", "))
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value '{}' for config key '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(e) => Some(e),
            _ => None,
        }
    }
}

/// Per app directory settings, stored as `quantlab.toml`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// npm-compatible registry URL, or a local directory laid out as a registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Replacement for the embedded core package document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_manifest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    /// Run in staging before the build; an empty list skips the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_command: Option<Vec<String>>,
    /// Recorded in the build fingerprint so a toolchain upgrade forces a rebuild
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_timeout_secs: Option<u64>,
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replace the file at `path` atomically; readers see the old or the new
    /// content, never a partial write.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        replace_file(path, content.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "registry" => self.registry.clone(),
            "core-manifest" => self.core_manifest.clone(),
            "app-name" => self.app_name.clone(),
            "app-version" => self.app_version.clone(),
            "toolchain-version" => self.toolchain_version.clone(),
            "build-timeout-secs" => self.build_timeout_secs.map(|s| s.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: String) -> Result<(), ConfigError> {
        match key {
            "registry" => self.registry = Some(value),
            "core-manifest" => self.core_manifest = Some(value),
            "app-name" => self.app_name = Some(value),
            "app-version" => self.app_version = Some(value),
            "toolchain-version" => self.toolchain_version = Some(value),
            "build-timeout-secs" => {
                let secs = value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone(),
                })?;
                self.build_timeout_secs = Some(secs);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Config::default()
    }

    pub fn values_iter(&self) -> Vec<(&'static str, String)> {
        let mut values: Vec<(&'static str, String)> = KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|v| (*key, v)))
            .collect();
        if let Some(ref cmd) = self.install_command {
            values.push(("install-command", cmd.join(" ")));
        }
        if let Some(ref cmd) = self.build_command {
            values.push(("build-command", cmd.join(" ")));
        }
        values
    }

    pub fn registry_location(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)
    }

    pub fn toolchain_version(&self) -> &str {
        self.toolchain_version
            .as_deref()
            .unwrap_or(DEFAULT_TOOLCHAIN_VERSION)
    }

    pub fn install_command(&self) -> Vec<String> {
        self.install_command
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_INSTALL_COMMAND))
    }

    pub fn build_command(&self) -> Vec<String> {
        self.build_command
            .clone()
            .unwrap_or_else(|| owned(DEFAULT_BUILD_COMMAND))
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

fn replace_file(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    io::Write::write_all(&mut tmp, content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

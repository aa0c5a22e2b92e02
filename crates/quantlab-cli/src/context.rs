use crate::errors::QuantlabError;
use quantlab_config::{expand_tilde, AppPaths, Config};
use quantlab_registry::{CoreData, ExtensionRegistry};
use std::path::{Path, PathBuf};

/// Everything an operation needs to know about one app directory.
///
/// Built once per invocation and passed down explicitly; nothing here is
/// global, so tests can run side by side against separate directories.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub paths: AppPaths,
    pub config: Config,
    pub core: CoreData,
}

impl AppContext {
    /// Resolve the app directory, then load its config and core data
    pub fn load(app_dir: Option<&Path>) -> Result<Self, QuantlabError> {
        let paths = AppPaths::resolve(app_dir)?;
        let config = Config::load_from_path(&paths.config_file())?;
        let core_path = config
            .core_manifest
            .as_deref()
            .map(|p| resolve_relative(paths.root(), p));
        let core = CoreData::load(core_path.as_deref()).map_err(|e| {
            QuantlabError::Configuration(format!("Failed to load core package data: {}", e))
        })?;

        tracing::debug!(
            root = %paths.root().display(),
            core = %core.name,
            core_version = %core.version,
            "Loaded app context"
        );
        Ok(AppContext::new(paths, config, core))
    }

    pub fn new(paths: AppPaths, config: Config, core: CoreData) -> Self {
        AppContext {
            paths,
            config,
            core,
        }
    }

    pub fn registry(&self) -> ExtensionRegistry {
        ExtensionRegistry::new(self.paths.registry_file())
    }

    /// Fail before any side effect if the app directory is read-only
    pub fn ensure_writable(&self) -> Result<(), QuantlabError> {
        self.paths.ensure_writable()?;
        Ok(())
    }

    pub fn is_core(&self, name: &str) -> bool {
        self.core.packages().contains(name)
    }

    /// Cache location for an installed package's content
    pub fn cache_dir_for(&self, name: &str) -> PathBuf {
        self.paths.extensions_dir().join(cache_key(name))
    }

    /// A configured location, resolved against the app directory if relative
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        resolve_relative(self.paths.root(), value)
    }
}

/// Path of a package in the extensions cache, relative to the cache root
///
/// Scoped packages nest under their scope, as in `node_modules`: `@scope/name`
/// lives in `@scope/name` and never shares a directory with `scope-name`.
/// Callers pass validated package names only.
pub fn cache_key(name: &str) -> PathBuf {
    name.split('/').collect()
}

fn resolve_relative(root: &Path, value: &str) -> PathBuf {
    let expanded = expand_tilde(value);
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

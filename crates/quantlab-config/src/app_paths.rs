//! App directory resolution
//!
//! The app directory aggregates everything a QuantLab build owns:
//! - `extensions/`: cached content of installed extensions, one subtree per name
//! - `staging/`: scratch workspace handed to the build toolchain
//! - `static/`: the currently served build output
//! - `settings/`, `schemas/`, `themes/`: read by the server, never mutated here
//!
//! The root is taken from an explicit path, then `QUANTLAB_DIR`, then a
//! per-user default location.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the app directory
pub const APP_DIR_ENV: &str = "QUANTLAB_DIR";

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "QUANTLAB_CONFIG";

pub const EXTENSIONS_DIR: &str = "extensions";
pub const STAGING_DIR: &str = "staging";
pub const STATIC_DIR: &str = "static";
pub const SETTINGS_DIR: &str = "settings";
pub const SCHEMAS_DIR: &str = "schemas";
pub const THEMES_DIR: &str = "themes";

pub const REGISTRY_FILE: &str = "registry.toml";
pub const FINGERPRINT_FILE: &str = "build_fingerprint.json";
pub const BUILD_LOCK_FILE: &str = ".build.lock";
pub const CONFIG_FILE: &str = "quantlab.toml";

/// Directory inside `staging/` the toolchain writes its bundle to
pub const BUILD_OUTPUT_DIR: &str = "build";

/// Subdirectories created on first resolution.
///
/// `static/` is deliberately absent: it only exists once a build has been
/// promoted, and its absence is what marks a never-built app directory.
const LAYOUT: &[&str] = &[
    EXTENSIONS_DIR,
    STAGING_DIR,
    SETTINGS_DIR,
    SCHEMAS_DIR,
    THEMES_DIR,
];

/// Error type for app directory resolution
#[derive(Debug)]
pub enum PathError {
    /// The resolved root exists but is a file or something else
    NotADirectory(PathBuf),
    /// The root or one of its subdirectories could not be created
    CreateFailed { path: PathBuf, source: io::Error },
    /// The root exists but the current process cannot write to it
    NotWritable { path: PathBuf, source: io::Error },
    /// No explicit path, no env override and no home directory
    NoHomeDirectory,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::NotADirectory(path) => {
                write!(f, "App directory is not a directory: {}", path.display())
            }
            PathError::CreateFailed { path, source } => {
                write!(f, "Failed to create {}: {}", path.display(), source)
            }
            PathError::NotWritable { path, source } => {
                write!(f, "App directory {} is not writable: {}", path.display(), source)
            }
            PathError::NoHomeDirectory => write!(f, "Could not determine home directory"),
        }
    }
}

impl std::error::Error for PathError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PathError::CreateFailed { source, .. } | PathError::NotWritable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Resolved locations inside one app directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    /// Resolve the app directory and create any missing subdirectory.
    ///
    /// Safe to call repeatedly; existing content is never touched.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, PathError> {
        let from_env = std::env::var_os(APP_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::resolve_from(explicit, from_env)
    }

    fn resolve_from(explicit: Option<&Path>, from_env: Option<PathBuf>) -> Result<Self, PathError> {
        let root = match explicit.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => path.to_path_buf(),
            None => match from_env {
                Some(path) => path,
                None => default_app_dir()?,
            },
        };

        let paths = AppPaths {
            root: absolutize(&root),
        };
        paths.ensure_layout()?;
        tracing::debug!(root = %paths.root.display(), "Resolved app directory");
        Ok(paths)
    }

    fn ensure_layout(&self) -> Result<(), PathError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(PathError::NotADirectory(self.root.clone()));
        }

        for dir in std::iter::once(self.root.clone()).chain(LAYOUT.iter().map(|d| self.root.join(d)))
        {
            fs::create_dir_all(&dir).map_err(|source| PathError::CreateFailed {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Fail fast if the process cannot create files in the root.
    ///
    /// Every mutating operation calls this before its first side effect.
    pub fn ensure_writable(&self) -> Result<(), PathError> {
        tempfile::Builder::new()
            .prefix(".quantlab-write-check")
            .tempfile_in(&self.root)
            .map(drop)
            .map_err(|source| PathError::NotWritable {
                path: self.root.clone(),
                source,
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.root.join(EXTENSIONS_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Where the toolchain writes its output before promotion
    pub fn staging_output_dir(&self) -> PathBuf {
        self.staging_dir().join(BUILD_OUTPUT_DIR)
    }

    pub fn static_dir(&self) -> PathBuf {
        self.root.join(STATIC_DIR)
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.root.join(SETTINGS_DIR)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join(SCHEMAS_DIR)
    }

    pub fn themes_dir(&self) -> PathBuf {
        self.root.join(THEMES_DIR)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn fingerprint_file(&self) -> PathBuf {
        self.root.join(FINGERPRINT_FILE)
    }

    pub fn build_lock_file(&self) -> PathBuf {
        self.root.join(BUILD_LOCK_FILE)
    }

    /// Config file for this app directory, honoring `QUANTLAB_CONFIG`
    pub fn config_file(&self) -> PathBuf {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let trimmed = env_path.trim();
            if !trimmed.is_empty() {
                return PathBuf::from(trimmed);
            }
        }
        self.root.join(CONFIG_FILE)
    }
}

/// Expand a leading `~` or `~/` to the home directory.
///
/// `~user` forms are returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    let expanded = expand_tilde(&path.to_string_lossy());
    if expanded.is_absolute() {
        return expanded;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&expanded))
        .unwrap_or(expanded)
}

#[cfg(not(target_os = "windows"))]
fn default_app_dir() -> Result<PathBuf, PathError> {
    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join("quantlab"))
        .ok_or(PathError::NoHomeDirectory)
}

#[cfg(target_os = "windows")]
fn default_app_dir() -> Result<PathBuf, PathError> {
    dirs::data_dir()
        .map(|data| data.join("quantlab"))
        .ok_or(PathError::NoHomeDirectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_creates_layout() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let root = temp.path().join("app");

        let paths = AppPaths::resolve_from(Some(&root), None)?;

        assert_eq!(paths.root(), root.as_path());
        for dir in LAYOUT {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
        assert!(!paths.static_dir().exists());
        Ok(())
    }

    #[test]
    fn test_resolve_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let first = AppPaths::resolve_from(Some(temp.path()), None)?;
        fs::write(first.extensions_dir().join("marker"), "keep")?;

        let second = AppPaths::resolve_from(Some(temp.path()), None)?;

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(second.extensions_dir().join("marker"))?, "keep");
        Ok(())
    }

    #[test]
    fn test_explicit_wins_over_env() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let explicit = temp.path().join("explicit");
        let env = temp.path().join("env");

        let paths = AppPaths::resolve_from(Some(&explicit), Some(env.clone()))?;
        assert_eq!(paths.root(), explicit.as_path());
        assert!(!env.exists());

        let paths = AppPaths::resolve_from(None, Some(env.clone()))?;
        assert_eq!(paths.root(), env.as_path());
        Ok(())
    }

    #[test]
    fn test_root_that_is_a_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let file = temp.path().join("not-a-dir");
        fs::write(&file, "")?;

        let result = AppPaths::resolve_from(Some(&file), None);
        assert!(matches!(result, Err(PathError::NotADirectory(_))));
        Ok(())
    }

    #[test]
    fn test_ensure_writable_on_fresh_dir() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let paths = AppPaths::resolve_from(Some(temp.path()), None)?;
        assert!(paths.ensure_writable().is_ok());
        let leftovers = fs::read_dir(paths.root())?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".quantlab-write-check"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_writable_on_read_only_dir() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let paths = AppPaths::resolve_from(Some(temp.path()), None)?;
        fs::set_permissions(paths.root(), fs::Permissions::from_mode(0o555))?;

        // Superusers write through mode bits
        let writable = fs::write(paths.root().join("marker"), "").is_ok();
        let result = paths.ensure_writable();
        fs::set_permissions(paths.root(), fs::Permissions::from_mode(0o755))?;
        if writable {
            return Ok(());
        }

        match result {
            Err(PathError::NotWritable { path, .. }) => assert_eq!(path.as_path(), paths.root()),
            other => return Err(format!("expected NotWritable, got {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/dev/ext");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_tilde("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_tilde("~someone/x"), PathBuf::from("~someone/x"));
    }
}

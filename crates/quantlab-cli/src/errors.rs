//! Centralized error types for the quantlab CLI
//!
//! Every lifecycle operation surfaces one of these. Lower crates keep their
//! own error types and are folded in here at the boundary.

use quantlab_config::{ConfigError, PathError, ToolchainError};
use quantlab_registry::RegistryError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantlabError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error(
        "Version conflict: {package} requires {dependency}@{range}, but the core provides {core_version}"
    )]
    VersionConflict {
        package: String,
        dependency: String,
        range: String,
        core_version: String,
    },

    #[error("A build is already in progress in {}{}", .path.display(), .pid.map(|p| format!(" (pid {})", p)).unwrap_or_default())]
    BuildInProgress { path: PathBuf, pid: Option<u32> },

    #[error("Build failed: {message}")]
    BuildFailed { message: String, output: String },

    #[error("Build cancelled: {0}")]
    BuildCancelled(String),

    #[error("'{0}' is a core package and cannot be changed")]
    CorePackage(String),

    #[error("'{0}' is not registered")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry error: {0}")]
    Registry(#[source] RegistryError),
}

impl QuantlabError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            QuantlabError::Io(_) | QuantlabError::Http(_) | QuantlabError::Registry(_) => 1,
            QuantlabError::Configuration(_) => 2,
            QuantlabError::InvalidPackage(_) => 3,
            QuantlabError::VersionConflict { .. } => 4,
            QuantlabError::CorePackage(_) => 5,
            QuantlabError::BuildInProgress { .. } => 6,
            QuantlabError::BuildFailed { .. } => 7,
            QuantlabError::BuildCancelled(_) => 8,
            QuantlabError::NotFound(_) => 9,
        }
    }

    /// Captured toolchain output, when the error came from a build
    pub fn build_output(&self) -> Option<&str> {
        match self {
            QuantlabError::BuildFailed { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

impl From<RegistryError> for QuantlabError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(name) => QuantlabError::NotFound(name),
            RegistryError::Io(e) => QuantlabError::Io(e),
            other => QuantlabError::Registry(other),
        }
    }
}

impl From<PathError> for QuantlabError {
    fn from(err: PathError) -> Self {
        QuantlabError::Configuration(err.to_string())
    }
}

impl From<ConfigError> for QuantlabError {
    fn from(err: ConfigError) -> Self {
        QuantlabError::Configuration(err.to_string())
    }
}

impl From<ToolchainError> for QuantlabError {
    fn from(err: ToolchainError) -> Self {
        QuantlabError::Configuration(err.to_string())
    }
}

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing app directory state
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize registry: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extension '{0}' is not registered")]
    NotFound(String),

    #[error("Invalid core package data: {0}")]
    InvalidCore(String),
}

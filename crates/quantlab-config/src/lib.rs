pub mod app_paths;
pub mod config;
pub mod toolchain;

pub use app_paths::{expand_tilde, AppPaths, PathError};
pub use config::{Config, ConfigError};
pub use toolchain::{resolve_program, ToolchainCommand, ToolchainError};

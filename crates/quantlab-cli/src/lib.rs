//! QuantLab app directory manager
//!
//! Installs, links and toggles extensions in an app directory and rebuilds
//! its static bundle with the configured JavaScript toolchain. The `quantlab`
//! binary is a thin layer over [`lifecycle::LifecycleOps`].

pub mod build;
pub mod commands;
pub mod common;
pub mod context;
pub mod errors;
pub mod lifecycle;
pub mod packages;
pub mod serving;

pub use common::GlobalOpts;
pub use context::AppContext;
pub use errors::QuantlabError;

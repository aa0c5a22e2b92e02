//! QuantLab app directory state
//!
//! This crate owns the persisted state of an app directory: the registry of
//! installed and linked extensions, the core package data the application
//! ships with, and the fingerprint recorded by the last successful build.
//!
//! Every write goes through [`atomic::write_atomic`], so a reader never
//! observes a partially written file.

pub mod atomic;
pub mod core_data;
pub mod errors;
pub mod fingerprint;
pub mod registry;
pub mod types;

pub use core_data::{CoreData, CorePackageSet, CoreSection};
pub use errors::RegistryError;
pub use fingerprint::{BuildFingerprint, BuildSettings, FingerprintEntry, BUILD_SCHEMA};
pub use registry::ExtensionRegistry;
pub use types::{ExtensionRecord, RecordKind, RegistryFile, SourceKind};

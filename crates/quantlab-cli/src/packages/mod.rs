//! Package specs, metadata, fetching and cache placement

pub mod archive;
pub mod compat;
pub mod fetch;
pub mod metadata;
pub mod package_spec;
pub mod resolver;

pub use metadata::PackageMetadata;
pub use package_spec::PackageSpec;
pub use resolver::{normalize_link_path, FetchedPackage, PackageResolver, ResolvedPackage};

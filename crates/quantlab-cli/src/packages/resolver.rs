//! Turning a package spec into content in the extensions cache
//!
//! Resolution happens in two phases. [`PackageResolver::fetch`] makes the
//! content available and validates it without touching anything a build
//! reads; [`FetchedPackage::into_resolved`] then places it. The lifecycle
//! layer runs its own checks in between.

use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::packages::archive::extract_tgz_file;
use crate::packages::compat::check_core_compat;
use crate::packages::fetch::{download_tgz, http_client, open_index, Fetched};
use crate::packages::metadata::{PackageMetadata, PACKAGE_JSON};
use crate::packages::package_spec::{absolute_path, PackageSpec};
use quantlab_registry::{ExtensionRecord, RecordKind, SourceKind};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Directories never copied into the cache
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// A package whose content is ready to be registered
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub kind: RecordKind,
    /// Cache directory, or the external path for linked content
    pub content_path: PathBuf,
    pub source: SourceKind,
    pub location: String,
    pub linked: bool,
    pub metadata: PackageMetadata,
}

impl ResolvedPackage {
    /// Registry record for this package, enabled
    pub fn to_record(&self, spec: &str) -> ExtensionRecord {
        ExtensionRecord {
            name: self.name.clone(),
            version: self.version.clone(),
            source: self.source,
            location: self.location.clone(),
            kind: self.kind,
            enabled: true,
            linked: self.linked,
            install_path: self.content_path.clone(),
            extension: self.metadata.extension.clone(),
            mime_extension: self.metadata.mime_extension.clone(),
            spec: spec.to_string(),
            installed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug)]
enum StagedContent {
    /// Unpacked into a scratch directory inside the extensions cache
    Scratch { _dir: TempDir, root: PathBuf },
    /// A directory owned by someone else
    External(PathBuf),
}

/// Validated content that has not been placed yet
#[derive(Debug)]
pub struct FetchedPackage {
    pub metadata: PackageMetadata,
    pub source: SourceKind,
    pub location: String,
    content: StagedContent,
}

impl FetchedPackage {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn kind(&self) -> RecordKind {
        if self.metadata.is_extension() {
            RecordKind::Extension
        } else {
            RecordKind::LinkedPackage
        }
    }

    pub fn content_root(&self) -> &Path {
        match &self.content {
            StagedContent::Scratch { root, .. } => root,
            StagedContent::External(path) => path,
        }
    }

    /// A plain package picked from a local directory is linked in place
    /// rather than copied
    fn links_in_place(&self) -> bool {
        self.source == SourceKind::LocalPath
            && matches!(self.content, StagedContent::External(_))
            && !self.metadata.is_extension()
    }

    /// Place the content where builds will read it from
    pub fn into_resolved(self, ctx: &AppContext) -> Result<ResolvedPackage, QuantlabError> {
        let kind = self.kind();
        if self.links_in_place() {
            let path = self.content_root().to_path_buf();
            tracing::debug!(name = %self.metadata.name, path = %path.display(), "Linking plain package in place");
            return Ok(ResolvedPackage {
                name: self.metadata.name.clone(),
                version: self.metadata.version.clone(),
                kind,
                content_path: path,
                source: self.source,
                location: self.location,
                linked: true,
                metadata: self.metadata,
            });
        }

        let dest = ctx.cache_dir_for(&self.metadata.name);
        place_content(&ctx.paths.extensions_dir(), &self.content, &dest)?;
        tracing::info!(name = %self.metadata.name, path = %dest.display(), "Cached package content");

        Ok(ResolvedPackage {
            name: self.metadata.name.clone(),
            version: self.metadata.version.clone(),
            kind,
            content_path: dest,
            source: self.source,
            location: self.location,
            linked: false,
            metadata: self.metadata,
        })
    }
}

pub struct PackageResolver<'a> {
    ctx: &'a AppContext,
}

impl<'a> PackageResolver<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        PackageResolver { ctx }
    }

    /// Fetch and place in one step
    pub fn resolve(&self, spec: &PackageSpec) -> Result<ResolvedPackage, QuantlabError> {
        self.fetch(spec)?.into_resolved(self.ctx)
    }

    /// Make the content of `spec` available and validate it.
    ///
    /// Nothing under the cache is replaced until the returned package is
    /// placed; dropping it discards any downloaded content.
    pub fn fetch(&self, spec: &PackageSpec) -> Result<FetchedPackage, QuantlabError> {
        let (content, source, location, expected_name) = match spec {
            PackageSpec::Registry { name, range } => {
                let index = open_index(self.ctx)?;
                let scratch = self.scratch()?;
                let content = match index.fetch(name, range.as_deref(), scratch.path())? {
                    Fetched::Unpacked(root) => StagedContent::Scratch { _dir: scratch, root },
                    Fetched::Directory(path) => StagedContent::External(path),
                };
                (content, SourceKind::Registry, index.location(), Some(name.as_str()))
            }
            PackageSpec::LocalPath(path) => {
                let content = if path.is_dir() {
                    StagedContent::External(path.clone())
                } else if path.is_file() {
                    let scratch = self.scratch()?;
                    let root = extract_tgz_file(path, scratch.path())?;
                    StagedContent::Scratch { _dir: scratch, root }
                } else {
                    return Err(QuantlabError::InvalidPackage(format!(
                        "{} does not exist",
                        path.display()
                    )));
                };
                (content, SourceKind::LocalPath, path.display().to_string(), None)
            }
            PackageSpec::Url(url) => {
                let scratch = self.scratch()?;
                let root = download_tgz(&http_client()?, url, scratch.path())?;
                (
                    StagedContent::Scratch { _dir: scratch, root },
                    SourceKind::Url,
                    url.clone(),
                    None,
                )
            }
        };

        let root = match &content {
            StagedContent::Scratch { root, .. } => root.as_path(),
            StagedContent::External(path) => path.as_path(),
        };
        let metadata = PackageMetadata::read_dir(root)?;
        if let Some(expected) = expected_name {
            if metadata.name != expected {
                return Err(QuantlabError::InvalidPackage(format!(
                    "asked for {} but the registry returned {}",
                    expected, metadata.name
                )));
            }
        }
        check_core_compat(&metadata, self.ctx.core.packages())?;

        tracing::debug!(
            name = %metadata.name,
            version = %metadata.version,
            extension = metadata.is_extension(),
            "Fetched package"
        );
        Ok(FetchedPackage {
            metadata,
            source,
            location,
            content,
        })
    }

    /// Validate a directory for linking. The directory is recorded as is and
    /// read again at build time.
    pub fn resolve_link(&self, path: &Path) -> Result<ResolvedPackage, QuantlabError> {
        if !path.join(PACKAGE_JSON).is_file() {
            return Err(QuantlabError::InvalidPackage(format!(
                "{} is not a package directory",
                path.display()
            )));
        }
        let metadata = PackageMetadata::read_dir(path)?;
        check_core_compat(&metadata, self.ctx.core.packages())?;

        let kind = if metadata.is_extension() {
            RecordKind::Extension
        } else {
            RecordKind::LinkedPackage
        };
        Ok(ResolvedPackage {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            kind,
            content_path: path.to_path_buf(),
            source: SourceKind::LocalPath,
            location: path.display().to_string(),
            linked: true,
            metadata,
        })
    }

    fn scratch(&self) -> Result<TempDir, QuantlabError> {
        let dir = self.ctx.paths.extensions_dir();
        fs::create_dir_all(&dir)?;
        Ok(tempfile::Builder::new().prefix(".incoming-").tempdir_in(&dir)?)
    }
}

/// Absolute, symlink-free form of a path given on the command line, so link
/// and unlink agree on what was recorded
pub fn normalize_link_path(arg: &str) -> PathBuf {
    let path = absolute_path(arg);
    fs::canonicalize(&path).unwrap_or(path)
}

/// Replace `dest` with the staged content via a sibling temp directory.
/// The previous copy is restored if the final rename fails.
fn place_content(cache: &Path, content: &StagedContent, dest: &Path) -> Result<(), QuantlabError> {
    fs::create_dir_all(cache)?;
    let swap = tempfile::Builder::new().prefix(".swap-").tempdir_in(cache)?;
    let incoming = swap.path().join("incoming");
    let previous = swap.path().join("previous");

    match content {
        StagedContent::Scratch { root, .. } => fs::rename(root, &incoming)?,
        StagedContent::External(path) => copy_tree(path, &incoming)?,
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        fs::rename(dest, &previous)?;
    }
    if let Err(e) = fs::rename(&incoming, dest) {
        if previous.exists() {
            if let Err(restore) = fs::rename(&previous, dest) {
                tracing::error!(path = %dest.display(), error = %restore, "Failed to restore previous package content");
            }
        }
        return Err(e.into());
    }
    Ok(())
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), QuantlabError> {
    let walker = WalkDir::new(src).follow_links(false).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !SKIPPED_DIRS
                .iter()
                .any(|skip| entry.file_name() == std::ffi::OsStr::new(skip))
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(|_| {
            QuantlabError::InvalidPackage(format!("unexpected path {}", entry.path().display()))
        })?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }
    Ok(())
}

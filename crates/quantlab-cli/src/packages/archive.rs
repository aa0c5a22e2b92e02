//! Package tarball extraction
//!
//! npm tarballs wrap their content in a single top-level directory
//! (conventionally `package/`). Entries are unpacked one by one so that
//! oversized archives and paths escaping the destination are refused before
//! anything lands outside it.

use crate::errors::QuantlabError;
use crate::packages::metadata::PACKAGE_JSON;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Largest single file accepted from an archive
const MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;
/// Largest total unpacked size
const MAX_TOTAL_SIZE: u64 = 500 * 1024 * 1024;
const MAX_ENTRIES: usize = 50_000;

/// Extract a `.tgz` file, returning the package root inside `dest`
pub fn extract_tgz_file(archive: &Path, dest: &Path) -> Result<PathBuf, QuantlabError> {
    let file = File::open(archive).map_err(|e| {
        QuantlabError::InvalidPackage(format!("cannot open {}: {}", archive.display(), e))
    })?;
    extract_tgz(io::BufReader::new(file), dest)
        .map_err(|e| annotate(e, &archive.display().to_string()))
}

/// Extract gzip-compressed tar content, returning the package root
pub fn extract_tgz<R: Read>(reader: R, dest: &Path) -> Result<PathBuf, QuantlabError> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut total: u64 = 0;
    let mut count: usize = 0;

    let entries = archive.entries().map_err(malformed)?;
    for entry in entries {
        let mut entry = entry.map_err(malformed)?;
        count += 1;
        if count > MAX_ENTRIES {
            return Err(QuantlabError::InvalidPackage(format!(
                "archive has more than {} entries",
                MAX_ENTRIES
            )));
        }

        let entry_type = entry.header().entry_type();
        let rel = entry.path().map_err(malformed)?.into_owned();
        let rel = safe_relative(&rel)?;

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            tracing::warn!(path = %rel.display(), "Skipping link entry in package archive");
            continue;
        }

        let size = entry.size();
        if size > MAX_ENTRY_SIZE {
            return Err(QuantlabError::InvalidPackage(format!(
                "archive entry {} is {} bytes (limit {})",
                rel.display(),
                size,
                MAX_ENTRY_SIZE
            )));
        }
        total += size;
        if total > MAX_TOTAL_SIZE {
            return Err(QuantlabError::InvalidPackage(format!(
                "archive unpacks to more than {} bytes",
                MAX_TOTAL_SIZE
            )));
        }

        let target = dest.join(&rel);
        if entry_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry.by_ref().take(MAX_ENTRY_SIZE), &mut out)?;
        }
    }

    package_root(dest)
}

/// Reject absolute paths and `..` components
fn safe_relative(path: &Path) -> Result<PathBuf, QuantlabError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(QuantlabError::InvalidPackage(format!(
                    "archive entry escapes the destination: {}",
                    path.display()
                )));
            }
        }
    }
    Ok(clean)
}

/// `dest` itself if it holds `package.json`, otherwise its single subdirectory
fn package_root(dest: &Path) -> Result<PathBuf, QuantlabError> {
    if dest.join(PACKAGE_JSON).is_file() {
        return Ok(dest.to_path_buf());
    }
    let dirs: Vec<PathBuf> = fs::read_dir(dest)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    match dirs.as_slice() {
        [only] if only.join(PACKAGE_JSON).is_file() => Ok(only.clone()),
        _ => Err(QuantlabError::InvalidPackage(
            "archive does not contain a package.json".to_string(),
        )),
    }
}

fn malformed(e: io::Error) -> QuantlabError {
    QuantlabError::InvalidPackage(format!("unreadable archive: {}", e))
}

fn annotate(err: QuantlabError, origin: &str) -> QuantlabError {
    match err {
        QuantlabError::InvalidPackage(msg) => {
            QuantlabError::InvalidPackage(format!("{}: {}", origin, msg))
        }
        other => other,
    }
}

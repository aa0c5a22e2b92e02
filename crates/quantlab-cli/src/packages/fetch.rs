//! Package sources: npm-compatible HTTP registries, local directory
//! registries and plain archive URLs

use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::packages::archive::{extract_tgz, extract_tgz_file};
use crate::packages::compat::select_version;
use crate::packages::metadata::PACKAGE_JSON;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest archive accepted over the network
const MAX_DOWNLOAD_SIZE: u64 = 50 * 1024 * 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Package content located by an index
#[derive(Debug)]
pub enum Fetched {
    /// Unpacked into the scratch directory the caller passed in
    Unpacked(PathBuf),
    /// An existing directory outside the app directory, left untouched
    Directory(PathBuf),
}

impl Fetched {
    pub fn root(&self) -> &Path {
        match self {
            Fetched::Unpacked(p) | Fetched::Directory(p) => p,
        }
    }
}

/// A place packages are looked up by name
pub trait PackageIndex {
    /// Location string recorded for packages found here
    fn location(&self) -> String;

    /// Find the best version of `name` for `range` and make its content
    /// available, unpacking into `scratch` when needed
    fn fetch(&self, name: &str, range: Option<&str>, scratch: &Path) -> Result<Fetched, QuantlabError>;
}

/// Pick the index named by the `registry` config value
pub fn open_index(ctx: &AppContext) -> Result<Box<dyn PackageIndex>, QuantlabError> {
    let location = ctx.config.registry_location();
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Box::new(HttpRegistry::new(location)?))
    } else {
        Ok(Box::new(DirRegistry::new(ctx.resolve_path(location))))
    }
}

pub fn http_client() -> Result<Client, QuantlabError> {
    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("quantlab/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Download a `.tgz` and unpack it into `dest`, returning the package root
pub fn download_tgz(client: &Client, url: &str, dest: &Path) -> Result<PathBuf, QuantlabError> {
    tracing::debug!(url, "Downloading package archive");
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(QuantlabError::InvalidPackage(format!(
            "download of {} failed with HTTP {}",
            url, status
        )));
    }
    if response.content_length().is_some_and(|len| len > MAX_DOWNLOAD_SIZE) {
        return Err(too_large(url));
    }

    let mut bytes = Vec::new();
    response.take(MAX_DOWNLOAD_SIZE + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > MAX_DOWNLOAD_SIZE {
        return Err(too_large(url));
    }
    tracing::debug!(url, bytes = bytes.len(), "Download complete");
    extract_tgz(bytes.as_slice(), dest)
}

fn too_large(url: &str) -> QuantlabError {
    QuantlabError::InvalidPackage(format!(
        "{} is larger than {} MB",
        url,
        MAX_DOWNLOAD_SIZE / (1024 * 1024)
    ))
}

/// npm registry document for one package
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, PackumentVersion>,
}

#[derive(Debug, Deserialize)]
struct PackumentVersion {
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: String,
}

pub struct HttpRegistry {
    base: String,
    client: Client,
}

impl HttpRegistry {
    pub fn new(base: &str) -> Result<Self, QuantlabError> {
        Ok(HttpRegistry {
            base: base.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    fn packument(&self, name: &str) -> Result<Packument, QuantlabError> {
        // Scoped names keep their `@` but the slash is escaped
        let url = format!("{}/{}", self.base, name.replace('/', "%2F"));
        tracing::debug!(url = %url, "Fetching package document");
        let response = self.client.get(&url).send()?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(QuantlabError::InvalidPackage(format!(
                "{} was not found in {}",
                name, self.base
            )));
        }
        let response = response.error_for_status()?;
        Ok(response.json()?)
    }
}

impl PackageIndex for HttpRegistry {
    fn location(&self) -> String {
        self.base.clone()
    }

    fn fetch(&self, name: &str, range: Option<&str>, scratch: &Path) -> Result<Fetched, QuantlabError> {
        let doc = self.packument(name)?;
        let version = choose_version(name, range, &doc.dist_tags, doc.versions.keys().map(String::as_str))?;
        let tarball = doc
            .versions
            .get(&version)
            .map(|v| v.dist.tarball.clone())
            .ok_or_else(|| {
                QuantlabError::InvalidPackage(format!("{}@{} has no tarball", name, version))
            })?;
        tracing::info!(name, version = %version, "Resolved package from registry");
        download_tgz(&self.client, &tarball, scratch).map(Fetched::Unpacked)
    }
}

/// A directory laid out as `{name}/{version}/package.json` and/or
/// `{name}-{version}.tgz`
pub struct DirRegistry {
    root: PathBuf,
}

impl DirRegistry {
    pub fn new(root: PathBuf) -> Self {
        DirRegistry { root }
    }

    /// Every version available for `name`, with its content
    fn candidates(&self, name: &str) -> Result<BTreeMap<String, PathBuf>, QuantlabError> {
        let mut found = BTreeMap::new();
        let base = self.root.join(name);

        if base.is_dir() {
            for entry in std::fs::read_dir(&base)?.filter_map(Result::ok) {
                let path = entry.path();
                if path.join(PACKAGE_JSON).is_file() {
                    if let Some(version) = path.file_name().and_then(|n| n.to_str()) {
                        found.insert(version.to_string(), path.clone());
                    }
                }
            }
        }

        let (Some(parent), Some(stem)) = (base.parent(), base.file_name().and_then(|n| n.to_str())) else {
            return Ok(found);
        };
        let prefix = format!("{}-", stem);
        if parent.is_dir() {
            for entry in std::fs::read_dir(parent)?.filter_map(Result::ok) {
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };
                let version = file_name
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".tgz"));
                // `foo-bar-1.0.0.tgz` belongs to `foo-bar`, not `foo`
                if let Some(version) = version.filter(|v| semver::Version::parse(v).is_ok()) {
                    found
                        .entry(version.to_string())
                        .or_insert_with(|| entry.path());
                }
            }
        }
        Ok(found)
    }
}

impl PackageIndex for DirRegistry {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn fetch(&self, name: &str, range: Option<&str>, scratch: &Path) -> Result<Fetched, QuantlabError> {
        if !self.root.is_dir() {
            return Err(QuantlabError::Configuration(format!(
                "registry directory {} does not exist",
                self.root.display()
            )));
        }
        let candidates = self.candidates(name)?;
        if candidates.is_empty() {
            return Err(QuantlabError::InvalidPackage(format!(
                "{} was not found in {}",
                name,
                self.root.display()
            )));
        }

        let version = choose_version(name, range, &BTreeMap::new(), candidates.keys().map(String::as_str))?;
        let Some(content) = candidates.get(&version) else {
            return Err(QuantlabError::InvalidPackage(format!("{}@{} vanished", name, version)));
        };
        tracing::info!(name, version = %version, "Resolved package from directory registry");

        if content.is_dir() {
            Ok(Fetched::Directory(content.clone()))
        } else {
            extract_tgz_file(content, scratch).map(Fetched::Unpacked)
        }
    }
}

/// No range means the `latest` tag if there is one; a range naming a tag
/// means that tag
fn choose_version<'a>(
    name: &str,
    range: Option<&str>,
    dist_tags: &BTreeMap<String, String>,
    versions: impl IntoIterator<Item = &'a str>,
) -> Result<String, QuantlabError> {
    match range {
        None => {
            if let Some(latest) = dist_tags.get("latest") {
                return Ok(latest.clone());
            }
        }
        Some(tag) => {
            if let Some(tagged) = dist_tags.get(tag) {
                return Ok(tagged.clone());
            }
        }
    }

    select_version(versions, range)?.ok_or_else(|| {
        QuantlabError::InvalidPackage(match range {
            Some(r) => format!("no version of {} satisfies '{}'", name, r),
            None => format!("no stable version of {} is available", name),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::archive::test_support::tgz;
    use tempfile::TempDir;

    fn write_dir_package(root: &Path, name: &str, version: &str) -> std::io::Result<()> {
        let dir = root.join(name).join(version);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(
            dir.join(PACKAGE_JSON),
            format!(r#"{{"name": "{}", "version": "{}"}}"#, name, version),
        )
    }

    #[test]
    fn test_dir_registry_picks_highest_match() -> Result<(), Box<dyn std::error::Error>> {
        let registry = TempDir::new()?;
        let scratch = TempDir::new()?;
        write_dir_package(registry.path(), "foo", "1.0.0")?;
        write_dir_package(registry.path(), "foo", "1.4.0")?;
        write_dir_package(registry.path(), "foo", "2.0.0")?;

        let index = DirRegistry::new(registry.path().to_path_buf());
        let fetched = index.fetch("foo", Some("^1.0.0"), scratch.path())?;
        assert!(matches!(&fetched, Fetched::Directory(p) if p.ends_with("1.4.0")));

        let fetched = index.fetch("foo", None, scratch.path())?;
        assert!(fetched.root().ends_with("2.0.0"));
        Ok(())
    }

    #[test]
    fn test_dir_registry_reads_tarballs() -> Result<(), Box<dyn std::error::Error>> {
        let registry = TempDir::new()?;
        let scratch = TempDir::new()?;
        std::fs::create_dir_all(registry.path().join("@acme"))?;
        std::fs::write(
            registry.path().join("@acme").join("charts-0.3.0.tgz"),
            tgz(&[("package/package.json", r#"{"name": "@acme/charts", "version": "0.3.0"}"#)])?,
        )?;
        // Belongs to a different package
        std::fs::write(
            registry.path().join("@acme").join("charts-extra-9.0.0.tgz"),
            tgz(&[("package/package.json", r#"{"name": "@acme/charts-extra"}"#)])?,
        )?;

        let index = DirRegistry::new(registry.path().to_path_buf());
        let fetched = index.fetch("@acme/charts", None, scratch.path())?;
        assert!(matches!(&fetched, Fetched::Unpacked(p) if p.starts_with(scratch.path())));
        assert!(fetched.root().join(PACKAGE_JSON).is_file());
        Ok(())
    }

    #[test]
    fn test_dir_registry_missing_package() -> Result<(), Box<dyn std::error::Error>> {
        let registry = TempDir::new()?;
        let scratch = TempDir::new()?;
        write_dir_package(registry.path(), "foo", "1.0.0")?;

        let index = DirRegistry::new(registry.path().to_path_buf());
        assert!(matches!(
            index.fetch("bar", None, scratch.path()),
            Err(QuantlabError::InvalidPackage(_))
        ));
        assert!(matches!(
            index.fetch("foo", Some("^2.0.0"), scratch.path()),
            Err(QuantlabError::InvalidPackage(msg)) if msg.contains("satisfies")
        ));
        Ok(())
    }

    #[test]
    fn test_choose_version_prefers_dist_tags() -> Result<(), QuantlabError> {
        let tags: BTreeMap<String, String> = [
            ("latest".to_string(), "1.0.0".to_string()),
            ("next".to_string(), "2.0.0-rc.1".to_string()),
        ]
        .into_iter()
        .collect();
        let versions = ["1.0.0", "1.1.0", "2.0.0-rc.1"];

        assert_eq!(choose_version("foo", None, &tags, versions)?, "1.0.0");
        assert_eq!(choose_version("foo", Some("next"), &tags, versions)?, "2.0.0-rc.1");
        assert_eq!(choose_version("foo", Some("^1.0.0"), &tags, versions)?, "1.1.0");
        Ok(())
    }
}

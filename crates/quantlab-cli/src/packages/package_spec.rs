use crate::errors::QuantlabError;
use once_cell::sync::Lazy;
use quantlab_config::expand_tilde;
use regex::Regex;
use std::path::{Path, PathBuf};

/// npm package names: optional `@scope/`, lowercase, url-safe
static PACKAGE_NAME: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:@[a-z0-9][a-z0-9\-._~]*/)?[a-z0-9\-~][a-z0-9\-._~]*$").ok()
});

/// What the user asked to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    /// Name looked up in the configured registry, with an optional version
    /// or range (`foo`, `foo@1.0.0`, `@scope/foo@^1.2`)
    Registry { name: String, range: Option<String> },
    /// A directory containing `package.json`, or a `.tgz` archive
    LocalPath(PathBuf),
    /// An `http(s)` URL to a `.tgz` archive
    Url(String),
}

impl PackageSpec {
    pub fn parse(spec: &str) -> Result<Self, QuantlabError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(QuantlabError::InvalidPackage("empty package spec".to_string()));
        }

        if spec.starts_with("http://") || spec.starts_with("https://") {
            return Ok(PackageSpec::Url(spec.to_string()));
        }

        if let Some(path) = spec.strip_prefix("file:") {
            return Ok(PackageSpec::LocalPath(absolute_path(path)));
        }

        if looks_like_path(spec) {
            return Ok(PackageSpec::LocalPath(absolute_path(spec)));
        }

        let (name, range) = split_name_and_range(spec);
        validate_package_name(name)?;
        Ok(PackageSpec::Registry {
            name: name.to_string(),
            range: range.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }

    /// Registry name, when the spec names one up front
    pub fn registry_name(&self) -> Option<&str> {
        match self {
            PackageSpec::Registry { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Split `name@range`, keeping the leading `@` of scoped names
pub fn split_name_and_range(spec: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(spec.starts_with('@'));
    match spec[search_from..].find('@') {
        Some(idx) => {
            let at = search_from + idx;
            (&spec[..at], Some(&spec[at + 1..]))
        }
        None => (spec, None),
    }
}

pub fn validate_package_name(name: &str) -> Result<(), QuantlabError> {
    let valid = name.len() <= 214
        && PACKAGE_NAME
            .as_ref()
            .is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(QuantlabError::InvalidPackage(format!(
            "'{}' is not a valid package name",
            name
        )))
    }
}

/// Expand `~` and anchor relative paths at the working directory
pub fn absolute_path(path: &str) -> PathBuf {
    let expanded = expand_tilde(path);
    if expanded.is_absolute() {
        return expanded;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&expanded))
        .unwrap_or(expanded)
}

fn looks_like_path(spec: &str) -> bool {
    spec.starts_with('.')
        || spec.starts_with('/')
        || spec.starts_with('~')
        || spec.contains('\\')
        || spec.ends_with(".tgz")
        || spec.ends_with(".tar.gz")
        || Path::new(spec).is_absolute()
        || (!spec.starts_with('@') && Path::new(spec).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name() -> Result<(), QuantlabError> {
        assert_eq!(
            PackageSpec::parse("foo")?,
            PackageSpec::Registry {
                name: "foo".to_string(),
                range: None
            }
        );
        Ok(())
    }

    #[test]
    fn test_name_with_version_and_scope() -> Result<(), QuantlabError> {
        assert_eq!(
            PackageSpec::parse("foo@1.0.0")?,
            PackageSpec::Registry {
                name: "foo".to_string(),
                range: Some("1.0.0".to_string())
            }
        );
        assert_eq!(
            PackageSpec::parse("@scope/foo@^1.2")?,
            PackageSpec::Registry {
                name: "@scope/foo".to_string(),
                range: Some("^1.2".to_string())
            }
        );
        assert_eq!(
            PackageSpec::parse("@scope/foo")?,
            PackageSpec::Registry {
                name: "@scope/foo".to_string(),
                range: None
            }
        );
        Ok(())
    }

    #[test]
    fn test_paths_and_urls() -> Result<(), QuantlabError> {
        assert_eq!(
            PackageSpec::parse("/opt/ext")?,
            PackageSpec::LocalPath(PathBuf::from("/opt/ext"))
        );
        assert!(matches!(
            PackageSpec::parse("./ext-1.0.0.tgz")?,
            PackageSpec::LocalPath(p) if p.is_absolute() && p.ends_with("ext-1.0.0.tgz")
        ));
        assert_eq!(
            PackageSpec::parse("https://example.com/foo-1.0.0.tgz")?,
            PackageSpec::Url("https://example.com/foo-1.0.0.tgz".to_string())
        );
        assert_eq!(
            PackageSpec::parse("file:/opt/ext")?,
            PackageSpec::LocalPath(PathBuf::from("/opt/ext"))
        );
        Ok(())
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["Foo", "foo bar", "@scope", "@/foo", ""] {
            assert!(
                matches!(PackageSpec::parse(bad), Err(QuantlabError::InvalidPackage(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_split_name_and_range() {
        assert_eq!(split_name_and_range("foo"), ("foo", None));
        assert_eq!(split_name_and_range("foo@"), ("foo", Some("")));
        assert_eq!(split_name_and_range("@a/b@~1"), ("@a/b", Some("~1")));
    }
}

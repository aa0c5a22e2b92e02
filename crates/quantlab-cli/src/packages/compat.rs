//! npm-style version ranges over the `semver` crate
//!
//! npm accepts a few forms `semver::VersionReq` does not: `||` alternatives,
//! hyphen ranges, space separated comparators and bare versions meaning an
//! exact match. They are rewritten here before parsing.

use crate::errors::QuantlabError;
use crate::packages::metadata::PackageMetadata;
use quantlab_registry::CorePackageSet;
use semver::{Version, VersionReq};

/// A parsed npm range: satisfied if any alternative matches
#[derive(Debug, Clone)]
pub struct NpmRange {
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    pub fn parse(range: &str) -> Result<Self, semver::Error> {
        let alternatives = range
            .split("||")
            .map(|alt| VersionReq::parse(&normalize_alternative(alt)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NpmRange { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

fn normalize_alternative(alt: &str) -> String {
    let alt = alt.trim();
    if alt.is_empty() || alt == "latest" || alt == "x" || alt == "X" {
        return "*".to_string();
    }

    if let Some((low, high)) = alt.split_once(" - ") {
        return format!(">={}, <={}", low.trim(), high.trim());
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in alt.split_whitespace() {
        // "> = 1.0" style spacing: keep the operator for the next token
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op = Some(token);
            continue;
        }
        let token = token.trim_start_matches('v');
        let comparator = match pending_op.take() {
            Some(op) => format!("{}{}", op, token),
            None if token.starts_with(|c: char| c.is_ascii_digit()) && is_exact(token) => {
                format!("={}", token)
            }
            None => token.to_string(),
        };
        comparators.push(comparator);
    }
    comparators.join(", ")
}

/// A full `x.y.z` version without wildcards
fn is_exact(token: &str) -> bool {
    let core = token.split(['-', '+']).next().unwrap_or(token);
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty())
}

/// Ranges that name something other than a semver version
fn is_non_semver(range: &str) -> bool {
    let range = range.trim();
    range.starts_with("file:")
        || range.starts_with("link:")
        || range.starts_with("git")
        || range.starts_with("http:")
        || range.starts_with("https:")
        || range.starts_with("npm:")
        || range.contains('/')
}

/// Pick the highest version satisfying `range`.
///
/// Without a range the highest stable version wins. Prereleases are only
/// picked when the range asks for them, as npm does.
pub fn select_version<'a, I>(candidates: I, range: Option<&str>) -> Result<Option<String>, QuantlabError>
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed = match range {
        Some(r) => Some(NpmRange::parse(r).map_err(|e| {
            QuantlabError::InvalidPackage(format!("invalid version range '{}': {}", r, e))
        })?),
        None => None,
    };

    let best = candidates
        .into_iter()
        .filter_map(|v| Version::parse(v).ok())
        .filter(|v| match &parsed {
            Some(range) => range.matches(v),
            None => v.pre.is_empty(),
        })
        .max();

    Ok(best.map(|v| v.to_string()))
}

/// Every dependency on a core package must admit the core's pinned version
pub fn check_core_compat(meta: &PackageMetadata, core: CorePackageSet<'_>) -> Result<(), QuantlabError> {
    for (dependency, range) in &meta.dependencies {
        let Some(pinned) = core.pinned_version(dependency) else {
            continue;
        };

        if is_non_semver(range) {
            tracing::debug!(package = %meta.name, dependency = %dependency, range = %range, "Skipping non-semver range");
            continue;
        }

        let conflict = || QuantlabError::VersionConflict {
            package: meta.name.clone(),
            dependency: dependency.clone(),
            range: range.clone(),
            core_version: pinned.to_string(),
        };

        let parsed = NpmRange::parse(range).map_err(|e| {
            QuantlabError::InvalidPackage(format!(
                "{} declares an unparseable range for {}: '{}' ({})",
                meta.name, dependency, range, e
            ))
        })?;
        let pinned_version = Version::parse(pinned).map_err(|_| conflict())?;
        if !parsed.matches(&pinned_version) {
            return Err(conflict());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantlab_registry::CoreData;
    use std::collections::BTreeMap;

    fn matches(range: &str, version: &str) -> bool {
        let range = NpmRange::parse(range).ok();
        let version = Version::parse(version).ok();
        matches!((range, version), (Some(r), Some(v)) if r.matches(&v))
    }

    #[test]
    fn test_npm_range_forms() {
        assert!(matches("^0.4.0", "0.4.7"));
        assert!(!matches("^0.4.0", "0.5.0"));
        assert!(matches("1.2.3", "1.2.3"));
        assert!(!matches("1.2.3", "1.2.4"));
        assert!(matches(">=1.0.0 <2.0.0", "1.9.9"));
        assert!(!matches(">=1.0.0 <2.0.0", "2.0.0"));
        assert!(matches("1.0.0 - 1.5.0", "1.5.0"));
        assert!(matches("^1.0.0 || ^2.0.0", "2.3.0"));
        assert!(matches("*", "0.0.1"));
        assert!(matches("1.x", "1.7.0"));
        assert!(matches("~0.4", "0.4.2"));
    }

    #[test]
    fn test_select_version() -> Result<(), QuantlabError> {
        let versions = ["1.0.0", "1.2.0", "2.0.0", "2.1.0-beta.1"];
        assert_eq!(select_version(versions, None)?, Some("2.0.0".to_string()));
        assert_eq!(select_version(versions, Some("^1.0.0"))?, Some("1.2.0".to_string()));
        assert_eq!(select_version(versions, Some("1.0.0"))?, Some("1.0.0".to_string()));
        assert_eq!(select_version(versions, Some("^3.0.0"))?, None);
        assert!(select_version(versions, Some("not a range!")).is_err());
        Ok(())
    }

    fn meta(deps: &[(&str, &str)]) -> PackageMetadata {
        PackageMetadata {
            name: "ext".to_string(),
            version: "1.0.0".to_string(),
            dependencies: deps
                .iter()
                .map(|(n, r)| ((*n).to_string(), (*r).to_string()))
                .collect::<BTreeMap<_, _>>(),
            extension: Some("ext".to_string()),
            mime_extension: None,
        }
    }

    #[test]
    fn test_core_compat() -> Result<(), Box<dyn std::error::Error>> {
        let core = CoreData::embedded()?;
        let pinned = core
            .packages()
            .pinned_version("@quantlab/application")
            .ok_or("core pins application")?
            .to_string();

        let caret = format!("^{pinned}");
        let ok = meta(&[("@quantlab/application", caret.as_str()), ("left-pad", "^1.0.0")]);
        assert!(check_core_compat(&ok, core.packages()).is_ok());

        let bad = meta(&[("@quantlab/application", "^99.0.0")]);
        assert!(matches!(
            check_core_compat(&bad, core.packages()),
            Err(QuantlabError::VersionConflict { dependency, .. }) if dependency == "@quantlab/application"
        ));

        let linked = meta(&[("@quantlab/application", "file:../application")]);
        assert!(check_core_compat(&linked, core.packages()).is_ok());
        Ok(())
    }
}

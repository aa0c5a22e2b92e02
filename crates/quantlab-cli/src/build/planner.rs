//! Staleness decisions and build manifests

use crate::build::manifest::{BuildManifest, ManifestEntry};
use crate::context::AppContext;
use crate::errors::QuantlabError;
use quantlab_registry::{BuildFingerprint, BuildSettings, ExtensionRecord, RecordKind};

/// Whether the static output is stale, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDecision {
    pub needed: bool,
    pub reason: String,
}

impl BuildDecision {
    fn stale(reason: impl Into<String>) -> Self {
        BuildDecision {
            needed: true,
            reason: reason.into(),
        }
    }

    fn fresh() -> Self {
        BuildDecision {
            needed: false,
            reason: "static output is up to date".to_string(),
        }
    }
}

pub struct BuildPlanner<'a> {
    ctx: &'a AppContext,
}

impl<'a> BuildPlanner<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        BuildPlanner { ctx }
    }

    fn app_version(&self) -> String {
        self.ctx
            .config
            .app_version
            .clone()
            .unwrap_or_else(|| self.ctx.core.version.clone())
    }

    fn settings(&self) -> BuildSettings {
        let config = &self.ctx.config;
        BuildSettings {
            app_name: config.app_name().to_string(),
            app_version: self.app_version(),
            toolchain: config.toolchain_version().to_string(),
            install_command: config.install_command(),
            build_command: config.build_command(),
        }
    }

    /// Fingerprint a build of `records` would persist
    pub fn candidate(&self, records: &[ExtensionRecord]) -> BuildFingerprint {
        BuildFingerprint::compute(records, &self.ctx.core, &self.settings())
    }

    pub fn needs_build(&self, records: &[ExtensionRecord]) -> Result<BuildDecision, QuantlabError> {
        if !self.ctx.paths.static_dir().is_dir() {
            return Ok(BuildDecision::stale("static output missing"));
        }

        let Some(persisted) = BuildFingerprint::read_persisted(&self.ctx.paths.fingerprint_file())? else {
            return Ok(BuildDecision::stale("no previous build"));
        };

        let candidate = self.candidate(records);
        if candidate.to_canonical_json()? == persisted {
            return Ok(BuildDecision::fresh());
        }

        let decision = match BuildFingerprint::parse(&persisted) {
            Ok(previous) => {
                let changes = candidate.describe_changes(&previous);
                if changes.is_empty() {
                    BuildDecision::stale("fingerprint changed")
                } else {
                    BuildDecision::stale(changes.join("; "))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted build fingerprint is unreadable");
                BuildDecision::stale("fingerprint unreadable")
            }
        };
        tracing::debug!(reason = %decision.reason, "Build needed");
        Ok(decision)
    }

    /// Enabled records plus every plain linked package, in name order
    pub fn plan(&self, records: &[ExtensionRecord]) -> BuildManifest {
        let core = &self.ctx.core;
        let mut entries: Vec<ManifestEntry> = records
            .iter()
            .filter(|r| r.enabled || r.kind == RecordKind::LinkedPackage)
            .map(ManifestEntry::from)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        BuildManifest {
            app_name: self.ctx.config.app_name().to_string(),
            app_version: self.app_version(),
            core_name: core.name.clone(),
            core_version: core.version.clone(),
            core: core.dependencies.clone(),
            core_extensions: core.packages().extensions().to_vec(),
            core_mime_extensions: core.packages().mime_extensions().to_vec(),
            scripts: core.scripts.clone(),
            dev_dependencies: core.dev_dependencies.clone(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantlab_config::{AppPaths, Config};
    use quantlab_registry::{CoreData, SourceKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> Result<AppContext, Box<dyn std::error::Error>> {
        let paths = AppPaths::resolve(Some(temp.path()))?;
        Ok(AppContext::new(paths, Config::default(), CoreData::embedded()?))
    }

    fn record(name: &str, version: &str, enabled: bool) -> ExtensionRecord {
        ExtensionRecord {
            name: name.to_string(),
            version: version.to_string(),
            source: SourceKind::Registry,
            location: "/registry".to_string(),
            kind: RecordKind::Extension,
            enabled,
            linked: false,
            install_path: PathBuf::from("/app/extensions").join(name),
            extension: Some(name.to_string()),
            mime_extension: None,
            spec: name.to_string(),
            installed_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn mark_built(ctx: &AppContext, records: &[ExtensionRecord]) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(ctx.paths.static_dir())?;
        BuildPlanner::new(ctx).candidate(records).save(&ctx.paths.fingerprint_file())?;
        Ok(())
    }

    #[test]
    fn test_never_built() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp)?;
        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert_eq!(decision.reason, "static output missing");

        std::fs::create_dir_all(ctx.paths.static_dir())?;
        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert_eq!(decision.reason, "no previous build");
        Ok(())
    }

    #[test]
    fn test_fresh_after_build_regardless_of_order() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp)?;
        let records = vec![record("b", "1.0.0", true), record("a", "1.0.0", true)];
        mark_built(&ctx, &records)?;

        let reversed: Vec<ExtensionRecord> = records.iter().rev().cloned().collect();
        assert!(!BuildPlanner::new(&ctx).needs_build(&reversed)?.needed);
        Ok(())
    }

    #[test]
    fn test_reason_names_the_change() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp)?;
        mark_built(&ctx, &[record("foo", "1.0.0", true)])?;
        let planner = BuildPlanner::new(&ctx);

        let decision = planner.needs_build(&[record("foo", "1.0.0", false)])?;
        assert_eq!(decision.reason, "disabled: foo");

        let decision = planner.needs_build(&[record("foo", "1.0.0", true), record("bar", "2.0.0", true)])?;
        assert_eq!(decision.reason, "installed: bar");

        let decision = planner.needs_build(&[])?;
        assert_eq!(decision.reason, "removed: foo");
        Ok(())
    }

    #[test]
    fn test_toolchain_change_forces_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let mut ctx = context(&temp)?;
        mark_built(&ctx, &[])?;
        ctx.config.toolchain_version = Some("yarn-2".to_string());

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert!(decision.reason.contains("build tool changed"));
        Ok(())
    }

    #[test]
    fn test_core_extension_list_change_forces_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let mut ctx = context(&temp)?;
        mark_built(&ctx, &[])?;
        ctx.core.quantlab.extensions.pop();

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert_eq!(decision.reason, "core packages changed");

        let mut ctx = context(&temp)?;
        ctx.core.quantlab.mime_extensions.push("@quantlab/csv-viewer".to_string());
        assert!(BuildPlanner::new(&ctx).needs_build(&[])?.needed);
        Ok(())
    }

    #[test]
    fn test_app_name_change_forces_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let mut ctx = context(&temp)?;
        mark_built(&ctx, &[])?;
        ctx.config.app_name = Some("Research Desk".to_string());

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert!(decision.reason.starts_with("app changed:"));
        assert!(decision.reason.contains("Research Desk"));
        Ok(())
    }

    #[test]
    fn test_app_version_change_forces_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let mut ctx = context(&temp)?;
        mark_built(&ctx, &[])?;
        ctx.config.app_version = Some("9.9.9".to_string());

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert!(decision.reason.contains("9.9.9"));
        Ok(())
    }

    #[test]
    fn test_build_command_change_forces_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let mut ctx = context(&temp)?;
        mark_built(&ctx, &[])?;
        ctx.config.build_command = Some(vec!["pnpm".to_string(), "build".to_string()]);

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert!(decision.needed);
        assert_eq!(decision.reason, "build tool changed");

        let mut ctx = context(&temp)?;
        ctx.config.install_command = Some(vec!["pnpm".to_string(), "install".to_string()]);
        assert_eq!(BuildPlanner::new(&ctx).needs_build(&[])?.reason, "build tool changed");
        Ok(())
    }

    #[test]
    fn test_unreadable_fingerprint_is_stale() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp)?;
        std::fs::create_dir_all(ctx.paths.static_dir())?;
        std::fs::write(ctx.paths.fingerprint_file(), "{ torn")?;

        let decision = BuildPlanner::new(&ctx).needs_build(&[])?;
        assert_eq!(decision.reason, "fingerprint unreadable");
        Ok(())
    }

    #[test]
    fn test_plan_keeps_enabled_and_linked_packages() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp)?;
        let mut util = record("util", "0.1.0", false);
        util.kind = RecordKind::LinkedPackage;
        util.linked = true;
        util.extension = None;
        let records = vec![record("zed", "1.0.0", true), record("off", "1.0.0", false), util];

        let manifest = BuildPlanner::new(&ctx).plan(&records);
        let names: Vec<&str> = manifest.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["util", "zed"]);
        assert_eq!(manifest.core_version, ctx.core.version);
        assert!(manifest.linked_entries().any(|e| e.name == "util"));
        Ok(())
    }
}

//! Running a build and publishing its output
//!
//! Nothing the server reads changes until the toolchain has succeeded: the
//! bundle is written to `staging/build`, swapped into `static` by rename and
//! only then is the fingerprint persisted.

use crate::build::lock::BuildLock;
use crate::build::manifest::BuildManifest;
use crate::build::process::{run_step, CancelToken, OutputTail};
use crate::context::AppContext;
use crate::errors::QuantlabError;
use quantlab_config::ToolchainCommand;
use quantlab_registry::BuildFingerprint;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Sibling of `static/` holding the previous bundle during the swap
const PREVIOUS_STATIC_DIR: &str = ".static-previous";

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Remove the staging workspace before materializing
    pub clean: bool,
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

#[derive(Debug)]
pub struct BuildResult {
    pub fingerprint: BuildFingerprint,
    pub duration: Duration,
    pub output_tail: OutputTail,
}

pub struct BuildExecutor<'a> {
    ctx: &'a AppContext,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        BuildExecutor { ctx }
    }

    pub fn execute(
        &self,
        manifest: &BuildManifest,
        fingerprint: &BuildFingerprint,
        options: &BuildOptions,
    ) -> Result<BuildResult, QuantlabError> {
        let started = Instant::now();
        let install = ToolchainCommand::optional(&self.ctx.config.install_command())?;
        let build = ToolchainCommand::from_argv(&self.ctx.config.build_command())?;

        let paths = &self.ctx.paths;
        let _lock = BuildLock::try_acquire(&paths.build_lock_file())?;

        let staging = paths.staging_dir();
        if options.clean && staging.exists() {
            tracing::debug!(staging = %staging.display(), "Cleaning staging workspace");
            fs::remove_dir_all(&staging)?;
        }
        manifest.materialize(&staging)?;

        let output = paths.staging_output_dir();
        if output.exists() {
            fs::remove_dir_all(&output)?;
        }

        let deadline = options.timeout.map(|t| started + t);
        let mut tail = OutputTail::default();
        let steps = install
            .iter()
            .map(|cmd| ("install", cmd))
            .chain(std::iter::once(("build", &build)));
        for (step, command) in steps {
            let (status, step_tail) = run_step(command, &staging, deadline, &options.cancel)?;
            tail.extend(step_tail);
            if !status.success() {
                tracing::error!(step, %status, "Toolchain step failed");
                return Err(QuantlabError::BuildFailed {
                    message: format!("{} step `{}` exited with {}", step, command.display(), status),
                    output: tail.render(),
                });
            }
        }

        if !output.is_dir() {
            return Err(QuantlabError::BuildFailed {
                message: format!("toolchain produced no output at {}", output.display()),
                output: tail.render(),
            });
        }

        promote(&output, &paths.static_dir())?;
        fingerprint.save(&paths.fingerprint_file())?;

        let duration = started.elapsed();
        tracing::info!(
            entries = manifest.entries.len(),
            duration_ms = duration.as_millis() as u64,
            "Build published"
        );
        Ok(BuildResult {
            fingerprint: fingerprint.clone(),
            duration,
            output_tail: tail,
        })
    }

    /// Remove build products: staging, static output and fingerprint
    pub fn clean(&self) -> Result<(), QuantlabError> {
        let paths = &self.ctx.paths;
        let _lock = BuildLock::try_acquire(&paths.build_lock_file())?;

        for dir in [paths.staging_dir(), paths.static_dir()] {
            if dir.exists() {
                tracing::debug!(path = %dir.display(), "Removing");
                fs::remove_dir_all(&dir)?;
            }
        }
        let fingerprint = paths.fingerprint_file();
        if fingerprint.exists() {
            fs::remove_file(&fingerprint)?;
        }
        fs::create_dir_all(paths.staging_dir())?;
        Ok(())
    }
}

/// Replace `static_dir` with `output` by rename, restoring the previous
/// bundle if the swap fails
fn promote(output: &Path, static_dir: &Path) -> Result<(), QuantlabError> {
    let previous = static_dir.with_file_name(PREVIOUS_STATIC_DIR);
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }

    let had_previous = static_dir.exists();
    if had_previous {
        fs::rename(static_dir, &previous)?;
    }

    if let Err(e) = fs::rename(output, static_dir) {
        if had_previous {
            if let Err(restore) = fs::rename(&previous, static_dir) {
                tracing::error!(error = %restore, "Failed to restore previous static output");
            }
        }
        return Err(e.into());
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&previous) {
            tracing::warn!(path = %previous.display(), error = %e, "Failed to remove previous static output");
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::build::planner::BuildPlanner;
    use quantlab_config::{AppPaths, Config};
    use quantlab_registry::CoreData;
    use tempfile::TempDir;

    fn context(temp: &TempDir, script: &str) -> Result<AppContext, Box<dyn std::error::Error>> {
        let paths = AppPaths::resolve(Some(temp.path()))?;
        let config = Config {
            install_command: Some(Vec::new()),
            build_command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]),
            ..Config::default()
        };
        Ok(AppContext::new(paths, config, CoreData::embedded()?))
    }

    fn run(ctx: &AppContext, options: &BuildOptions) -> Result<BuildResult, QuantlabError> {
        let planner = BuildPlanner::new(ctx);
        BuildExecutor::new(ctx).execute(&planner.plan(&[]), &planner.candidate(&[]), options)
    }

    #[test]
    fn test_success_promotes_and_records_fingerprint() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "mkdir -p build && cp index.js build/ && echo done")?;

        let result = run(&ctx, &BuildOptions::default())?;
        assert!(ctx.paths.static_dir().join("index.js").is_file());
        assert!(!ctx.paths.staging_output_dir().exists());
        assert!(ctx.paths.fingerprint_file().is_file());
        assert!(result.output_tail.render().contains("done"));
        assert!(!BuildPlanner::new(&ctx).needs_build(&[])?.needed);
        Ok(())
    }

    #[test]
    fn test_failure_leaves_static_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "echo compiling; mkdir -p build; exit 2")?;
        fs::create_dir_all(ctx.paths.static_dir())?;
        fs::write(ctx.paths.static_dir().join("bundle.js"), "old bundle")?;

        let err = run(&ctx, &BuildOptions::default()).err().ok_or("build should fail")?;
        assert!(matches!(err, QuantlabError::BuildFailed { .. }));
        assert_eq!(err.build_output(), Some("compiling"));
        assert_eq!(fs::read_to_string(ctx.paths.static_dir().join("bundle.js"))?, "old bundle");
        assert!(!ctx.paths.fingerprint_file().exists());

        // lock released
        drop(BuildLock::try_acquire(&ctx.paths.build_lock_file())?);
        Ok(())
    }

    #[test]
    fn test_missing_output_is_failure() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "true")?;
        let result = run(&ctx, &BuildOptions::default());
        assert!(matches!(result, Err(QuantlabError::BuildFailed { message, .. }) if message.contains("no output")));
        Ok(())
    }

    #[test]
    fn test_held_lock_fails_fast_without_touching_staging() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "mkdir -p build")?;
        let _held = BuildLock::try_acquire(&ctx.paths.build_lock_file())?;

        let result = run(&ctx, &BuildOptions::default());
        assert!(matches!(result, Err(QuantlabError::BuildInProgress { .. })));
        assert!(!ctx.paths.staging_dir().join("package.json").exists());
        assert!(!ctx.paths.static_dir().exists());
        Ok(())
    }

    #[test]
    fn test_timeout_cancels_and_releases_lock() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "exec sleep 30")?;
        let options = BuildOptions {
            timeout: Some(Duration::from_millis(200)),
            ..BuildOptions::default()
        };

        assert!(matches!(run(&ctx, &options), Err(QuantlabError::BuildCancelled(_))));
        assert!(!ctx.paths.static_dir().exists());
        drop(BuildLock::try_acquire(&ctx.paths.build_lock_file())?);
        Ok(())
    }

    #[test]
    fn test_clean_removes_products() -> Result<(), Box<dyn std::error::Error>> {
        let temp = TempDir::new()?;
        let ctx = context(&temp, "mkdir -p build")?;
        run(&ctx, &BuildOptions::default())?;
        assert!(ctx.paths.static_dir().exists());

        BuildExecutor::new(&ctx).clean()?;
        assert!(!ctx.paths.static_dir().exists());
        assert!(!ctx.paths.fingerprint_file().exists());
        assert!(ctx.paths.staging_dir().is_dir());
        assert!(!ctx.paths.staging_dir().join("package.json").exists());
        Ok(())
    }
}

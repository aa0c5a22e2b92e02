//! Extension lifecycle operations
//!
//! Each operation validates first, then commits one registry change, then
//! optionally rebuilds. A build that fails after a committed change is
//! reported in the [`OperationReport`], never rolled back.

mod install;
mod link;
mod toggle;
mod uninstall;

use crate::build::{BuildDecision, BuildExecutor, BuildOptions, BuildPlanner, BuildResult};
use crate::context::AppContext;
use crate::errors::QuantlabError;
use quantlab_registry::ExtensionRecord;

/// Whether an operation rebuilds after changing the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPolicy {
    Skip,
    IfNeeded,
}

#[derive(Debug)]
pub enum BuildOutcome {
    /// Not attempted, as requested
    Skipped,
    /// The static output already matches the registry
    NotNeeded,
    Succeeded(BuildResult),
    Failed(QuantlabError),
}

impl BuildOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, BuildOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct OperationReport {
    /// Whether the registry was modified
    pub changed: bool,
    /// The record the operation touched, for messages
    pub subject: Option<String>,
    pub build: BuildOutcome,
    /// Warning-level remarks about no-op requests
    pub notes: Vec<String>,
}

impl OperationReport {
    fn changed(subject: impl Into<String>) -> Self {
        OperationReport {
            changed: true,
            subject: Some(subject.into()),
            build: BuildOutcome::Skipped,
            notes: Vec::new(),
        }
    }

    fn unchanged(note: impl Into<String>) -> Self {
        OperationReport {
            changed: false,
            subject: None,
            build: BuildOutcome::Skipped,
            notes: vec![note.into()],
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Surface a failed build as the error of the whole operation
    pub fn into_result(self) -> Result<OperationReport, QuantlabError> {
        match self.build {
            BuildOutcome::Failed(err) => Err(err),
            _ => Ok(self),
        }
    }
}

pub struct LifecycleOps<'a> {
    ctx: &'a AppContext,
    options: BuildOptions,
}

impl<'a> LifecycleOps<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self::with_options(ctx, BuildOptions::default())
    }

    pub fn with_options(ctx: &'a AppContext, options: BuildOptions) -> Self {
        LifecycleOps { ctx, options }
    }

    pub fn context(&self) -> &AppContext {
        self.ctx
    }

    /// Every record, sorted by name, read fresh from disk
    pub fn list(&self) -> Result<Vec<ExtensionRecord>, QuantlabError> {
        Ok(self.ctx.registry().list()?)
    }

    pub fn needs_build(&self) -> Result<BuildDecision, QuantlabError> {
        let records = self.list()?;
        BuildPlanner::new(self.ctx).needs_build(&records)
    }

    /// Build unconditionally
    pub fn build(&self, clean: bool) -> Result<BuildResult, QuantlabError> {
        self.ctx.ensure_writable()?;
        let records = self.list()?;
        let planner = BuildPlanner::new(self.ctx);
        let options = BuildOptions {
            clean: clean || self.options.clean,
            ..self.options.clone()
        };
        BuildExecutor::new(self.ctx).execute(&planner.plan(&records), &planner.candidate(&records), &options)
    }

    pub fn clean(&self) -> Result<(), QuantlabError> {
        self.ctx.ensure_writable()?;
        BuildExecutor::new(self.ctx).clean()
    }

    /// Build if the static output is stale, folding any error into the outcome
    pub fn build_if_needed(&self) -> BuildOutcome {
        let decision = match self.needs_build() {
            Ok(decision) => decision,
            Err(e) => return BuildOutcome::Failed(e),
        };
        if !decision.needed {
            return BuildOutcome::NotNeeded;
        }
        tracing::info!(reason = %decision.reason, "Rebuilding");
        match self.build(false) {
            Ok(result) => BuildOutcome::Succeeded(result),
            Err(e) => BuildOutcome::Failed(e),
        }
    }

    /// Attach the build outcome `policy` asks for
    pub fn apply_build_policy(&self, mut report: OperationReport, policy: BuildPolicy) -> OperationReport {
        report.build = match policy {
            BuildPolicy::Skip => BuildOutcome::Skipped,
            BuildPolicy::IfNeeded if !report.changed => BuildOutcome::NotNeeded,
            BuildPolicy::IfNeeded => self.build_if_needed(),
        };
        report
    }

    /// Delete a record's cached content, if it owns any
    fn discard_cached(&self, record: &ExtensionRecord) -> Result<(), QuantlabError> {
        let cache = self.ctx.paths.extensions_dir();
        if record.linked || !record.install_path.starts_with(&cache) || record.install_path == cache {
            return Ok(());
        }
        if record.install_path.exists() {
            tracing::debug!(name = %record.name, path = %record.install_path.display(), "Removing cached content");
            std::fs::remove_dir_all(&record.install_path)?;
        }
        // An emptied `@scope` directory goes too
        if let Some(scope) = record.install_path.parent().filter(|p| *p != cache && p.is_dir()) {
            if std::fs::read_dir(scope)?.next().is_none() {
                std::fs::remove_dir(scope)?;
            }
        }
        Ok(())
    }
}

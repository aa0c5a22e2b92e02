use crate::build::{BuildOptions, BuildResult};
use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::lifecycle::{BuildOutcome, BuildPolicy, LifecycleOps, OperationReport};
use crate::GlobalOpts;
use quantlab_logger as logger;
use std::time::Duration;

/// Registry-mutating commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Uninstall,
    Link,
    Unlink,
    Enable,
    Disable,
}

impl Action {
    fn past_tense(self) -> &'static str {
        match self {
            Action::Install => "Installed",
            Action::Uninstall => "Uninstalled",
            Action::Link => "Linked",
            Action::Unlink => "Unlinked",
            Action::Enable => "Enabled",
            Action::Disable => "Disabled",
        }
    }

    /// Install, link and unlink act on the working directory when given
    /// nothing
    fn defaults_to_cwd(self) -> bool {
        matches!(self, Action::Install | Action::Link | Action::Unlink)
    }

    fn apply(self, ops: &LifecycleOps<'_>, target: &str) -> Result<OperationReport, QuantlabError> {
        // Targets are applied one by one; a single build runs at the end
        let policy = BuildPolicy::Skip;
        match self {
            Action::Install => ops.install(target, policy),
            Action::Uninstall => ops.uninstall(target, policy),
            Action::Link => ops.link(target, policy),
            Action::Unlink => ops.unlink(target, policy),
            Action::Enable => ops.enable(target, policy),
            Action::Disable => ops.disable(target, policy),
        }
    }
}

/// Apply `action` to every target in order, stopping at the first error,
/// then rebuild once if anything changed and `build_after` is set
pub fn run_action(
    action: Action,
    targets: Vec<String>,
    build_after: bool,
    timeout: Option<Duration>,
    opts: &GlobalOpts,
) -> Result<(), QuantlabError> {
    let ctx = AppContext::load(opts.app_dir.as_deref())?;
    let targets = if targets.is_empty() && action.defaults_to_cwd() {
        vec![std::env::current_dir()?.display().to_string()]
    } else {
        targets
    };

    let options = BuildOptions {
        timeout: timeout.or_else(|| ctx.config.build_timeout()),
        ..BuildOptions::default()
    };
    let ops = LifecycleOps::with_options(&ctx, options);

    let mut changed = false;
    for target in &targets {
        let report = action.apply(&ops, target)?;
        for note in &report.notes {
            logger::warn(note);
        }
        if report.changed {
            changed = true;
            let subject = report.subject.as_deref().unwrap_or(target);
            logger::success(&format!("{} {}", action.past_tense(), subject));
        }
    }

    if !changed {
        return Ok(());
    }
    if !build_after {
        logger::info("Static output not rebuilt; run `quantlab build` to apply the changes");
        return Ok(());
    }

    logger::spinner_start("Building QuantLab...");
    match ops.build_if_needed() {
        BuildOutcome::Succeeded(result) => {
            report_build(&result);
            Ok(())
        }
        BuildOutcome::NotNeeded | BuildOutcome::Skipped => {
            logger::spinner_stop();
            logger::info("Static output is already up to date");
            Ok(())
        }
        BuildOutcome::Failed(err) => {
            logger::spinner_error("Build failed");
            logger::warn(
                "The registry was updated, but the static output has not been rebuilt yet. \
                 Fix the problem and run `quantlab build`.",
            );
            Err(err)
        }
    }
}

pub(super) fn report_build(result: &BuildResult) {
    logger::spinner_success(&format!(
        "Build complete in {:.1}s",
        result.duration.as_secs_f64()
    ));
}

use super::extensions::report_build;
use crate::build::BuildOptions;
use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::lifecycle::LifecycleOps;
use crate::GlobalOpts;
use quantlab_logger as logger;
use std::time::Duration;

/// Overrides for a single `build` invocation
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub clean: bool,
    pub timeout: Option<Duration>,
    pub name: Option<String>,
    pub version: Option<String>,
}

pub fn build_app(args: BuildArgs, opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let mut ctx = AppContext::load(opts.app_dir.as_deref())?;
    if args.name.is_some() {
        ctx.config.app_name = args.name;
    }
    if args.version.is_some() {
        ctx.config.app_version = args.version;
    }

    let options = BuildOptions {
        clean: args.clean,
        timeout: args.timeout.or_else(|| ctx.config.build_timeout()),
        ..BuildOptions::default()
    };
    let ops = LifecycleOps::with_options(&ctx, options);

    logger::spinner_start("Building QuantLab...");
    match ops.build(args.clean) {
        Ok(result) => {
            report_build(&result);
            Ok(())
        }
        Err(e) => {
            logger::spinner_error("Build failed");
            Err(e)
        }
    }
}

pub fn clean_app(opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let ctx = AppContext::load(opts.app_dir.as_deref())?;
    LifecycleOps::new(&ctx).clean()?;
    logger::success(&format!("Cleaned build output in {}", ctx.paths.root().display()));
    Ok(())
}

pub fn show_path(opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let root = crate::serving::get_app_dir(opts.app_dir.as_deref())?;
    logger::print(&root.display().to_string());
    Ok(())
}

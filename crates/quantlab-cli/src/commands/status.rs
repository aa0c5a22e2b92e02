use crate::context::AppContext;
use crate::errors::QuantlabError;
use crate::serving::{list_extensions, resolve_mode};
use crate::GlobalOpts;
use colored::Colorize;
use quantlab_logger as logger;
use std::path::PathBuf;

/// Report whether a rebuild is needed and what a server would serve
pub fn show_status(core_mode: bool, core_build: Option<PathBuf>, opts: &GlobalOpts) -> Result<(), QuantlabError> {
    let ctx = AppContext::load(opts.app_dir.as_deref())?;
    let plan = resolve_mode(&ctx, core_mode, core_build.as_deref())?;
    let extensions = list_extensions(&ctx)?;

    logger::print(&format!("{} {}", "App directory:".bold(), ctx.paths.root().display()));
    logger::print(&format!("{} {}", "Extensions:".bold(), extensions.len()));
    logger::print(&format!("{} {}", "Mode:".bold(), plan.mode.to_string().cyan()));
    if plan.assets_missing {
        logger::print(&format!("{} {}", "Assets:".bold(), "not built".red()));
    } else {
        logger::print(&format!("{} {}", "Assets:".bold(), plan.assets_dir.display()));
    }
    match plan.build_message {
        Some(reason) => logger::print(&format!("{} {}", "Build required:".yellow().bold(), reason)),
        None => logger::print(&format!("{} {}", "Build required:".bold(), "no".green())),
    }
    Ok(())
}

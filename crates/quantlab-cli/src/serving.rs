//! Facts the server needs from an app directory
//!
//! The server decides once, at startup, where to serve assets from. Core
//! mode serves the bundle shipped with the application itself; app mode
//! serves the app directory's own `static` output.

use crate::build::BuildPlanner;
use crate::context::AppContext;
use crate::errors::QuantlabError;
use quantlab_config::AppPaths;
use std::fmt;
use std::path::{Path, PathBuf};

/// Present in a released core bundle; its absence means a source checkout
pub const RELEASE_SENTINEL: &str = "release_data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// The shipped core bundle, without extensions or settings
    Core,
    /// Core mode over a bundle built from source
    Dev,
    /// The app directory's own build
    App,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppMode::Core => "core",
            AppMode::Dev => "dev",
            AppMode::App => "app",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingPlan {
    pub mode: AppMode,
    pub assets_dir: PathBuf,
    /// `None` when serving from inside the core bundle
    pub settings_dir: Option<PathBuf>,
    /// Why the app directory needs a rebuild, if it does
    pub build_message: Option<String>,
    pub assets_missing: bool,
}

/// Resolved app directory root
pub fn get_app_dir(explicit: Option<&Path>) -> Result<PathBuf, QuantlabError> {
    Ok(AppPaths::resolve(explicit)?.root().to_path_buf())
}

/// Names of registered extensions, enabled or not
pub fn list_extensions(ctx: &AppContext) -> Result<Vec<String>, QuantlabError> {
    Ok(ctx
        .registry()
        .list()?
        .into_iter()
        .filter(|r| r.is_extension())
        .map(|r| r.name)
        .collect())
}

/// `(needed, message)`; errs on the side of rebuilding
pub fn should_build(ctx: &AppContext) -> Result<(bool, String), QuantlabError> {
    let records = ctx.registry().list()?;
    let decision = BuildPlanner::new(ctx).needs_build(&records)?;
    Ok((decision.needed, decision.reason))
}

/// Decide what to serve.
///
/// `core_build_dir` is the bundle shipped with the application, if known.
/// Core mode is used when asked for, when the app directory is the core
/// bundle or its parent, and as a fallback when the app directory has
/// neither extensions nor a build of its own.
pub fn resolve_mode(
    ctx: &AppContext,
    core_requested: bool,
    core_build_dir: Option<&Path>,
) -> Result<ServingPlan, QuantlabError> {
    let paths = &ctx.paths;
    let root = paths.root();
    let local = core_build_dir.is_some_and(|core| root == core || core.parent() == Some(root));
    let core_mode = core_requested || local;

    let installed = list_extensions(ctx)?;
    let fallback = installed.is_empty() && !paths.static_dir().exists();

    let build_message = if core_mode {
        None
    } else {
        let (needed, message) = should_build(ctx)?;
        if needed {
            tracing::warn!(reason = %message, "Build required");
        }
        needed.then_some(message)
    };

    let settings_dir = (!local).then(|| paths.settings_dir());

    if core_mode || fallback {
        let Some(core) = core_build_dir else {
            return Ok(ServingPlan {
                mode: AppMode::Core,
                assets_dir: PathBuf::new(),
                settings_dir,
                build_message,
                assets_missing: true,
            });
        };
        let assets_missing = !core.is_dir();
        if assets_missing {
            tracing::error!(path = %core.display(), "Core static assets are not built");
        }
        let mode = if !assets_missing && !core.join(RELEASE_SENTINEL).exists() {
            AppMode::Dev
        } else {
            AppMode::Core
        };
        return Ok(ServingPlan {
            mode,
            assets_dir: core.to_path_buf(),
            settings_dir,
            build_message,
            assets_missing,
        });
    }

    Ok(ServingPlan {
        mode: AppMode::App,
        assets_dir: paths.static_dir(),
        settings_dir,
        build_message,
        assets_missing: false,
    })
}

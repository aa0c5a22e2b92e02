use clap::{Parser, Subcommand};
use quantlab::{
    commands::{
        build::{self as build_cmd, BuildArgs},
        config::{self, ConfigAction},
        extensions::{self, Action},
        list, status,
    },
    common::BuildFlags,
    GlobalOpts, QuantlabError,
};
use quantlab_logger as logger;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "quantlab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "QuantLab app directory manager",
    long_about = "Install, link and toggle QuantLab extensions, and rebuild the static application bundle."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install extensions or packages (registry names, archives or directories)
    Install {
        /// Package specs; defaults to the current directory
        targets: Vec<String>,
        #[command(flatten)]
        build: BuildFlags,
    },
    /// Remove installed extensions or packages by name
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
        #[command(flatten)]
        build: BuildFlags,
    },
    /// Link local packages into the build without copying them
    Link {
        /// Package directories; defaults to the current directory
        paths: Vec<String>,
        #[command(flatten)]
        build: BuildFlags,
    },
    /// Remove links by path or package name
    Unlink {
        /// Paths or names; defaults to the current directory
        targets: Vec<String>,
        #[command(flatten)]
        build: BuildFlags,
    },
    /// Enable disabled extensions
    Enable {
        #[arg(required = true)]
        names: Vec<String>,
        /// Rebuild the static output afterwards
        #[arg(long)]
        build: bool,
        /// Abort the toolchain after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Disable extensions without uninstalling them
    Disable {
        #[arg(required = true)]
        names: Vec<String>,
        /// Rebuild the static output afterwards
        #[arg(long)]
        build: bool,
        /// Abort the toolchain after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// List registered extensions and packages
    List {
        /// Only print the paths of linked packages
        #[arg(long)]
        linked: bool,
    },
    /// Rebuild the static output
    Build {
        /// Wipe the staging directory first
        #[arg(long)]
        clean: bool,
        /// Abort the toolchain after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Application name for this build
        #[arg(long)]
        name: Option<String>,
        /// Application version for this build
        #[arg(long = "version", value_name = "VERSION")]
        app_version: Option<String>,
    },
    /// Remove staging, static output and the build fingerprint
    Clean,
    /// Print the app directory
    Path,
    /// Show whether a rebuild is needed and what would be served
    Status {
        /// Report as if the server were started in core mode
        #[arg(long)]
        core_mode: bool,
        /// Location of the core bundle shipped with the application
        #[arg(long, value_name = "DIR")]
        core_build: Option<PathBuf>,
    },
    /// Show or change configuration
    #[command(subcommand_required = false, arg_required_else_help = false)]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

fn seconds(value: Option<u64>) -> Option<Duration> {
    value.filter(|s| *s > 0).map(Duration::from_secs)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level(), cli.global.quiet) {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    let global = &cli.global;
    let result = match cli.command {
        Commands::Install { targets, build } => extensions::run_action(
            Action::Install,
            targets,
            !build.no_build,
            build.timeout(),
            global,
        ),
        Commands::Uninstall { names, build } => extensions::run_action(
            Action::Uninstall,
            names,
            !build.no_build,
            build.timeout(),
            global,
        ),
        Commands::Link { paths, build } => {
            extensions::run_action(Action::Link, paths, !build.no_build, build.timeout(), global)
        }
        Commands::Unlink { targets, build } => extensions::run_action(
            Action::Unlink,
            targets,
            !build.no_build,
            build.timeout(),
            global,
        ),
        Commands::Enable {
            names,
            build,
            timeout,
        } => extensions::run_action(Action::Enable, names, build, seconds(timeout), global),
        Commands::Disable {
            names,
            build,
            timeout,
        } => extensions::run_action(Action::Disable, names, build, seconds(timeout), global),
        Commands::List { linked } => list::list_extensions(linked, global),
        Commands::Build {
            clean,
            timeout,
            name,
            app_version,
        } => build_cmd::build_app(
            BuildArgs {
                clean,
                timeout: seconds(timeout),
                name,
                version: app_version,
            },
            global,
        ),
        Commands::Clean => build_cmd::clean_app(global),
        Commands::Path => build_cmd::show_path(global),
        Commands::Status {
            core_mode,
            core_build,
        } => status::show_status(core_mode, core_build, global),
        Commands::Config { action } => config::handle_config(action, global),
    };

    if let Err(e) = result {
        fail(&e);
    }
}

fn fail(err: &QuantlabError) -> ! {
    logger::error(&err.to_string());
    if let Some(output) = err.build_output() {
        eprintln!("{}", output);
    }
    logger::show_log_path();
    std::process::exit(err.exit_code());
}

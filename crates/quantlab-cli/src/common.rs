//! Common types and utilities shared across modules

use clap::{Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Global CLI options available to all commands
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(short, long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase verbosity (-v for debug, -vv for trace)")]
    pub verbose: u8,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "App directory to operate on (defaults to $QUANTLAB_DIR, then the per-user data dir)"
    )]
    pub app_dir: Option<PathBuf>,
}

impl GlobalOpts {
    /// Get the effective verbosity level
    /// - 0: quiet/warn only
    /// - 1: debug (-v)
    /// - 2: trace (-vv)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

/// Build controls shared by every mutating command
#[derive(Args, Debug, Clone, Default)]
pub struct BuildFlags {
    /// Update the registry only; leave the static output as it is
    #[arg(long)]
    pub no_build: bool,

    /// Abort the toolchain after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl BuildFlags {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

//! CLI definition and dispatch.

pub mod watch;

use clap::Parser;

/// fanwatch — report file access on a mount point via fanotify.
#[derive(Parser, Debug)]
#[command(name = "fanwatch", version, about, long_about = None)]
pub struct Cli {
    /// Watch settings.
    #[command(flatten)]
    pub watch: watch::WatchArgs,

    /// Emit diagnostic logs as JSON on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Runs the parsed command.
///
/// # Errors
///
/// Returns an error if setup fails or the dispatch loop hits a fatal fault.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    watch::execute(cli.watch)
}

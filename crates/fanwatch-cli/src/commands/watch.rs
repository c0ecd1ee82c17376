//! `fanwatch <path>` — monitor the mount containing a path.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Args;
use fanwatch_common::config::WatchConfig;
use fanwatch_common::constants::UNKNOWN;
use fanwatch_core::{AllowAll, Channel, Dispatcher};

use crate::mountpoint;
use crate::output::{ConsoleReporter, OutputFormat};

/// Arguments for watching a path.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Path to monitor; the whole mount containing it is watched.
    #[arg(required_unless_present = "config")]
    pub path: Option<PathBuf>,

    /// JSON file with a full watch configuration.
    #[arg(long, env = "FANWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bound on each readiness wait, in milliseconds.
    #[arg(long)]
    pub poll_timeout_ms: Option<u16>,

    /// Print events as JSON objects instead of text lines.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    /// Builds the effective configuration: file (or defaults), then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or the result is
    /// invalid.
    pub fn resolve_config(&self) -> anyhow::Result<WatchConfig> {
        let mut config = match &self.config {
            Some(file) => WatchConfig::load(file)
                .with_context(|| format!("failed to load config {}", file.display()))?,
            None => WatchConfig::default(),
        };
        if let Some(path) = &self.path {
            config.path.clone_from(path);
        }
        if let Some(timeout) = self.poll_timeout_ms {
            config.poll_timeout_ms = timeout;
        }
        config.validate()?;
        Ok(config)
    }

    const fn format(&self) -> OutputFormat {
        if self.json { OutputFormat::Json } else { OutputFormat::Text }
    }
}

/// Executes the watch command until interrupted.
///
/// # Errors
///
/// Returns an error if the channel cannot be set up or the dispatch loop
/// stops on a read or reply fault.
pub fn execute(args: WatchArgs) -> anyhow::Result<()> {
    let config = args.resolve_config()?;

    let mount = mountpoint::find_mount_point(&config.path)
        .map_or_else(|| UNKNOWN.to_owned(), |mount| mount.display().to_string());
    println!("path: '{}' (mountpoint: '{mount}')", config.path.display());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("failed to install interrupt handler")?;
    }

    let channel = Channel::from_config(&config)
        .with_context(|| format!("failed to watch {}", config.path.display()))?;
    let reporter = ConsoleReporter::new(std::io::stdout().lock(), args.format());
    let mut dispatcher =
        Dispatcher::new(channel, AllowAll, reporter).with_poll_timeout(config.poll_timeout_ms);

    let stats = dispatcher.run(&stop)?;
    tracing::info!(
        events = stats.events,
        replies = stats.replies,
        overflows = stats.overflows,
        error_wakeups = stats.error_wakeups,
        "fanwatch stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use fanwatch_common::flags::EventMask;

    use super::*;
    use crate::commands::Cli;

    #[test]
    fn path_argument_overrides_default() {
        let cli = Cli::try_parse_from(["fanwatch", "/srv/data"]).expect("parse");
        let config = cli.watch.resolve_config().expect("config");
        assert_eq!(config.path, PathBuf::from("/srv/data"));
        assert_eq!(config.mask, WatchConfig::default().mask);
    }

    #[test]
    fn path_is_required_without_config() {
        assert!(Cli::try_parse_from(["fanwatch"]).is_err());
    }

    #[test]
    fn config_file_is_loaded_and_flags_override_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("watch.json");
        std::fs::write(&file, r#"{ "path": "/var", "mask": "CLOSE_WRITE", "init_flags": "NONBLOCK" }"#)
            .expect("write");

        let cli = Cli::try_parse_from([
            "fanwatch",
            "--config",
            file.to_str().expect("utf8"),
            "--poll-timeout-ms",
            "250",
        ])
        .expect("parse");
        let config = cli.watch.resolve_config().expect("config");
        assert_eq!(config.path, PathBuf::from("/var"));
        assert_eq!(config.mask, EventMask::CLOSE_WRITE);
        assert_eq!(config.poll_timeout_ms, 250);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["fanwatch", "/", "--poll-timeout-ms", "0"]).expect("parse");
        assert!(cli.watch.resolve_config().is_err());
    }

    #[test]
    fn json_flag_selects_json_format() {
        let cli = Cli::try_parse_from(["fanwatch", "--json", "/"]).expect("parse");
        assert_eq!(cli.watch.format(), OutputFormat::Json);
    }
}

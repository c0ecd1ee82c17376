//! Watch configuration supplied once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FanwatchError, Result};
use crate::flags::{EventFileFlags, EventMask, InitFlags, MarkFlags};

/// Everything needed to open a channel and register its single mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Path to mark. With [`MarkFlags::MOUNT`] its whole mount is watched.
    pub path: PathBuf,
    /// Notification class and group options.
    pub init_flags: InitFlags,
    /// Open flags for the per-event descriptors.
    pub event_file_flags: EventFileFlags,
    /// Mark registration options.
    pub mark_flags: MarkFlags,
    /// Conditions to report.
    pub mask: EventMask,
    /// Bound on each readiness wait, in milliseconds.
    pub poll_timeout_ms: u16,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/"),
            init_flags: InitFlags::CLASS_CONTENT | InitFlags::CLOEXEC | InitFlags::NONBLOCK,
            event_file_flags: EventFileFlags::CLOEXEC | EventFileFlags::LARGEFILE,
            mark_flags: MarkFlags::ADD | MarkFlags::MOUNT,
            mask: EventMask::OPEN_PERM | EventMask::CLOSE_WRITE | EventMask::CLOSE_NOWRITE,
            poll_timeout_ms: crate::constants::DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

impl WatchConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result fails [`WatchConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| FanwatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the combination of values before any kernel call is made.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Config`] for an empty path, a zero timeout,
    /// an empty mask, or a permission mask on a notification-only class.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(FanwatchError::Config {
                message: "watch path must not be empty".into(),
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(FanwatchError::Config {
                message: "poll timeout must be at least 1 ms".into(),
            });
        }
        if self.mask.is_empty() {
            return Err(FanwatchError::Config {
                message: "event mask must not be empty".into(),
            });
        }
        if self.mask.is_permission() && !self.init_flags.permits_permission_events() {
            return Err(FanwatchError::Config {
                message: format!(
                    "mask ({}) requests permission events but the notification class cannot receive them",
                    self.mask.describe()
                ),
            });
        }
        Ok(())
    }
}

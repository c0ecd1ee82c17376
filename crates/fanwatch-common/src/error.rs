//! Unified error types for the fanwatch workspace.
//!
//! Channel setup, event reads, and verdict replies each map to their own
//! variant so callers can tell a setup failure from a dead channel. None of
//! them are retried inside the core.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FanwatchError {
    /// Opening the notification group or registering a mark failed.
    #[error("{operation} failed: {source}")]
    Setup {
        /// Name of the failing kernel call.
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Reading an event from the notification group failed.
    #[error("failed to read fanotify event: {source}")]
    Read {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The kernel produced a record this build cannot decode.
    #[error("fanotify protocol error: {message}")]
    Protocol {
        /// Description of the malformed record.
        message: String,
    },

    /// Writing a permission verdict failed.
    #[error("failed to reply to permission event on fd {fd}: {source}")]
    Reply {
        /// Event descriptor the verdict was meant for.
        fd: i32,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A verdict was requested for an event that cannot take one.
    #[error("invalid response: {reason}")]
    InvalidResponse {
        /// Why the response was rejected.
        reason: String,
    },

    /// The channel was used after being closed.
    #[error("fanotify channel is closed")]
    ChannelClosed,

    /// An in-memory record does not match the kernel ABI size.
    #[error("ABI layout mismatch for {structure}: expected {expected} bytes, got {actual}")]
    Layout {
        /// Name of the mismatched structure.
        structure: &'static str,
        /// Size required by the kernel.
        expected: usize,
        /// Size of the compiled type.
        actual: usize,
    },

    /// Writing a report line failed.
    #[error("failed to report event: {source}")]
    Report {
        /// Underlying output error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation on a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl FanwatchError {
    /// Returns `true` if this is a read that found the non-blocking queue empty.
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Read { source } if source.kind() == std::io::ErrorKind::WouldBlock)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FanwatchError>;

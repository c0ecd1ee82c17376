//! System-wide constants and default values.

/// Default bound on a single readiness wait, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u16 = 1000;

/// Root of the proc filesystem used for display lookups.
pub const PROC_ROOT: &str = "/proc";

/// Placeholder printed when a display lookup yields nothing.
pub const UNKNOWN: &str = "?";

/// Timestamp layout for event lines (microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

//! Event line formatting and the console reporter.

use std::io::Write;

use chrono::{DateTime, Local};
use fanwatch_common::constants::{TIMESTAMP_FORMAT, UNKNOWN};
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_core::{Event, Reporter};
use serde::Serialize;

use crate::lookup;

/// Display data captured for one event while its descriptor is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventLine {
    /// Local time the event was received.
    pub timestamp: String,
    /// Command name of the triggering process, or `?`.
    pub process: String,
    /// Triggering process id.
    pub pid: i32,
    /// Condition names joined with `" | "`.
    pub mask: String,
    /// Path behind the event descriptor, or `?`.
    pub path: String,
}

impl EventLine {
    /// Captures display data for `event`. Failed lookups become `?`.
    #[must_use]
    pub fn capture(event: &Event, now: DateTime<Local>) -> Self {
        Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            process: lookup::process_name(event.pid()).unwrap_or_else(|| UNKNOWN.to_owned()),
            pid: event.pid(),
            mask: event.mask().describe(),
            path: lookup::descriptor_path(event.raw_fd())
                .map_or_else(|| UNKNOWN.to_owned(), |path| path.display().to_string()),
        }
    }

    /// Renders `[time] comm(pid) | (MASK) | path`.
    #[must_use]
    pub fn to_text(&self) -> String {
        format!(
            "[{}] {}({}) | ({}) | {}",
            self.timestamp, self.process, self.pid, self.mask, self.path
        )
    }
}

/// Line format for the console reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Writes one line per event to `out`.
#[derive(Debug)]
pub struct ConsoleReporter<W> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ConsoleReporter<W> {
    /// Creates a reporter writing `format` lines to `out`.
    pub const fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &Event) -> Result<()> {
        let line = EventLine::capture(event, DateTime::<Local>::from(event.received_at()));
        let rendered = match self.format {
            OutputFormat::Text => line.to_text(),
            OutputFormat::Json => serde_json::to_string(&line)?,
        };
        writeln!(self.out, "{rendered}")
            .and_then(|()| self.out.flush())
            .map_err(|source| FanwatchError::Report { source })
    }
}

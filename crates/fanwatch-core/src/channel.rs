//! The fanotify notification group.
//!
//! A [`Channel`] owns one group descriptor from `fanotify_init(2)`. It reads
//! one event record per call and writes one response record per verdict.
//! There is no buffering of its own: the kernel queue is the only queue.

use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use fanwatch_common::config::WatchConfig;
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::flags::{EventFileFlags, EventMask, InitFlags, MarkFlags};
use fanwatch_common::types::Verdict;
use nix::errno::Errno;

use crate::event::Event;
use crate::wire::{self, FANOTIFY_METADATA_VERSION, FanotifyEventMetadata, FanotifyResponse};

/// Directory that a relative mark path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRef {
    /// The current working directory (`AT_FDCWD`).
    Cwd,
    /// An open directory descriptor.
    Fd(RawFd),
}

impl DirRef {
    const fn as_raw(self) -> RawFd {
        match self {
            Self::Cwd => libc::AT_FDCWD,
            Self::Fd(fd) => fd,
        }
    }
}

/// A mark registration request, applied once at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    /// Add/remove and scope options.
    pub flags: MarkFlags,
    /// Conditions to report.
    pub mask: EventMask,
    /// Base for a relative `path`.
    pub dir: DirRef,
    /// Object to mark.
    pub path: PathBuf,
}

impl Mark {
    /// Builds a mark resolved against the current working directory.
    #[must_use]
    pub fn new(flags: MarkFlags, mask: EventMask, path: impl Into<PathBuf>) -> Self {
        Self {
            flags,
            mask,
            dir: DirRef::Cwd,
            path: path.into(),
        }
    }

    /// Builds the single mark described by a watch configuration.
    #[must_use]
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(config.mark_flags, config.mask, config.path.clone())
    }
}

/// An open fanotify notification group.
///
/// Closing is idempotent and happens on drop. Every other operation on a
/// closed channel fails with [`FanwatchError::ChannelClosed`].
#[derive(Debug)]
pub struct Channel {
    fd: Option<OwnedFd>,
}

impl Channel {
    /// Opens a new notification group.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Layout`] if the wire records do not match the
    /// kernel ABI, or [`FanwatchError::Setup`] if `fanotify_init` fails
    /// (missing `CAP_SYS_ADMIN`, unsupported kernel, resource limits).
    pub fn open(init_flags: InitFlags, event_flags: EventFileFlags) -> Result<Self> {
        wire::verify_layout()?;

        // SAFETY: fanotify_init takes two integer flag words and touches no
        // caller memory.
        let raw = unsafe { libc::fanotify_init(init_flags.bits(), event_flags.bits()) };
        let raw = Errno::result(raw).map_err(|errno| FanwatchError::Setup {
            operation: "fanotify_init",
            source: errno.into(),
        })?;

        // SAFETY: on success fanotify_init returns a fresh descriptor that
        // nothing else in the process owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        tracing::info!(fd = raw, flags = ?init_flags, event_flags = ?event_flags, "fanotify group opened");
        Ok(Self { fd: Some(fd) })
    }

    /// Opens a group and registers the configured mark.
    ///
    /// On a mark failure the group is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of whichever setup step failed.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let channel = Self::open(config.init_flags, config.event_file_flags)?;
        channel.add_mark(&Mark::from_config(config))?;
        Ok(channel)
    }

    /// Registers a mark request.
    ///
    /// # Errors
    ///
    /// See [`Channel::mark`].
    pub fn add_mark(&self, mark: &Mark) -> Result<()> {
        self.mark(mark.flags, mark.mask, mark.dir, &mark.path)
    }

    /// Registers interest in `mask` for `path`, relative to `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ChannelClosed`] after close,
    /// [`FanwatchError::Config`] if the path contains a NUL byte, and
    /// [`FanwatchError::Setup`] if `fanotify_mark` fails (missing path,
    /// invalid flag combination, permission denied).
    pub fn mark(&self, flags: MarkFlags, mask: EventMask, dir: DirRef, path: &Path) -> Result<()> {
        let fd = self.open_raw_fd()?;
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| FanwatchError::Config {
            message: format!("mark path contains a NUL byte: {}", path.display()),
        })?;

        // SAFETY: c_path is a valid NUL-terminated string that outlives the
        // call; the remaining arguments are plain integers.
        let rc = unsafe { libc::fanotify_mark(fd, flags.bits(), mask.bits(), dir.as_raw(), c_path.as_ptr()) };
        Errno::result(rc).map(drop).map_err(|errno| FanwatchError::Setup {
            operation: "fanotify_mark",
            source: errno.into(),
        })?;

        tracing::info!(
            path = %path.display(),
            flags = ?flags,
            mask = %mask.describe(),
            "fanotify mark registered"
        );
        Ok(())
    }

    /// Reads exactly one event record and takes ownership of its descriptor.
    ///
    /// On a non-blocking group with an empty queue this fails with a read
    /// error whose kind is `WouldBlock` (see
    /// [`FanwatchError::is_would_block`]).
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Read`] if `read(2)` fails or yields no data,
    /// and [`FanwatchError::Protocol`] for a short record or an unknown
    /// metadata version. A descriptor carried by a rejected record is closed.
    pub fn read_event(&self) -> Result<Event> {
        let fd = self.open_raw_fd()?;
        let mut meta = FanotifyEventMetadata::empty();
        let buf = meta.as_bytes_mut();

        // SAFETY: buf is a writable region of exactly buf.len() bytes owned
        // by `meta` for the duration of the call.
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        let n = Errno::result(n).map_err(|errno| FanwatchError::Read { source: errno.into() })?;
        let n = usize::try_from(n).unwrap_or_default();

        if n == 0 {
            return Err(FanwatchError::Read {
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "fanotify descriptor returned no data",
                ),
            });
        }
        if n != wire::METADATA_LEN {
            return Err(FanwatchError::Protocol {
                message: format!("short event record: {n} of {} bytes", wire::METADATA_LEN),
            });
        }

        // SAFETY: a complete record from the kernel carries either FAN_NOFD
        // or a descriptor it just installed in our table for us alone.
        let event = unsafe { Event::from_metadata(&meta) };
        let version = event.version();
        if version != FANOTIFY_METADATA_VERSION {
            event.close();
            return Err(FanwatchError::Protocol {
                message: format!("metadata version {version} (expected {FANOTIFY_METADATA_VERSION})"),
            });
        }

        tracing::debug!(
            fd = event.raw_fd(),
            pid = event.pid(),
            mask = %event.mask().describe(),
            "event received"
        );
        Ok(event)
    }

    /// Writes a verdict for a permission-class event.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ChannelClosed`] after close,
    /// [`FanwatchError::InvalidResponse`] if the event has no descriptor or
    /// no permission flag, and [`FanwatchError::Reply`] if the write fails.
    pub fn respond(&self, event: &Event, verdict: Verdict) -> Result<()> {
        let fd = self.open_raw_fd()?;
        if !event.is_permission() {
            return Err(FanwatchError::InvalidResponse {
                reason: format!("mask ({}) carries no permission flag", event.mask().describe()),
            });
        }
        let Some(event_fd) = event.descriptor() else {
            return Err(FanwatchError::InvalidResponse {
                reason: "permission event carries no descriptor".into(),
            });
        };

        let response = FanotifyResponse::new(event_fd.as_raw_fd(), verdict);
        let bytes = response.as_bytes();

        // SAFETY: bytes is a readable region of exactly bytes.len() bytes
        // borrowed from `response` for the duration of the call.
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        let n = Errno::result(n).map_err(|errno| FanwatchError::Reply {
            fd: response.fd,
            source: errno.into(),
        })?;
        if usize::try_from(n).unwrap_or_default() != wire::RESPONSE_LEN {
            return Err(FanwatchError::Reply {
                fd: response.fd,
                source: std::io::Error::new(std::io::ErrorKind::WriteZero, "short response write"),
            });
        }

        tracing::debug!(fd = response.fd, pid = event.pid(), verdict = %verdict, "verdict sent");
        Ok(())
    }

    /// Releases the group descriptor. Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            tracing::info!(fd = fd.as_raw_fd(), "fanotify group closed");
            drop(fd);
        }
    }

    /// Borrows the group descriptor for readiness polling.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ChannelClosed`] after close.
    pub fn descriptor(&self) -> Result<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd).ok_or(FanwatchError::ChannelClosed)
    }

    /// Raw group descriptor, or `-1` once closed.
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    /// Returns `true` until [`Channel::close`] is called.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    fn open_raw_fd(&self) -> Result<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd).ok_or(FanwatchError::ChannelClosed)
    }
}

/// Wraps an existing descriptor, such as one inherited from a parent.
impl From<OwnedFd> for Channel {
    fn from(fd: OwnedFd) -> Self {
        Self { fd: Some(fd) }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

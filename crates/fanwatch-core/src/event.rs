//! Decoded fanotify events.
//!
//! An [`Event`] owns the descriptor the kernel opened for it. The type is
//! neither `Clone` nor `Copy`, so the descriptor is released exactly once:
//! either by [`Event::close`] or when the event is dropped.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::time::SystemTime;

use fanwatch_common::flags::EventMask;

use crate::wire::{FAN_NOFD, FANOTIFY_METADATA_VERSION, FanotifyEventMetadata};

/// A single notification read from a channel.
#[derive(Debug)]
pub struct Event {
    mask: EventMask,
    pid: i32,
    version: u8,
    received_at: SystemTime,
    fd: Option<OwnedFd>,
}

impl Event {
    /// Builds an event from already-owned parts, received now.
    #[must_use]
    pub fn new(mask: EventMask, pid: i32, fd: Option<OwnedFd>) -> Self {
        Self {
            mask,
            pid,
            version: FANOTIFY_METADATA_VERSION,
            received_at: SystemTime::now(),
            fd,
        }
    }

    /// Takes ownership of the descriptor carried by a kernel record.
    ///
    /// # Safety
    ///
    /// `meta.fd` must be [`FAN_NOFD`] or an open descriptor that nothing
    /// else owns. After this call the returned event closes it.
    pub(crate) unsafe fn from_metadata(meta: &FanotifyEventMetadata) -> Self {
        let fd = (meta.fd >= 0).then(|| {
            // SAFETY: the caller guarantees the descriptor is open and unowned.
            unsafe { OwnedFd::from_raw_fd(meta.fd) }
        });
        Self {
            mask: EventMask::from_raw(meta.mask),
            pid: meta.pid,
            version: meta.vers,
            received_at: SystemTime::now(),
            fd,
        }
    }

    /// Condition bits, including any the build does not name.
    #[must_use]
    pub const fn mask(&self) -> EventMask {
        self.mask
    }

    /// Process that triggered the event.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    /// Metadata protocol version reported by the kernel.
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Wall-clock time the record was decoded, before any verdict.
    #[must_use]
    pub const fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Returns `true` if the kernel is blocked waiting for a verdict.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        self.mask.is_permission()
    }

    /// Returns `true` if this event signals a queue overflow.
    #[must_use]
    pub const fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }

    /// Borrows the per-event descriptor, if the kernel attached one.
    #[must_use]
    pub fn descriptor(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// Raw descriptor number, or [`FAN_NOFD`] when none is attached.
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(FAN_NOFD, AsRawFd::as_raw_fd)
    }

    /// Releases the per-event descriptor.
    pub fn close(self) {
        if let Some(fd) = self.fd {
            tracing::trace!(fd = fd.as_raw_fd(), pid = self.pid, "closing event descriptor");
            drop(fd);
        }
    }
}

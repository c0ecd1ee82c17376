//! Flag sets for `fanotify_init(2)` and `fanotify_mark(2)`.
//!
//! Values follow `include/uapi/linux/fanotify.h`. Open flags for the
//! descriptors the kernel creates on our behalf come from `libc`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Group-level options passed as the `flags` argument of `fanotify_init`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InitFlags: u32 {
        /// Notification-only class (the default, no permission events).
        const CLASS_NOTIF = 0x0000_0000;
        /// Set close-on-exec on the group descriptor.
        const CLOEXEC = 0x0000_0001;
        /// Non-blocking reads on the group descriptor.
        const NONBLOCK = 0x0000_0002;
        /// Permission decisions after files hold their final content.
        const CLASS_CONTENT = 0x0000_0004;
        /// Permission decisions before files hold their final content.
        const CLASS_PRE_CONTENT = 0x0000_0008;
        /// Lift the 16384-event queue limit. Requires `CAP_SYS_ADMIN`.
        const UNLIMITED_QUEUE = 0x0000_0010;
        /// Lift the 8192-mark limit. Requires `CAP_SYS_ADMIN`.
        const UNLIMITED_MARKS = 0x0000_0020;
    }
}

impl InitFlags {
    /// Returns `true` if the selected class can receive permission events.
    #[must_use]
    pub const fn permits_permission_events(self) -> bool {
        self.intersects(Self::CLASS_CONTENT.union(Self::CLASS_PRE_CONTENT))
    }
}

bitflags! {
    /// Open flags applied to the per-event descriptors (`event_f_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventFileFlags: u32 {
        /// Write-only access.
        const WRONLY = libc::O_WRONLY as u32;
        /// Read-write access.
        const RDWR = libc::O_RDWR as u32;
        /// Append mode.
        const APPEND = libc::O_APPEND as u32;
        /// Non-blocking descriptor.
        const NONBLOCK = libc::O_NONBLOCK as u32;
        /// Do not update access time.
        const NOATIME = libc::O_NOATIME as u32;
        /// Large file support.
        const LARGEFILE = libc::O_LARGEFILE as u32;
        /// Close-on-exec on every event descriptor.
        const CLOEXEC = libc::O_CLOEXEC as u32;
    }
}

bitflags! {
    /// Registration options passed as the `flags` argument of `fanotify_mark`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MarkFlags: u32 {
        /// Add the mask to the mark.
        const ADD = 0x0000_0001;
        /// Remove the mask from the mark.
        const REMOVE = 0x0000_0002;
        /// Mark a symlink itself rather than its target.
        const DONT_FOLLOW = 0x0000_0004;
        /// Fail with `ENOTDIR` unless the target is a directory.
        const ONLYDIR = 0x0000_0008;
        /// Mark the whole mount containing the path.
        const MOUNT = 0x0000_0010;
        /// Update the ignore mask instead of the event mask.
        const IGNORED_MASK = 0x0000_0020;
        /// Ignore mask survives modify events.
        const IGNORED_SURV_MODIFY = 0x0000_0040;
        /// Remove all marks of the selected kind.
        const FLUSH = 0x0000_0080;
        /// Mark the whole filesystem containing the path.
        const FILESYSTEM = 0x0000_0100;
    }
}

bitflags! {
    /// Event conditions registered by a mark and reported in event records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventMask: u64 {
        /// File was read.
        const ACCESS = 0x0000_0001;
        /// File was written.
        const MODIFY = 0x0000_0002;
        /// Metadata changed.
        const ATTRIB = 0x0000_0004;
        /// Writable file was closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// Read-only file was closed.
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const OPEN = 0x0000_0020;
        /// File was opened for execution.
        const OPEN_EXEC = 0x0000_1000;
        /// The event queue overflowed.
        const Q_OVERFLOW = 0x0000_4000;
        /// Permission to open was requested.
        const OPEN_PERM = 0x0001_0000;
        /// Permission to read was requested.
        const ACCESS_PERM = 0x0002_0000;
        /// Permission to open for execution was requested.
        const OPEN_EXEC_PERM = 0x0004_0000;
        /// Report events on children of marked directories.
        const EVENT_ON_CHILD = 0x0800_0000;
        /// Event subject is a directory.
        const ONDIR = 0x4000_0000;
    }
}

/// Mask names in display order.
const MASK_NAMES: &[(EventMask, &str)] = &[
    (EventMask::OPEN_PERM, "OPEN_PERM"),
    (EventMask::OPEN, "OPEN"),
    (EventMask::ACCESS_PERM, "ACCESS_PERM"),
    (EventMask::ACCESS, "ACCESS"),
    (EventMask::MODIFY, "MODIFY"),
    (EventMask::CLOSE_WRITE, "CLOSE_WRITE"),
    (EventMask::CLOSE_NOWRITE, "CLOSE_NOWRITE"),
    (EventMask::Q_OVERFLOW, "Q_OVERFLOW"),
    (EventMask::ONDIR, "ONDIR"),
    (EventMask::EVENT_ON_CHILD, "EVENT_ON_CHILD"),
    (EventMask::ATTRIB, "ATTRIB"),
    (EventMask::OPEN_EXEC, "OPEN_EXEC"),
    (EventMask::OPEN_EXEC_PERM, "OPEN_EXEC_PERM"),
];

impl EventMask {
    /// Every condition that blocks the triggering operation until a verdict arrives.
    pub const PERMISSION: Self = Self::OPEN_PERM
        .union(Self::ACCESS_PERM)
        .union(Self::OPEN_EXEC_PERM);

    /// Returns `true` if the kernel is waiting for a verdict on this event.
    #[must_use]
    pub const fn is_permission(self) -> bool {
        self.intersects(Self::PERMISSION)
    }

    /// Builds a mask from a raw kernel value, keeping unknown bits.
    #[must_use]
    pub const fn from_raw(bits: u64) -> Self {
        Self::from_bits_retain(bits)
    }

    /// Joins the known condition names with `" | "`.
    ///
    /// Unknown bits are skipped; a mask with no known bits yields an
    /// empty string.
    #[must_use]
    pub fn describe(self) -> String {
        MASK_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

//! Kernel ABI records exchanged verbatim over the fanotify descriptor.
//!
//! Both records are plain integers with `#[repr(C)]` layout and no internal
//! padding, so every bit pattern is a valid value and the byte views below
//! are sound.

use std::mem::{offset_of, size_of};

use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::Verdict;
use static_assertions::{assert_eq_size, const_assert_eq};

/// Metadata version this build decodes.
pub const FANOTIFY_METADATA_VERSION: u8 = 3;

/// Descriptor value the kernel sends when no file is attached.
pub const FAN_NOFD: i32 = -1;

/// Size of `struct fanotify_event_metadata` in the kernel ABI.
pub const METADATA_LEN: usize = 24;

/// Size of `struct fanotify_response` in the kernel ABI.
pub const RESPONSE_LEN: usize = 8;

/// Mirror of `struct fanotify_event_metadata`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanotifyEventMetadata {
    /// Length of this event including any trailing info records.
    pub event_len: u32,
    /// Protocol version, compared against [`FANOTIFY_METADATA_VERSION`].
    pub vers: u8,
    /// Reserved by the kernel.
    pub reserved: u8,
    /// Length of the fixed metadata part.
    pub metadata_len: u16,
    /// Condition bits.
    pub mask: u64,
    /// Per-event descriptor or [`FAN_NOFD`].
    pub fd: i32,
    /// Process that triggered the event.
    pub pid: i32,
}

/// Mirror of `struct fanotify_response`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanotifyResponse {
    /// Descriptor of the event being answered.
    pub fd: i32,
    /// `FAN_ALLOW` or `FAN_DENY`.
    pub response: u32,
}

assert_eq_size!(FanotifyEventMetadata, [u8; METADATA_LEN]);
assert_eq_size!(FanotifyResponse, [u8; RESPONSE_LEN]);
const_assert_eq!(offset_of!(FanotifyEventMetadata, vers), 4);
const_assert_eq!(offset_of!(FanotifyEventMetadata, metadata_len), 6);
const_assert_eq!(offset_of!(FanotifyEventMetadata, mask), 8);
const_assert_eq!(offset_of!(FanotifyEventMetadata, fd), 16);
const_assert_eq!(offset_of!(FanotifyEventMetadata, pid), 20);
const_assert_eq!(offset_of!(FanotifyResponse, response), 4);

impl FanotifyEventMetadata {
    /// Returns a record that marks no descriptor and no conditions.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            event_len: 0,
            vers: 0,
            reserved: 0,
            metadata_len: 0,
            mask: 0,
            fd: FAN_NOFD,
            pid: 0,
        }
    }

    /// Borrows the record as the bytes the kernel reads.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        // SAFETY: the type is repr(C), padding-free (asserted above), and
        // the slice covers exactly its own storage for the borrow's lifetime.
        unsafe { std::slice::from_raw_parts(std::ptr::from_ref(self).cast::<u8>(), size_of::<Self>()) }
    }

    /// Mutably borrows the record as a read buffer.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `as_bytes`; any byte pattern written through the
        // slice is a valid value because every field is a plain integer.
        unsafe {
            std::slice::from_raw_parts_mut(std::ptr::from_mut(self).cast::<u8>(), size_of::<Self>())
        }
    }

    /// Decodes a record from exactly [`METADATA_LEN`] bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != size_of::<Self>() {
            return None;
        }
        // SAFETY: length checked above; read_unaligned tolerates any
        // alignment and every bit pattern is a valid value.
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
}

impl FanotifyResponse {
    /// Pairs an event descriptor with a verdict.
    #[must_use]
    pub const fn new(fd: i32, verdict: Verdict) -> Self {
        Self {
            fd,
            response: verdict.as_raw(),
        }
    }

    /// Decodes the verdict, if the code is one this build knows.
    #[must_use]
    pub const fn verdict(&self) -> Option<Verdict> {
        Verdict::from_raw(self.response)
    }

    /// Borrows the record as the bytes the kernel consumes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        // SAFETY: repr(C), two 4-byte integers, no padding.
        unsafe { std::slice::from_raw_parts(std::ptr::from_ref(self).cast::<u8>(), size_of::<Self>()) }
    }

    /// Decodes a record from exactly [`RESPONSE_LEN`] bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != size_of::<Self>() {
            return None;
        }
        // SAFETY: length checked above; plain integers, unaligned read.
        Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<Self>()) })
    }
}

/// Confirms at runtime that the compiled records match the kernel sizes.
///
/// # Errors
///
/// Returns [`FanwatchError::Layout`] naming the first mismatched record.
pub fn verify_layout() -> Result<()> {
    if size_of::<FanotifyEventMetadata>() != METADATA_LEN {
        return Err(FanwatchError::Layout {
            structure: "fanotify_event_metadata",
            expected: METADATA_LEN,
            actual: size_of::<FanotifyEventMetadata>(),
        });
    }
    if size_of::<FanotifyResponse>() != RESPONSE_LEN {
        return Err(FanwatchError::Layout {
            structure: "fanotify_response",
            expected: RESPONSE_LEN,
            actual: size_of::<FanotifyResponse>(),
        });
    }
    Ok(())
}

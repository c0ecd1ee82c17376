//! Domain primitive types used across the fanwatch workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw `FAN_ALLOW` response code.
pub const FAN_ALLOW: u32 = 0x01;
/// Raw `FAN_DENY` response code.
pub const FAN_DENY: u32 = 0x02;

/// Answer to a permission-class event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Let the operation proceed.
    Allow,
    /// Fail the operation with `EPERM`.
    Deny,
}

impl Verdict {
    /// Returns the kernel response code.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Allow => FAN_ALLOW,
            Self::Deny => FAN_DENY,
        }
    }

    /// Decodes a kernel response code.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            FAN_ALLOW => Some(Self::Allow),
            FAN_DENY => Some(Self::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

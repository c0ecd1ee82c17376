//! # fanwatch-core
//!
//! Safe wrapper around the Linux fanotify notification channel.
//!
//! This crate provides:
//! - **Wire structures**: byte-exact `fanotify_event_metadata` and
//!   `fanotify_response` records.
//! - **Channel**: a notification group with mark registration, one-event
//!   reads, and verdict writes.
//! - **Events**: decoded records that own their per-event descriptor.
//! - **Dispatcher**: the `poll(2)`-driven read, reply, report, close loop.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod channel;
pub mod dispatcher;
pub mod event;
pub mod policy;
pub mod wire;

pub use channel::{Channel, DirRef, Mark};
pub use dispatcher::{Dispatcher, DispatchStats, Disposition, EventSource, Readiness, Reporter};
pub use event::Event;
pub use policy::{AllowAll, Policy};

//! # fanwatch-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the fanwatch workspace.
//!
//! This crate is the leaf of the dependency graph. It knows the fanotify
//! flag values and verdict codes but performs no system calls.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod flags;
pub mod types;

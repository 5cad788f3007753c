//! # gantry-core
//!
//! Low-level Linux isolation primitives for the Gantry runtime.
//!
//! This crate provides safe abstractions over:
//! - **PID namespace**: `unshare(2)` so a spawned child becomes PID 1 in a
//!   fresh process-id space.
//! - **Root confinement**: `chroot(2)` + `chdir(2)` helpers built to run
//!   between `fork` and `exec`.
//!
//! Non-Linux builds get stub functions that return
//! [`error::IsolationError::Unsupported`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod namespace;
pub mod rootfs;

//! # gantry-runtime
//!
//! The run pipeline: stages a cached image into an ephemeral private
//! root, launches the command chrooted there inside a fresh PID
//! namespace, and propagates the child's exit status to the caller.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod launcher;
pub mod runner;
pub mod stage;

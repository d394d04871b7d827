//! # stackline-common
//!
//! Identifiers, the workspace error type, configuration and default
//! constants.
//!
//! Depends on no other internal crate. The model, stack and runtime
//! crates all build on the identifiers and defaults defined here.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

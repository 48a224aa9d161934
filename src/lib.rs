//! gridwatt - utility usage collector
//!
//! Pulls electricity-usage readings from utility web portals (NYSEG,
//! Con Edison), normalizes them to hourly records, stores them in a local
//! SQLite database, and publishes them to a Home Assistant energy dashboard.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
// The automation and pipeline seams are generic-only; no dyn dispatch.
#![allow(async_fn_in_trait)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod publish;
pub mod storage;

/// Test utilities module - included in test builds or when the test-utils
/// feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, GridwattError, Result};

//! # plsync Common Library
//!
//! Shared code for the plsync workspace:
//! - Error type and result alias
//! - Configuration loading, saving and root folder resolution
//! - Time-window and release-date utilities

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::TimeWindow;

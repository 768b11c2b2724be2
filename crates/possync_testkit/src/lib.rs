//! # POS Sync Testkit
//!
//! Test utilities for the POS sync middleware.
//!
//! This crate provides:
//! - Sample terminal submissions and staged records
//! - Temporary journal-backed staging stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use possync_testkit::prelude::*;
//! use possync_staging::StagingStore;
//!
//! let store = memory_store_with(&[staged("lapaz", "1001", &[1, 2])]);
//! assert_eq!(store.stats().pending_lines, 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

//! Shared test utilities for the wind-field workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic scalar and wind field generators
//! - Sample value factories for point caches
//! - Common viewport fixtures
//! - Temporary output directories
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{generators, fixtures};
//! ```

pub mod fixtures;
pub mod generators;
pub mod samples;

pub use fixtures::*;
pub use generators::*;
pub use samples::*;

/// Creates a temporary directory for test output.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("windfield_test")
        .tempdir()
        .expect("Failed to create temporary test directory")
}

//! Spindle Integration Tests
//!
//! End-to-end coordinator runs against temporary directory trees.
//! Run with: `cargo test -p spindle-tests`

pub mod common;

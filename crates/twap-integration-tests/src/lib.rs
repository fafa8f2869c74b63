//! Integration test crate for the TWAP oracle.
//!
//! This crate has no library code. It only contains integration tests that
//! exercise the engine, cache, and adapters together across workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p twap-integration-tests
//! ```

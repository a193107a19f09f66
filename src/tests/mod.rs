//! Crate-level tests
//!
//! Fixtures shared by the per-module tests, plus scenarios that drive a
//! whole media source.

//! # kmd-tests
//!
//! Integration tests for kmd-consensus.
//!
//! This crate provides:
//! - Scenario tests for retargeting and notary second blocks
//! - Validation tests driving the proof-of-work validator over a chain
//! - Property-based tests for the codec, clamp and priority rules
//! - Concurrency tests over shared chain snapshots

pub mod generators;
pub mod harness;




#[cfg(test)]
mod concurrency_tests;

pub use generators::*;
pub use harness::*;

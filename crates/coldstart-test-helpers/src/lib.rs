//! Test utilities and fixtures for coldstart
//!
//! Shared by the integration tests of the core and CLI crates.

pub mod fixtures;
pub mod mocks;
pub mod node;

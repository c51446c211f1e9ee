//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the workflow engine: entity builders with
//! sensible defaults, repository test doubles and async wait helpers.
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;

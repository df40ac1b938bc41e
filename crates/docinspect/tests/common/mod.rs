//! Shared utilities for docinspect integration tests.
//!
//! - `TestHarness`: temp work root, in-memory database and object store,
//!   and a runtime for the async adapters
//! - `fakes`: page renderer, detectors, extractor and analyzer that never
//!   leave the process

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;

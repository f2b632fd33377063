//! Shared test utilities for paperlens integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated orchestrator over temp directories and an
//!   in-memory database
//! - Scripted extraction and analysis stages that record their invocations

pub mod harness;
pub mod stages;

pub use harness::TestHarness;
pub use stages::{AnalyzeBehavior, ExtractBehavior, ScriptedAnalyzer, ScriptedExtractor};

//! Testing utilities and mock implementations
//!
//! Test doubles for every collaborator of the orchestrator, so the graph can be
//! exercised end to end without network access or an LLM.

pub mod mocks;

pub use mocks::*;

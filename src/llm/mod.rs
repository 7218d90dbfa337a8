//! LLM provider abstraction layer
//!
//! Provider-agnostic chat completion interface used by the intent classifier.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;

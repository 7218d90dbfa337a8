//! Graph nodes other than the router
//!
//! Branch handlers call exactly one collaborator under the per-branch timeout
//! and turn every collaborator failure into an error field or soft note, so a
//! backend outage never halts a request.

pub mod clarification;
pub mod fallback;
pub mod order;
pub mod policy;
pub mod synthesis;
pub mod web;

pub use clarification::ClarificationHandler;
pub use fallback::FallbackHandler;
pub use order::OrderHandler;
pub use policy::{format_policy_context, PolicyHandler};
pub use synthesis::Synthesizer;
pub use web::{format_web_context, WebHandler};

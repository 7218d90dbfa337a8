//! Omni-Help - confidence-gated request routing for support assistants
//!
//! A single customer request is classified, gated on confidence, dispatched to
//! exactly one capability branch and turned into a natural-language answer.
//!
//! # Overview
//!
//! - [`routing`]: intent classification and the confidence gate
//! - [`handlers`]: policy, order, web, clarification and fallback branches plus synthesis
//! - [`graph`]: shared state, the node contract and the graph executor
//! - [`backends`]: collaborator contracts and their HTTP adapters
//! - [`evaluation`]: router accuracy against a labelled dataset
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use omnihelp::config::AppConfig;
//! use omnihelp::graph::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let orchestrator = Orchestrator::new(config.orchestrator(), config.build_collaborators()?);
//!
//! let answer = orchestrator
//!     .respond("What is your return policy?", Vec::new())
//!     .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod handlers;
pub mod llm;
pub mod observability;
pub mod routing;
pub mod testing;

pub use config::{AppConfig, ConfigError};
pub use error::{NodeError, OrchestratorError, OrchestratorResult};
pub use graph::{
    Collaborators, ConversationEntry, Intent, Orchestrator, OrchestratorConfig, Route, RunReport,
    SharedState,
};
pub use routing::{Classification, Classifier, ConfidenceGate};

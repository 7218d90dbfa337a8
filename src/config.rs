//! Configuration for the Omni-Help orchestrator
//!
//! Loaded from a TOML file in which every section is optional. Secrets are
//! never stored in the file: `*_env` fields name the environment variable that
//! holds them and are resolved when the collaborators are built.
//!
//! ```toml
//! [router]
//! confidence_threshold = 0.7
//! max_reroutes = 3
//!
//! [branches]
//! timeout_ms = 10000
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [search]
//! api_key_env = "SERPER_API_KEY"
//!
//! [retrieval]
//! url = "http://localhost:8001/search"
//!
//! [orders]
//! url = "http://localhost:8002/query"
//!
//! [escalation]
//! webhook_url = "http://localhost:8003/tickets"
//! ```

use crate::backends::{
    EscalationSink, HttpBackendConfig, HttpOrderData, HttpRetriever, LogEscalationSink,
    OrderData, Retriever, SerperConfig, SerperWebSearch, Unconfigured, WebSearch,
    WebhookEscalationSink,
};
use crate::graph::{Collaborators, OrchestratorConfig};
use crate::llm::{OpenAiConfig, OpenAiProvider};
use crate::routing::LlmClassifier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const ENV_CONFIDENCE_THRESHOLD: &str = "OMNIHELP_CONFIDENCE_THRESHOLD";
pub const ENV_MAX_REROUTES: &str = "OMNIHELP_MAX_REROUTES";
pub const ENV_BRANCH_TIMEOUT_MS: &str = "OMNIHELP_BRANCH_TIMEOUT_MS";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub router: RouterSection,
    pub branches: BranchesSection,
    pub llm: LlmSection,
    pub search: SearchSection,
    pub retrieval: ServiceSection,
    pub orders: ServiceSection,
    pub escalation: EscalationSection,
}

/// Confidence gate and clarification loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterSection {
    pub confidence_threshold: f64,
    pub max_reroutes: u32,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_reroutes: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BranchesSection {
    /// Timeout applied to every collaborator call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for BranchesSection {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Classifier model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    /// Only "openai" (or an OpenAI-compatible endpoint via `base_url`) is supported
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: None,
        }
    }
}

/// Web search (Serper)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSection {
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_results: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: "SERPER_API_KEY".to_string(),
            base_url: None,
            max_results: 5,
        }
    }
}

/// JSON-over-HTTP service; absent `url` means not configured
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSection {
    pub url: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EscalationSection {
    /// Handoffs are only logged when unset
    pub webhook_url: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.finish()
    }

    /// Load from `path` if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::default().finish(),
        }
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.apply_env_overrides()?;
        self.validate()?;
        Ok(self)
    }

    /// Apply `OMNIHELP_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_override(ENV_CONFIDENCE_THRESHOLD)? {
            self.router.confidence_threshold = value;
        }
        if let Some(value) = env_override(ENV_MAX_REROUTES)? {
            self.router.max_reroutes = value;
        }
        if let Some(value) = env_override(ENV_BRANCH_TIMEOUT_MS)? {
            self.branches.timeout_ms = value;
        }
        Ok(())
    }

    /// Check ranges and URLs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.router.confidence_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidConfig(format!(
                "router.confidence_threshold must be between 0 and 1, got {threshold}"
            )));
        }
        if self.branches.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "branches.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.llm.provider != "openai" {
            return Err(ConfigError::InvalidConfig(format!(
                "unsupported llm.provider '{}'",
                self.llm.provider
            )));
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::InvalidConfig(
                "search.max_results must be greater than 0".to_string(),
            ));
        }

        for (field, value) in [
            ("llm.base_url", &self.llm.base_url),
            ("search.base_url", &self.search.base_url),
            ("retrieval.url", &self.retrieval.url),
            ("orders.url", &self.orders.url),
            ("escalation.webhook_url", &self.escalation.webhook_url),
        ] {
            if let Some(value) = value {
                validate_url(field, value)?;
            }
        }

        Ok(())
    }

    pub fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.branches.timeout_ms)
    }

    /// Graph tunables derived from this configuration
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            confidence_threshold: self.router.confidence_threshold,
            max_reroutes: self.router.max_reroutes,
            branch_timeout: self.branch_timeout(),
        }
    }

    /// Build the collaborators, resolving secrets from the environment
    ///
    /// The classifier API key is required. Services without a URL or key are
    /// replaced by [`Unconfigured`] and logged.
    pub fn build_collaborators(&self) -> Result<Collaborators, ConfigError> {
        let timeout = self.branch_timeout();

        let api_key = get_env_var_required(&self.llm.api_key_env)?;
        let mut openai = OpenAiConfig {
            api_key,
            timeout,
            ..Default::default()
        };
        if let Some(base_url) = &self.llm.base_url {
            openai.base_url = base_url.trim_end_matches('/').to_string();
        }
        let provider =
            OpenAiProvider::new(openai).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        let mut classifier = LlmClassifier::new(Arc::new(provider), self.llm.model.clone())
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        if let Some(temperature) = self.llm.temperature {
            classifier = classifier.with_temperature(temperature);
        }

        let web: Arc<dyn WebSearch> = match std::env::var(&self.search.api_key_env) {
            Ok(api_key) if !api_key.is_empty() => {
                let mut config = SerperConfig {
                    api_key,
                    max_results: self.search.max_results,
                    timeout,
                    ..Default::default()
                };
                if let Some(base_url) = &self.search.base_url {
                    config.base_url = base_url.trim_end_matches('/').to_string();
                }
                Arc::new(
                    SerperWebSearch::new(config)
                        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?,
                )
            }
            _ => {
                warn!(env = %self.search.api_key_env, "No web search API key; web branch disabled");
                Arc::new(Unconfigured::new("web search"))
            }
        };

        let retriever: Arc<dyn Retriever> = match self.retrieval.http_config(timeout) {
            Some(config) => Arc::new(
                HttpRetriever::new(config).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?,
            ),
            None => {
                warn!("No retrieval service configured; policy branch disabled");
                Arc::new(Unconfigured::new("retrieval"))
            }
        };

        let orders: Arc<dyn OrderData> = match self.orders.http_config(timeout) {
            Some(config) => Arc::new(
                HttpOrderData::new(config).map_err(|e| ConfigError::InvalidConfig(e.to_string()))?,
            ),
            None => {
                warn!("No order service configured; order branch disabled");
                Arc::new(Unconfigured::new("order lookup"))
            }
        };

        let escalation: Arc<dyn EscalationSink> = match &self.escalation.webhook_url {
            Some(url) => Arc::new(
                WebhookEscalationSink::new(url.clone(), timeout)
                    .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?,
            ),
            None => Arc::new(LogEscalationSink),
        };

        info!(model = %self.llm.model, "Collaborators configured");
        Ok(Collaborators {
            classifier: Arc::new(classifier),
            retriever,
            orders,
            web,
            escalation,
        })
    }
}

impl ServiceSection {
    fn http_config(&self, timeout: Duration) -> Option<HttpBackendConfig> {
        let url = self.url.as_ref()?;
        let mut config = HttpBackendConfig::new(url.clone()).with_timeout(timeout);
        if let Some(api_key) = self
            .api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
        {
            config = config.with_api_key(api_key);
        }
        Some(config)
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidConfig(format!("{name} has an invalid value '{value}'"))
        }),
        Err(_) => Ok(None),
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidConfig(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidConfig(format!(
            "{field} must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(())
}

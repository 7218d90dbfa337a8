//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! Environment variables are process-global, so every test that loads a file or
//! touches the environment holds `ENV_LOCK`.

use omnihelp::config::{
    AppConfig, ConfigError, ENV_BRANCH_TIMEOUT_MS, ENV_CONFIDENCE_THRESHOLD, ENV_MAX_REROUTES,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tempfile::NamedTempFile;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_overrides() {
    for name in [ENV_CONFIDENCE_THRESHOLD, ENV_MAX_REROUTES, ENV_BRANCH_TIMEOUT_MS] {
        std::env::remove_var(name);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let _guard = env_lock();
    clear_overrides();

    let temp_file = write_config(
        r#"
[router]
confidence_threshold = 0.6
max_reroutes = 2

[branches]
timeout_ms = 5000

[llm]
provider = "openai"
model = "gpt-4o"
api_key_env = "OMNIHELP_TEST_LLM_KEY"

[orders]
url = "http://localhost:8002/query"
api_key_env = "OMNIHELP_TEST_ORDERS_KEY"
"#,
    );

    let config = AppConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.router.confidence_threshold, 0.6);
    assert_eq!(config.router.max_reroutes, 2);
    assert_eq!(config.branch_timeout(), Duration::from_millis(5000));
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.orders.url.as_deref(), Some("http://localhost:8002/query"));
    assert!(config.retrieval.url.is_none());
}

#[test]
fn test_shipped_sample_config_is_valid() {
    let _guard = env_lock();
    clear_overrides();

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/omnihelp.toml");
    let config = AppConfig::load_from_file(&path).unwrap();

    assert_eq!(config.orchestrator().max_reroutes, 3);
    assert!(config.escalation.webhook_url.is_some());
}

#[test]
fn test_missing_file_returns_file_read_error() {
    let _guard = env_lock();

    let result = AppConfig::load_from_file(std::path::Path::new("/nonexistent/omnihelp.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_returns_parse_error() {
    let _guard = env_lock();

    let temp_file = write_config("[router\nconfidence_threshold = ");
    let result = AppConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_out_of_range_threshold_is_rejected() {
    let _guard = env_lock();
    clear_overrides();

    let temp_file = write_config("[router]\nconfidence_threshold = 1.2\n");
    let result = AppConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_environment_overrides_file_values() {
    let _guard = env_lock();
    clear_overrides();
    std::env::set_var(ENV_CONFIDENCE_THRESHOLD, "0.85");
    std::env::set_var(ENV_MAX_REROUTES, "1");
    std::env::set_var(ENV_BRANCH_TIMEOUT_MS, "750");

    let temp_file = write_config("[router]\nconfidence_threshold = 0.5\nmax_reroutes = 4\n");
    let result = AppConfig::load_from_file(temp_file.path());
    clear_overrides();

    let config = result.unwrap();
    let orchestrator = config.orchestrator();
    assert_eq!(orchestrator.confidence_threshold, 0.85);
    assert_eq!(orchestrator.max_reroutes, 1);
    assert_eq!(orchestrator.branch_timeout, Duration::from_millis(750));
}

#[test]
fn test_unparseable_override_is_rejected() {
    let _guard = env_lock();
    clear_overrides();
    std::env::set_var(ENV_MAX_REROUTES, "many");

    let result = AppConfig::load(None);
    clear_overrides();

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_build_collaborators_requires_llm_key() {
    let _guard = env_lock();
    clear_overrides();
    std::env::remove_var("OMNIHELP_TEST_MISSING_KEY");

    let temp_file = write_config("[llm]\napi_key_env = \"OMNIHELP_TEST_MISSING_KEY\"\n");
    let config = AppConfig::load_from_file(temp_file.path()).unwrap();

    match config.build_collaborators() {
        Err(ConfigError::EnvVarNotFound(name)) => assert_eq!(name, "OMNIHELP_TEST_MISSING_KEY"),
        Err(other) => panic!("Expected EnvVarNotFound, got {other:?}"),
        Ok(_) => panic!("Expected EnvVarNotFound, got collaborators"),
    }
}

#[tokio::test]
async fn test_unconfigured_backends_fail_softly() {
    let collaborators = {
        let _guard = env_lock();
        clear_overrides();
        std::env::set_var("OMNIHELP_TEST_PRESENT_KEY", "sk-test");
        std::env::remove_var("OMNIHELP_TEST_NO_SEARCH_KEY");

        let temp_file = write_config(
            r#"
[llm]
api_key_env = "OMNIHELP_TEST_PRESENT_KEY"

[search]
api_key_env = "OMNIHELP_TEST_NO_SEARCH_KEY"
"#,
        );
        let config = AppConfig::load_from_file(temp_file.path()).unwrap();
        config.build_collaborators().unwrap()
    };

    assert!(collaborators.web.search("anything").await.is_err());
    assert!(collaborators.retriever.search("anything").await.is_err());
    assert!(collaborators.orders.execute("anything").await.is_err());
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = AppConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let parsed: AppConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed, config);
}

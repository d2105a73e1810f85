use logtriage_core::{ConfigError, ConfigManager, LogTriageConfig};
use serial_test::serial;
use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const ENV_KEYS: &[&str] = &[
    "JENKINS_URL",
    "JENKINS_USER",
    "JENKINS_API_TOKEN",
    "JENKINS_TIMEOUT",
    "LOG_MAX_BYTES_DEFAULT",
    "RATE_LIMIT_ENABLED",
    "RATE_LIMIT_PER_MINUTE",
    "RATE_LIMIT_BURST",
    "CACHE_ENABLED",
    "CACHE_TTL",
    "LOG_LEVEL",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_default_config_file_round_trips() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    ConfigManager::create_default_config(&config_path).unwrap();
    assert!(config_path.exists());

    let manager = ConfigManager::load_from(&config_path).unwrap();
    assert_eq!(manager.config_path(), Some(config_path.as_path()));
    assert_eq!(manager.config().cache.max_entries, 1000);
    assert_eq!(manager.config().flaky.default_window, 10);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[jenkins]
url = "https://file.example.com"
timeout_secs = 10

[cache]
enabled = false
"#,
    )
    .unwrap();

    std::env::set_var("JENKINS_URL", "https://env.example.com");
    std::env::set_var("CACHE_ENABLED", "true");
    std::env::set_var("CACHE_TTL", "60");
    std::env::set_var("RATE_LIMIT_PER_MINUTE", "120");

    let manager = ConfigManager::load_from(&config_path).unwrap();
    let config = manager.config();
    assert_eq!(config.jenkins.url, "https://env.example.com");
    assert_eq!(config.jenkins.timeout_secs, 10);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.rate_limit.per_minute, 120);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_is_ignored() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    ConfigManager::create_default_config(&config_path).unwrap();

    std::env::set_var("JENKINS_TIMEOUT", "soon");
    let manager = ConfigManager::load_from(&config_path).unwrap();
    assert_eq!(manager.config().jenkins.timeout_secs, 30);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_log_level_rejected() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[logging]\nlevel = \"chatty\"\n").unwrap();

    let err = ConfigManager::load_from(&config_path).err().unwrap();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
#[serial]
fn test_missing_file_reports_not_found() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let err = ConfigManager::load_from(&temp_dir.path().join("absent.toml"))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
#[serial]
fn test_render_masks_token() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[jenkins]\nurl = \"https://ci.example.com\"\nuser = \"bot\"\napi_token = \"s3cr3t\"\n",
    )
    .unwrap();

    let manager = ConfigManager::load_from(&config_path).unwrap();
    let rendered = manager.render_masked().unwrap();
    assert!(!rendered.contains("s3cr3t"));
    assert!(rendered.contains("********"));

    let reparsed: LogTriageConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed.jenkins.user.as_deref(), Some("bot"));
}

/// Shared buffer a test subscriber writes into.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
#[serial]
fn test_summary_can_be_logged_after_loading() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    ConfigManager::create_default_config(&config_path).unwrap();
    let manager = ConfigManager::load_from(&config_path).unwrap();

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || manager.log_summary());

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("Configuration loaded"));
    assert!(output.contains(&config_path.display().to_string()));
    assert!(output.contains("Jenkins URL not set"));
}

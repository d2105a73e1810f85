use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for LogTriage
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogTriageConfig {
    /// Jenkins connection settings
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    /// Log retrieval and summarization settings
    #[serde(default)]
    pub logs: LogsConfig,

    /// Flaky test detection window
    #[serde(default)]
    pub flaky: FlakyConfig,

    /// Per-caller request limits
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JenkinsConfig {
    /// Base URL, e.g. "https://ci.example.com"
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub user: Option<String>,

    /// API token paired with `user` for basic auth
    #[serde(default)]
    pub api_token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_jenkins_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: None,
            api_token: None,
            timeout_secs: default_jenkins_timeout_secs(),
        }
    }
}

impl JenkinsConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Byte budget when a caller does not pass `max_bytes`
    #[serde(default = "default_max_bytes")]
    pub max_bytes_default: u64,

    /// Tail length when a caller does not pass `tail_lines`
    #[serde(default = "default_tail_lines")]
    pub tail_lines_default: usize,

    /// Upper bound on one log round trip in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_error_keywords")]
    pub error_keywords: Vec<String>,

    #[serde(default = "default_warning_keywords")]
    pub warning_keywords: Vec<String>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_bytes_default: default_max_bytes(),
            tail_lines_default: default_tail_lines(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            error_keywords: default_error_keywords(),
            warning_keywords: default_warning_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlakyConfig {
    /// Tests observed fewer times are reported as insufficient data
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    /// Number of recent builds inspected when the caller omits a window
    #[serde(default = "default_window")]
    pub default_window: usize,

    #[serde(default = "default_max_window")]
    pub max_window: usize,
}

impl Default for FlakyConfig {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            default_window: default_window(),
            max_window: default_max_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Interval between sweeps of idle caller buckets
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: default_per_minute(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false, // Opt-in
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the log file written while serving over stdio
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Configured directory, or `~/.logtriage/logs`, or `.logtriage/logs`.
    pub fn resolved_log_dir(&self) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .map(|home| home.join(".logtriage").join("logs"))
            .unwrap_or_else(|| PathBuf::from(".logtriage").join("logs"))
    }
}

// Default value functions
fn default_jenkins_timeout_secs() -> u64 {
    30
}
fn default_max_bytes() -> u64 {
    262_144
}
fn default_tail_lines() -> usize {
    50
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_error_keywords() -> Vec<String> {
    vec!["error".to_string(), "fatal".to_string()]
}
fn default_warning_keywords() -> Vec<String> {
    vec!["warning".to_string(), "warn".to_string()]
}
fn default_min_observations() -> usize {
    5
}
fn default_window() -> usize {
    10
}
fn default_max_window() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_per_minute() -> u32 {
    60
}
fn default_burst() -> u32 {
    10
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_max_entries() -> usize {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

const LOCAL_CONFIG_FILE: &str = ".logtriage.toml";

/// Configuration manager
pub struct ConfigManager {
    config: LogTriageConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration: environment > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading LogTriage configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        Self::log_loaded(&config, config_path.as_deref());
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        Self::log_loaded(&config, Some(path));
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn log_loaded(config: &LogTriageConfig, path: Option<&Path>) {
        info!("Configuration loaded");
        match path {
            Some(path) => info!("   Config file: {}", path.display()),
            None => info!("   Config file: NONE (using defaults)"),
        }
        if config.jenkins.is_configured() {
            info!("   Jenkins: {}", config.jenkins.url);
        } else {
            warn!("   Jenkins URL not set (JENKINS_URL)");
        }
        info!(
            "   Rate limit: {}",
            if config.rate_limit.enabled {
                format!(
                    "{}/min, burst {}",
                    config.rate_limit.per_minute, config.rate_limit.burst
                )
            } else {
                "disabled".to_string()
            }
        );
        info!(
            "   Cache: {}",
            if config.cache.enabled {
                format!("ttl {}s", config.cache.ttl_secs)
            } else {
                "disabled".to_string()
            }
        );
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".logtriage.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .logtriage.env: {}", e);
                } else {
                    info!("Loaded .logtriage.env from home directory");
                }
            }
        }
    }

    fn load_config_file() -> Result<(LogTriageConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((LogTriageConfig::default(), None))
    }

    /// `~/.logtriage/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".logtriage").join("config.toml"))
    }

    fn read_toml_file(path: &Path) -> Result<LogTriageConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: LogTriageConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    fn apply_env_overrides(mut config: LogTriageConfig) -> LogTriageConfig {
        // Jenkins
        if let Ok(url) = std::env::var("JENKINS_URL") {
            config.jenkins.url = url;
        }
        if let Ok(user) = std::env::var("JENKINS_USER") {
            config.jenkins.user = Some(user);
        }
        if let Ok(token) = std::env::var("JENKINS_API_TOKEN") {
            config.jenkins.api_token = Some(token);
        }
        if let Ok(timeout) = std::env::var("JENKINS_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                config.jenkins.timeout_secs = secs;
            }
        }

        // Logs
        if let Ok(max_bytes) = std::env::var("LOG_MAX_BYTES_DEFAULT") {
            if let Ok(n) = max_bytes.parse() {
                config.logs.max_bytes_default = n;
            }
        }
        if let Ok(tail) = std::env::var("LOG_TAIL_LINES_DEFAULT") {
            if let Ok(n) = tail.parse() {
                config.logs.tail_lines_default = n;
            }
        }

        // Rate limiting
        if let Ok(enabled) = std::env::var("RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = parse_flag(&enabled);
        }
        if let Ok(per_minute) = std::env::var("RATE_LIMIT_PER_MINUTE") {
            if let Ok(n) = per_minute.parse() {
                config.rate_limit.per_minute = n;
            }
        }
        if let Ok(burst) = std::env::var("RATE_LIMIT_BURST") {
            if let Ok(n) = burst.parse() {
                config.rate_limit.burst = n;
            }
        }

        // Cache
        if let Ok(enabled) = std::env::var("CACHE_ENABLED") {
            config.cache.enabled = parse_flag(&enabled);
        }
        if let Ok(ttl) = std::env::var("CACHE_TTL") {
            if let Ok(secs) = ttl.parse() {
                config.cache.ttl_secs = secs;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        config
    }

    pub fn validate_config(config: &LogTriageConfig) -> Result<(), ConfigError> {
        let url = config.jenkins.url.trim();
        if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid Jenkins URL: {}. Must start with http:// or https://",
                url
            )));
        }
        if config.jenkins.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "jenkins.timeout_secs must be greater than zero".to_string(),
            ));
        }

        if config.logs.max_bytes_default == 0 {
            return Err(ConfigError::ValidationError(
                "logs.max_bytes_default must be greater than zero".to_string(),
            ));
        }
        if config.logs.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "logs.fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if config.flaky.min_observations < 2 {
            return Err(ConfigError::ValidationError(
                "flaky.min_observations must be at least 2".to_string(),
            ));
        }
        if config.flaky.default_window > config.flaky.max_window {
            return Err(ConfigError::ValidationError(format!(
                "flaky.default_window ({}) exceeds flaky.max_window ({})",
                config.flaky.default_window, config.flaky.max_window
            )));
        }

        if config.rate_limit.enabled
            && (config.rate_limit.per_minute == 0 || config.rate_limit.burst == 0)
        {
            return Err(ConfigError::ValidationError(
                "rate_limit.per_minute and rate_limit.burst must be greater than zero".to_string(),
            ));
        }

        if config.cache.enabled && (config.cache.ttl_secs == 0 || config.cache.max_entries == 0) {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs and cache.max_entries must be greater than zero".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &LogTriageConfig {
        &self.config
    }

    /// Log the loaded summary again, e.g. once a file subscriber is installed.
    pub fn log_summary(&self) {
        Self::log_loaded(&self.config, self.config_path.as_deref());
    }

    pub fn into_config(self) -> LogTriageConfig {
        self.config
    }

    /// Path of the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Effective configuration as TOML with the API token masked
    pub fn render_masked(&self) -> Result<String, ConfigError> {
        let mut shown = self.config.clone();
        if shown.jenkins.api_token.is_some() {
            shown.jenkins.api_token = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = LogTriageConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

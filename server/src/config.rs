use std::{env, path::Path, path::PathBuf, time::Duration};

use chrono::NaiveTime;
use config::{Config, File};
use oracle_core::{contract::parse_address, retry::RetryPolicy, signer::validate_and_format_private_key};
use oracle_executors::SubmissionConfig;
use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("{0}")]
    Environment(String),

    #[error("Invalid configuration for `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainConfig {
    /// Primary endpoint first. Accepts a list or a comma-separated string so it can be set from one env var.
    #[serde(deserialize_with = "list_or_comma_separated")]
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    pub contract_function: String,
    pub chain_id: u64,
    pub block_explorer_url: String,
    #[serde(default = "default_tx_timeout_seconds")]
    pub tx_timeout_seconds: u64,
    pub abi_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub output_dir: PathBuf,
    /// Days to keep dated output directories. Negative disables pruning.
    pub max_age_before_deletion: i64,
    pub lookback_days: i64,
    pub input_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// `HH:MM`, UTC.
    pub scheduled_run_time: String,
    pub run_on_startup: bool,
    pub last_run_file: PathBuf,
    pub healthcheck_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub window_minutes: i64,
    pub log_file: PathBuf,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    pub private_key: String,
    pub slack_webhook_url: Option<String>,
}

impl std::fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("private_key", &"<redacted>")
            .field(
                "slack_webhook_url",
                &self.slack_webhook_url.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn default_tx_timeout_seconds() -> u64 {
    30
}

fn default_batch_size() -> usize {
    125
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/output".into(),
            max_age_before_deletion: 120,
            lookback_days: 28,
            input_path: "data/input/eligibility.csv".into(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            scheduled_run_time: "10:00".into(),
            run_on_startup: false,
            last_run_file: "data/last_run.txt".into(),
            healthcheck_file: "healthcheck".into(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window_minutes: 60,
            log_file: "data/circuit_breaker.log".into(),
        }
    }
}

fn list_or_comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        String(String),
    }

    Ok(match ListOrString::deserialize(deserializer)? {
        ListOrString::List(urls) => urls,
        ListOrString::String(joined) => joined.split(',').map(str::to_string).collect(),
    })
}

impl OracleConfig {
    /// Trimmed endpoint URLs with blanks removed, in configured order.
    pub fn rpc_urls(&self) -> Vec<String> {
        self.blockchain
            .rpc_urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn scheduled_run_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_run_time(&self.scheduling.scheduled_run_time)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_urls().is_empty() {
            return Err(invalid(
                "blockchain.rpc_urls",
                "at least one RPC provider URL is required",
            ));
        }

        parse_address(&self.blockchain.contract_address)
            .map_err(|e| invalid("blockchain.contract_address", e.to_string()))?;

        if self.blockchain.contract_function.trim().is_empty() {
            return Err(invalid("blockchain.contract_function", "must not be empty"));
        }

        if self.blockchain.batch_size == 0 {
            return Err(invalid("blockchain.batch_size", "must be a positive integer"));
        }

        self.scheduled_run_time()?;

        if self.secrets.private_key.trim().is_empty() {
            return Err(invalid("secrets.private_key", "is required"));
        }
        validate_and_format_private_key(&self.secrets.private_key)
            .map_err(|e| invalid("secrets.private_key", e.to_string()))?;

        Ok(())
    }

    /// Engine inputs derived from the `blockchain` section.
    pub fn submission_config(&self) -> Result<SubmissionConfig, ConfigError> {
        let contract_address = parse_address(&self.blockchain.contract_address)
            .map_err(|e| invalid("blockchain.contract_address", e.to_string()))?;

        Ok(SubmissionConfig {
            rpc_urls: self.rpc_urls(),
            contract_address,
            abi_path: self.blockchain.abi_path.clone(),
            block_explorer_url: self.blockchain.block_explorer_url.clone(),
            tx_timeout: Duration::from_secs(self.blockchain.tx_timeout_seconds),
            retry_policy: RetryPolicy::rpc(),
        })
    }
}

pub fn parse_run_time(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
        invalid(
            "scheduling.scheduled_run_time",
            format!("`{raw}` is not a valid HH:MM time"),
        )
    })
}

/// Load `oracle_base.toml`, then `oracle_{environment}.toml`, then `APP__*` environment variables.
pub fn load_config(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<OracleConfig, ConfigError> {
    let environment_filename = format!("oracle_{}.toml", environment.as_str());

    let config = Config::builder()
        .add_source(File::from(configuration_directory.join("oracle_base.toml")))
        .add_source(File::from(configuration_directory.join(environment_filename)).required(false))
        .add_source(config::Environment::with_prefix("app").separator("__"))
        .build()?;

    Ok(config.try_deserialize::<OracleConfig>()?)
}

pub fn get_config() -> Result<OracleConfig, ConfigError> {
    let base_path = env::current_dir()
        .map_err(|e| ConfigError::Load(format!("Failed to determine the current directory: {e}")))?;
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Environment)?;

    load_config(&configuration_directory, &environment)
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{other} is not a supported environment. Use either `local`, `development`, or `production`."
            )),
        }
    }
}

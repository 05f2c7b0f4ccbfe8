//! Configuration management
//!
//! This module handles loading and parsing configuration for the sitedesk service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Missing
//! credentials never abort startup; they are reported through
//! [`Config::missing_required`] and [`Config::missing_optional`] so the
//! caller can log them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Document store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Mail relay configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Bot-check verifier configuration
    #[serde(default)]
    pub verifier: VerifierConfig,
    /// Newsletter CRM configuration
    #[serde(default)]
    pub crm: CrmConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin, `*` allows any origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "*".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Seconds a single store session may run before it is abandoned
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_timeout_secs(),
            operation_timeout_secs: default_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

fn default_database_url() -> String {
    "data/sitedesk.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_timeout_secs() -> u64 {
    10
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Mail relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// SMTP relay port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// Relay account, also the sender address
    #[serde(default)]
    pub username: Option<String>,
    /// Relay password
    #[serde(default)]
    pub password: Option<String>,
    /// Display name on outgoing mail
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Where contact requests and comment alerts go (defaults to `username`)
    #[serde(default)]
    pub operator_address: Option<String>,
    /// Seconds a single send may take
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_name: default_from_name(),
            operator_address: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MailConfig {
    /// Address that receives operator notifications
    pub fn operator(&self) -> Option<&str> {
        self.operator_address
            .as_deref()
            .or(self.username.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Personal website".to_string()
}

/// reCAPTCHA verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Verification endpoint
    #[serde(default = "default_verifier_endpoint")]
    pub endpoint: String,
    /// Server-side secret
    #[serde(default)]
    pub secret: Option<String>,
    /// Seconds per outbound attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_verifier_endpoint(),
            secret: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_verifier_endpoint() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_max_retries() -> u32 {
    1
}

/// MailBluster CRM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Lead registration endpoint
    #[serde(default = "default_crm_endpoint")]
    pub endpoint: String,
    /// API key sent as the `Authorization` header
    #[serde(default)]
    pub api_key: Option<String>,
    /// Seconds per outbound attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_crm_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_crm_endpoint() -> String {
    "https://api.mailbluster.com/api/leads".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `SITEDESK_<SECTION>_<KEY>`:
    /// - SITEDESK_SERVER_HOST, SITEDESK_SERVER_PORT, SITEDESK_SERVER_CORS_ORIGIN
    /// - SITEDESK_DATABASE_DRIVER, SITEDESK_DATABASE_URL
    /// - SITEDESK_MAIL_SMTP_HOST, SITEDESK_MAIL_USERNAME, SITEDESK_MAIL_PASSWORD,
    ///   SITEDESK_MAIL_OPERATOR_ADDRESS
    /// - SITEDESK_VERIFIER_SECRET
    /// - SITEDESK_CRM_API_KEY
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("SITEDESK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SITEDESK_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("SITEDESK_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("SITEDESK_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SITEDESK_DATABASE_URL") {
            self.database.url = url;
        }

        // Mail configuration
        if let Ok(host) = std::env::var("SITEDESK_MAIL_SMTP_HOST") {
            self.mail.smtp_host = host;
        }
        if let Ok(username) = std::env::var("SITEDESK_MAIL_USERNAME") {
            self.mail.username = Some(username);
        }
        if let Ok(password) = std::env::var("SITEDESK_MAIL_PASSWORD") {
            self.mail.password = Some(password);
        }
        if let Ok(operator) = std::env::var("SITEDESK_MAIL_OPERATOR_ADDRESS") {
            self.mail.operator_address = Some(operator);
        }

        // Third-party credentials
        if let Ok(secret) = std::env::var("SITEDESK_VERIFIER_SECRET") {
            self.verifier.secret = Some(secret);
        }
        if let Ok(api_key) = std::env::var("SITEDESK_CRM_API_KEY") {
            self.crm.api_key = Some(api_key);
        }
    }

    /// Credentials the service needs for its core routes but which are unset
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.mail.username) {
            missing.push("SITEDESK_MAIL_USERNAME");
        }
        if is_blank(&self.mail.password) {
            missing.push("SITEDESK_MAIL_PASSWORD");
        }
        if self.database.url.trim().is_empty() {
            missing.push("SITEDESK_DATABASE_URL");
        }
        missing
    }

    /// Credentials only the third-party routes need
    pub fn missing_optional(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.crm.api_key) {
            missing.push("SITEDESK_CRM_API_KEY");
        }
        if is_blank(&self.verifier.secret) {
            missing.push("SITEDESK_VERIFIER_SECRET");
        }
        missing
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

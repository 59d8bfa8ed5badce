//! Application settings and configuration
//!
//! This module provides configuration management for the application,
//! loading settings from environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Retry policy applied by the procedure bases
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; 0 retries immediately
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomize each delay between 1x and 2x
    pub jitter: bool,
    /// Also retry unauthorized/validation/not-found failures
    pub retry_deterministic_errors: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 2_000,
            jitter: true,
            retry_deterministic_errors: false,
        }
    }
}

/// CORS policy shared by every transport
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsSettings {
    pub origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age_seconds: u64,
    pub credentials: bool,
}

impl CorsSettings {
    /// Build the policy from a comma-separated origin list
    pub fn from_origin_list(origins: &str) -> Self {
        Self {
            origins: origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            ..Self::default()
        }
    }
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: vec!["http://localhost:3000".to_string()],
            allow_methods: ["POST", "GET", "PUT", "DELETE", "OPTIONS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allow_headers: ["Content-Type", "Authorization", "x-orpc-batch"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            expose_headers: vec!["Content-Length".to_string()],
            max_age_seconds: 600,
            credentials: true,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,
    /// Public base URL, advertised in the OpenAPI document
    pub server_url: Option<String>,

    // Database
    #[serde(skip_serializing)]
    pub database_url: String,
    pub database_max_connections: u32,

    // Auth service
    pub auth_service_url: String,
    pub auth_timeout_seconds: u64,

    // Error reporting ingest endpoint; logs only when unset
    #[serde(skip_serializing)]
    pub error_reporting_url: Option<String>,

    pub cors: CorsSettings,
    pub retry: RetrySettings,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let defaults = RetrySettings::default();

        let settings = Self {
            // App settings
            app_name: env_or_default("APP_NAME", "starter-api"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .context("Invalid ENVIRONMENT value")?,
            log_level: env_or_default("LOG_LEVEL", "info"),

            // Server settings
            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "3001")
                .parse()
                .context("Invalid PORT value")?,
            server_url: env::var("SERVER_URL").ok(),

            // Database
            database_url: env_or_default("DATABASE_URL", "postgres://localhost:5432/starter"),
            database_max_connections: env_or_default("DATABASE_MAX_CONNECTIONS", "100")
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS value")?,

            // Auth service
            auth_service_url: env_or_default("AUTH_SERVICE_URL", "http://localhost:3002"),
            auth_timeout_seconds: env_or_default("AUTH_TIMEOUT_SECS", "10")
                .parse()
                .unwrap_or(10),

            error_reporting_url: env::var("ERROR_REPORTING_URL").ok(),

            cors: CorsSettings::from_origin_list(&env_or_default(
                "CORS_ORIGIN",
                "http://localhost:3000",
            )),

            retry: RetrySettings {
                max_attempts: env_or_default("RETRY_MAX_ATTEMPTS", "3")
                    .parse()
                    .context("Invalid RETRY_MAX_ATTEMPTS value")?,
                initial_delay_ms: env_or_default("RETRY_INITIAL_DELAY_MS", "0")
                    .parse()
                    .unwrap_or(defaults.initial_delay_ms),
                max_delay_ms: env_or_default("RETRY_MAX_DELAY_MS", "2000")
                    .parse()
                    .unwrap_or(defaults.max_delay_ms),
                jitter: env_or_default("RETRY_JITTER", "true")
                    .parse()
                    .unwrap_or(defaults.jitter),
                retry_deterministic_errors: env_or_default("RETRY_DETERMINISTIC_ERRORS", "false")
                    .parse()
                    .unwrap_or(false),
            },
        };

        // Validate settings
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.cors.origins.is_empty() {
            anyhow::bail!("CORS_ORIGIN must list at least one origin");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be >= 1");
        }

        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL cannot be empty");
        }

        if self.auth_service_url.trim().is_empty() {
            anyhow::bail!("AUTH_SERVICE_URL cannot be empty");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be > 0");
        }

        if self.is_production() && self.error_reporting_url.is_none() {
            tracing::warn!("Running in production without an error reporting endpoint");
        }

        Ok(())
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL advertised to API clients
    pub fn public_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "starter-api".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3001,
            server_url: None,
            database_url: "postgres://localhost:5432/starter".to_string(),
            database_max_connections: 100,
            auth_service_url: "http://localhost:3002".to_string(),
            auth_timeout_seconds: 10,
            error_reporting_url: None,
            cors: CorsSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::types::Operator;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running with `SKIP_EXTERNALS=true`
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub workers: WorkerConfig,
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Mobile-money gateway configuration.
///
/// Merchant codes are static per operator. Session tokens are runtime state and
/// live in the token store instead.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// `service` form field sent with every request
    pub service: String,
    pub airtel_merchant_code: Option<String>,
    pub moov_merchant_code: Option<String>,
    /// `operateur` form field per network
    pub airtel_channel: String,
    pub moov_channel: String,
    pub request_timeout_secs: u64,
    /// `nombre_jours` sent with status queries
    pub status_lookback_days: u32,
}

/// Background worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stock_resume_enabled: bool,
    pub stock_resume_interval_secs: u64,
    pub stock_resume_max_attempts: i32,
    pub stock_resume_batch_size: i64,
    pub status_poll_enabled: bool,
    pub status_poll_interval_secs: u64,
    /// Minimum age of a PENDING payment before the gateway is asked about it
    pub status_poll_grace_secs: i64,
    /// Status queries per payment, counted on the payment row
    pub status_poll_max_attempts: i32,
    pub status_poll_batch_size: i64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = parse_bool("SKIP_EXTERNALS", false)?;
        let database = if skip_externals {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            workers: WorkerConfig::from_env()?,
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.gateway.validate()?;
        self.workers.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 8000)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT cannot be 0".to_string()));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("HOST cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: parse_or("DB_MIN_CONNECTIONS", 5)?,
            connection_timeout: parse_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: parse_bool("DB_RUN_MIGRATIONS", true)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            base_url: env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9090/gateway".to_string()),
            service: env::var("GATEWAY_SERVICE").unwrap_or_else(|_| "REST".to_string()),
            airtel_merchant_code: non_empty_var("AIRTEL_MERCHANT_CODE"),
            moov_merchant_code: non_empty_var("MOOV_MERCHANT_CODE"),
            airtel_channel: env::var("AIRTEL_CHANNEL").unwrap_or_else(|_| "AM".to_string()),
            moov_channel: env::var("MOOV_CHANNEL").unwrap_or_else(|_| "MC".to_string()),
            request_timeout_secs: parse_or("GATEWAY_TIMEOUT_SECS", 30)?,
            status_lookback_days: parse_or("GATEWAY_STATUS_LOOKBACK_DAYS", 1)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GATEWAY_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string()));
        }

        // A missing merchant code only disables that operator
        Ok(())
    }

    pub fn merchant_code(&self, operator: Operator) -> Option<&str> {
        match operator {
            Operator::Airtel => self.airtel_merchant_code.as_deref(),
            Operator::Moov => self.moov_merchant_code.as_deref(),
        }
    }

    pub fn channel(&self, operator: Operator) -> &str {
        match operator {
            Operator::Airtel => &self.airtel_channel,
            Operator::Moov => &self.moov_channel,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090/gateway".to_string(),
            service: "REST".to_string(),
            airtel_merchant_code: None,
            moov_merchant_code: None,
            airtel_channel: "AM".to_string(),
            moov_channel: "MC".to_string(),
            request_timeout_secs: 30,
            status_lookback_days: 1,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WorkerConfig {
            stock_resume_enabled: parse_bool("STOCK_RESUME_ENABLED", true)?,
            stock_resume_interval_secs: parse_or("STOCK_RESUME_INTERVAL_SECS", 60)?,
            stock_resume_max_attempts: parse_or("STOCK_RESUME_MAX_ATTEMPTS", 5)?,
            stock_resume_batch_size: parse_or("STOCK_RESUME_BATCH_SIZE", 50)?,
            status_poll_enabled: parse_bool("STATUS_POLL_ENABLED", true)?,
            status_poll_interval_secs: parse_or("STATUS_POLL_INTERVAL_SECS", 120)?,
            status_poll_grace_secs: parse_or("STATUS_POLL_GRACE_SECS", 300)?,
            status_poll_max_attempts: parse_or("STATUS_POLL_MAX_ATTEMPTS", 10)?,
            status_poll_batch_size: parse_or("STATUS_POLL_BATCH_SIZE", 50)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stock_resume_interval_secs == 0 || self.status_poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "worker intervals must be greater than 0".to_string(),
            ));
        }

        if self.stock_resume_batch_size <= 0 || self.status_poll_batch_size <= 0 {
            return Err(ConfigError::InvalidValue(
                "worker batch sizes must be greater than 0".to_string(),
            ));
        }

        if self.stock_resume_max_attempts <= 0 {
            return Err(ConfigError::InvalidValue(
                "STOCK_RESUME_MAX_ATTEMPTS".to_string(),
            ));
        }

        if self.status_poll_max_attempts <= 0 {
            return Err(ConfigError::InvalidValue(
                "STATUS_POLL_MAX_ATTEMPTS".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stock_resume_enabled: true,
            stock_resume_interval_secs: 60,
            stock_resume_max_attempts: 5,
            stock_resume_batch_size: 50,
            status_poll_enabled: true,
            status_poll_interval_secs: 120,
            status_poll_grace_secs: 300,
            status_poll_max_attempts: 10,
            status_poll_batch_size: 50,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string())),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

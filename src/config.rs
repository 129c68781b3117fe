use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 15;

/// Payment gateway settings for hosted-checkout sessions.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentConfig {
    /// Base URL of the gateway API.
    #[serde(default = "default_payment_api_url")]
    pub api_url: String,

    /// Gateway secret key, sent as a bearer token.
    pub secret_key: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// URL the gateway calls back after payment.
    pub callback_url: String,

    /// URL the shopper is returned to after checkout.
    pub return_url: String,

    /// Upper bound on the checkout-session request. The creation
    /// transaction stays open for the duration of this call, so keep it
    /// short.
    #[serde(default = "default_payment_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_payment_api_url() -> String {
    "https://api.paychangu.com".to_string()
}

fn default_currency() -> String {
    "MWK".to_string()
}

fn default_payment_timeout_secs() -> u64 {
    DEFAULT_PAYMENT_TIMEOUT_SECS
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL.
    pub database_url: String,

    /// Maximum database pool size.
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// JWT signing secret (minimum 32 characters).
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds.
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Server host address.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON instead of human-readable lines.
    #[serde(default)]
    pub log_json: bool,

    /// Create tables on startup when they do not exist. Intended for
    /// development and sqlite deployments.
    #[serde(default)]
    pub auto_migrate: bool,

    #[validate]
    pub payment: PaymentConfig,
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_jwt_expiration() -> usize {
    3600
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/default`, `config/<env>` and
/// `APP__`-prefixed environment variables, in increasing precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret and payment.secret_key have no defaults on purpose; they
    // must come from a config file or the environment.
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET with a secure random string (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            db_max_connections: default_db_max_connections(),
            jwt_secret: "a".repeat(32),
            jwt_expiration: default_jwt_expiration(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            payment: PaymentConfig {
                api_url: default_payment_api_url(),
                secret_key: "sec-test".into(),
                currency: default_currency(),
                callback_url: "http://localhost:8080/customer/orders".into(),
                return_url: "http://localhost:3000/orders".into(),
                timeout_secs: default_payment_timeout_secs(),
            },
        }
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let mut cfg = valid_config();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }
}

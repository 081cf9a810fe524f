use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: usize,

    /// Secret used to sign the guest cart cookie
    #[validate(length(min = 32))]
    pub cookie_secret: String,

    /// Guest cart cookie lifetime in seconds
    #[serde(default = "default_cart_cookie_max_age_secs")]
    pub cart_cookie_max_age_secs: u64,

    /// Mark cookies as Secure (set in production)
    #[serde(default)]
    pub cookie_secure: bool,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used to build payment redirect URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup (dev/test convenience)
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Default currency for new orders
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Shipping: order subtotal (minor units) at which shipping is free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: i64,

    /// Shipping: flat rate below the free threshold (minor units)
    #[serde(default = "default_flat_shipping_rate")]
    pub flat_shipping_rate: i64,

    /// Shipping: surcharge for non-domestic destinations (minor units)
    #[serde(default = "default_international_surcharge")]
    pub international_surcharge: i64,

    /// Shipping: ISO country code treated as domestic
    #[serde(default = "default_domestic_country")]
    pub domestic_country: String,

    /// Stripe API secret key
    #[serde(default)]
    pub stripe_secret_key: String,

    /// PayPal API base URL (sandbox by default)
    #[serde(default = "default_paypal_api_base")]
    pub paypal_api_base: String,

    /// PayPal client credentials
    #[serde(default)]
    pub paypal_client_id: String,
    #[serde(default)]
    pub paypal_secret: String,
}

impl AppConfig {
    /// Construct a configuration programmatically (used by tests).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        jwt_secret: String,
        cookie_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            cookie_secret,
            cart_cookie_max_age_secs: default_cart_cookie_max_age_secs(),
            cookie_secure: false,
            host,
            port,
            base_url: default_base_url(),
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_currency: default_currency(),
            free_shipping_threshold: default_free_shipping_threshold(),
            flat_shipping_rate: default_flat_shipping_rate(),
            international_surcharge: default_international_surcharge(),
            domestic_country: default_domestic_country(),
            stripe_secret_key: String::new(),
            paypal_api_base: default_paypal_api_base(),
            paypal_client_id: String::new(),
            paypal_secret: String::new(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn default_jwt_expiration() -> usize {
    3600
}
fn default_cart_cookie_max_age_secs() -> u64 {
    30 * 24 * 60 * 60
}
fn default_port() -> u16 {
    8080
}
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_free_shipping_threshold() -> i64 {
    10_000
}
fn default_flat_shipping_rate() -> i64 {
    1_500
}
fn default_international_surcharge() -> i64 {
    1_000
}
fn default_domestic_country() -> String {
    "US".to_string()
}
fn default_paypal_api_base() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
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

    // jwt_secret and cookie_secret have no defaults - they MUST be provided via
    // environment variables or config files so insecure defaults never reach production.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for secret in ["jwt_secret", "cookie_secret"] {
        if config.get_string(secret).is_err() {
            error!(
                "{} is not configured. Set APP__{} with a secure random string.",
                secret,
                secret.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{} is required but not configured",
                secret
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "test_jwt_secret_that_is_at_least_32_chars".into(),
            "test_cookie_secret_that_is_32_chars_long".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        )
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = base_config();
        assert_eq!(cfg.cart_cookie_max_age_secs, 30 * 24 * 60 * 60);
        assert_eq!(cfg.default_currency, "USD");
        assert_eq!(cfg.free_shipping_threshold, 10_000);
        assert_eq!(cfg.flat_shipping_rate, 1_500);
        assert_eq!(cfg.domestic_country, "US");
        assert!(!cfg.is_production());
    }

    #[test]
    fn validation_rejects_short_secrets() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".into();
        assert!(cfg.validate().is_err());
    }
}

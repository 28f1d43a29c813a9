use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_ORDER_NUMBER_PREFIX: &str = "ORD";
const DEFAULT_ORDER_NUMBER_ATTEMPTS: u32 = 5;
const DEFAULT_GATEWAY_NAME: &str = "paystack";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_SIGNATURE_HEADER: &str = "x-gateway-signature";

/// What checkout does with a coupon that no longer validates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CouponCheckoutPolicy {
    /// Remove the coupon, recompute totals and continue.
    #[default]
    Drop,
    /// Fail the checkout with `CouponInvalid`.
    Reject,
}

/// Payment gateway settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentGatewayConfig {
    /// Gateway identifier recorded on every payment row
    #[serde(default = "default_gateway_name")]
    #[validate(length(min = 1))]
    pub name: String,

    /// Base URL of the gateway HTTP API
    #[serde(default = "default_gateway_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// Bearer secret key for gateway API calls
    #[serde(default)]
    pub secret_key: String,

    /// Shared secret for webhook signatures (falls back to `secret_key`)
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Header carrying the webhook signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Where the gateway redirects the shopper after payment
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Timeout for outbound gateway calls in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            base_url: default_gateway_base_url(),
            secret_key: String::new(),
            webhook_secret: None,
            signature_header: default_signature_header(),
            callback_url: None,
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

impl PaymentGatewayConfig {
    /// Secret used to verify webhook signatures.
    pub fn webhook_signing_secret(&self) -> &str {
        self.webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.secret_key)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout in seconds
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// DB idle timeout in seconds
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// DB acquire timeout in seconds
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Tax rate applied to the discounted subtotal (0.0 - 1.0)
    #[serde(default)]
    #[validate(custom = "validate_tax_rate")]
    pub default_tax_rate: f64,

    /// Currency code for carts and orders
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub default_currency: String,

    /// Handling of coupons that fail re-validation at checkout
    #[serde(default)]
    pub coupon_checkout_policy: CouponCheckoutPolicy,

    /// Expose underlying causes in error responses
    #[serde(default)]
    pub debug_errors: bool,

    /// Prefix for generated order numbers
    #[serde(default = "default_order_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub order_number_prefix: String,

    /// Attempts at generating a unique order number before giving up
    #[serde(default = "default_order_number_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub order_number_attempts: u32,

    /// Buffer size of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Payment gateway
    #[serde(default)]
    #[validate]
    pub payment: PaymentGatewayConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the
    /// connection and listen address.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            default_tax_rate: 0.0,
            default_currency: default_currency(),
            coupon_checkout_policy: CouponCheckoutPolicy::default(),
            debug_errors: false,
            order_number_prefix: default_order_number_prefix(),
            order_number_attempts: default_order_number_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
            payment: PaymentGatewayConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Tax rate as a decimal, rounded to six places.
    pub fn tax_rate(&self) -> Decimal {
        Decimal::from_f64(self.default_tax_rate)
            .map(|rate| rate.round_dp(6))
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_port() -> u16 {
    DEFAULT_PORT
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
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_order_number_prefix() -> String {
    DEFAULT_ORDER_NUMBER_PREFIX.to_string()
}

fn default_order_number_attempts() -> u32 {
    DEFAULT_ORDER_NUMBER_ATTEMPTS
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_gateway_name() -> String {
    DEFAULT_GATEWAY_NAME.to_string()
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_signature_header() -> String {
    DEFAULT_SIGNATURE_HEADER.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("default_tax_rate");
        err.message = Some("default_tax_rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_commerce={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads the application configuration from defaults, files and `APP__*`
/// environment variables.
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://commerce.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("coupon_checkout_policy", "drop")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    if app_config.is_production() && app_config.payment.webhook_signing_secret().is_empty() {
        let mut errors = validator::ValidationErrors::new();
        let mut err = ValidationError::new("payment_webhook_secret");
        err.message = Some("A webhook secret or gateway secret key is required in production".into());
        errors.add("payment", err);
        error!("Configuration validation failed: webhook secret missing");
        return Err(AppConfigError::Validation(errors));
    }

    info!("Configuration loaded successfully");
    Ok(app_config)
}

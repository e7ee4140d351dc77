use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
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
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.sandbox.paypal.com";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Rules for the loyalty coupon handed out after large orders
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CouponPolicy {
    /// Undiscounted subtotal at or above which a new coupon is issued
    #[serde(default = "default_coupon_threshold")]
    pub threshold: Decimal,

    /// Discount granted by an issued coupon, in percent
    #[serde(default = "default_coupon_discount")]
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: i32,

    /// Days until an issued coupon expires
    #[serde(default = "default_coupon_validity_days")]
    #[validate(range(min = 1))]
    pub validity_days: i64,

    /// Literal prefix of every generated code
    #[serde(default = "default_coupon_prefix")]
    #[validate(length(min = 1, max = 16))]
    pub code_prefix: String,
}

impl Default for CouponPolicy {
    fn default() -> Self {
        Self {
            threshold: default_coupon_threshold(),
            discount_percent: default_coupon_discount(),
            validity_days: default_coupon_validity_days(),
            code_prefix: default_coupon_prefix(),
        }
    }
}

/// Stripe API settings
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    /// Secret API key (`sk_...`)
    #[serde(default)]
    pub secret_key: String,

    /// Signing secret for `checkout.session.completed` webhooks
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default = "default_webhook_tolerance_secs")]
    pub webhook_tolerance_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base: default_stripe_api_base(),
            secret_key: String::new(),
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance_secs(),
        }
    }
}

/// PayPal REST API settings
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaypalConfig {
    #[serde(default = "default_paypal_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret key used to verify bearer tokens
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds for tokens issued by this service
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(custom = "validate_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
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

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Storefront URL used to build provider return/cancel links
    #[serde(default = "default_client_url")]
    pub client_url: String,

    /// Currency code for every checkout
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Timeout for calls to Stripe and PayPal
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub coupon: CouponPolicy,

    #[serde(default)]
    pub stripe: StripeConfig,

    #[serde(default)]
    pub paypal: PaypalConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration: 3600,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            client_url: default_client_url(),
            currency: default_currency(),
            provider_timeout_secs: default_provider_timeout_secs(),
            coupon: CouponPolicy::default(),
            stripe: StripeConfig::default(),
            paypal: PaypalConfig {
                api_base: default_paypal_api_base(),
                ..Default::default()
            },
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    /// Lower-case currency code as Stripe expects it
    pub fn stripe_currency(&self) -> String {
        self.currency.to_ascii_lowercase()
    }

    /// Return and cancel URLs handed to the payment providers
    pub fn purchase_success_url(&self) -> String {
        format!("{}/purchase-success", self.client_url.trim_end_matches('/'))
    }

    pub fn purchase_cancel_url(&self) -> String {
        format!("{}/purchase-cancel", self.client_url.trim_end_matches('/'))
    }

    /// Checks that cannot be expressed as field validators
    pub fn validate_additional_constraints(&self) -> Result<(), validator::ValidationErrors> {
        let mut errors = validator::ValidationErrors::new();
        if !self.is_development() && self.stripe.secret_key.is_empty() {
            errors.add("stripe", ValidationError::new("stripe_secret_key_required"));
        }
        let webhook_secret_missing = self
            .stripe
            .webhook_secret
            .as_deref()
            .map_or(true, |secret| secret.trim().is_empty());
        if !self.is_development() && webhook_secret_missing {
            errors.add(
                "stripe",
                ValidationError::new("stripe_webhook_secret_required"),
            );
        }
        if !self.is_development()
            && (self.paypal.client_id.is_empty() || self.paypal.client_secret.is_empty())
        {
            errors.add("paypal", ValidationError::new("paypal_credentials_required"));
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validate_environment(environment: &str) -> Result<(), ValidationError> {
    match environment {
        "development" | "test" | "staging" | "production" => Ok(()),
        _ => Err(ValidationError::new("unknown_environment")),
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
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

fn default_client_url() -> String {
    DEFAULT_CLIENT_URL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_paypal_api_base() -> String {
    DEFAULT_PAYPAL_API_BASE.to_string()
}

fn default_coupon_threshold() -> Decimal {
    dec!(200)
}

fn default_coupon_discount() -> i32 {
    10
}

fn default_coupon_validity_days() -> i64 {
    30
}

fn default_coupon_prefix() -> String {
    "GIFT".to_string()
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
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
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // jwt_secret has no default on purpose
    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

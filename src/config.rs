use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAIL_BACKENDS: [&str; 2] = ["smtp", "log"];

/// Directories holding the base64 image blobs, one per entity family.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    #[serde(default = "default_category_dir")]
    #[validate(length(min = 1))]
    pub category_dir: String,

    #[serde(default = "default_subcategory_dir")]
    #[validate(length(min = 1))]
    pub subcategory_dir: String,

    #[serde(default = "default_product_dir")]
    #[validate(length(min = 1))]
    pub product_dir: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            category_dir: default_category_dir(),
            subcategory_dir: default_subcategory_dir(),
            product_dir: default_product_dir(),
        }
    }
}

impl ImageConfig {
    /// Re-roots every image directory under `base`.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let join = |name: &str| base.join(name).to_string_lossy().into_owned();
        Self {
            category_dir: join("categories"),
            subcategory_dir: join("subcategories"),
            product_dir: join("products"),
        }
    }
}

/// Outbound mail settings used by the password reset flow
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    /// "smtp" delivers through the relay, "log" only records messages
    #[serde(default = "default_mail_backend")]
    #[validate(custom = "validate_mail_backend")]
    pub backend: String,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default = "default_from_address")]
    #[validate(email)]
    pub from_address: String,

    /// Optional blind copy of every reset message
    #[serde(default)]
    pub bcc_address: Option<String>,

    /// Base URL of the frontend page that handles password resets
    #[serde(default = "default_reset_link_base")]
    #[validate(url)]
    pub reset_link_base: String,

    /// Lifetime of a password reset token in seconds
    #[serde(default = "default_reset_token_ttl_secs")]
    #[validate(range(min = 60, max = 86400))]
    pub reset_token_ttl_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: default_mail_backend(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            bcc_address: None,
            reset_link_base: default_reset_link_base(),
            reset_token_ttl_secs: default_reset_token_ttl_secs(),
        }
    }
}

impl MailConfig {
    pub fn uses_smtp(&self) -> bool {
        self.backend.eq_ignore_ascii_case("smtp")
    }
}

/// Service settings, deserialized from the layered sources in [`load_config`].
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,

    /// HS256 signing key for session tokens
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Session lifetime in seconds
    #[validate(range(min = 300, max = 86400))]
    pub jwt_expiration: usize,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// `development` relaxes the CORS requirements
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "enabled")]
    pub auto_migrate: bool,

    /// Comma separated origins, e.g. `https://shop.example.com,https://admin.example.com`
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default)]
    pub cors_allow_credentials: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Request body cap in bytes; images travel inline as base64
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Put the bearer-token gate in front of the category, subcategory and product routes
    #[serde(default)]
    pub require_auth_for_catalog: bool,

    #[serde(default)]
    #[validate]
    pub images: ImageConfig,

    #[serde(default)]
    #[validate]
    pub mail: MailConfig,
}

impl AppConfig {
    /// Builds a configuration with every optional setting at its default.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        jwt_expiration: usize,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            max_body_size: default_max_body_size(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            require_auth_for_catalog: false,
            images: ImageConfig::default(),
            mail: MailConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEFAULT_ENV)
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_deref()
            .is_some_and(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
    }

    /// Permissive CORS is only used in development or when explicitly enabled.
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Rules spanning several fields, which the derive cannot express.
    fn check_cross_field_rules(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            errors.add("cors_allowed_origins", cors_origins_required());
        }

        let smtp_host_missing = self
            .mail
            .smtp_host
            .as_deref()
            .map_or(true, |host| host.trim().is_empty());
        if self.mail.uses_smtp() && smtp_host_missing {
            errors.add(
                "mail",
                rule(
                    "smtp_host_required",
                    "APP__MAIL__SMTP_HOST is required when mail.backend is smtp",
                ),
            );
        }

        if !self.is_development() && !self.mail.uses_smtp() {
            errors.add(
                "mail",
                rule(
                    "log_mail_backend_outside_development",
                    "mail.backend = log drops reset links; set APP__MAIL__BACKEND=smtp outside development",
                ),
            );
        }

        if self.db_min_connections > self.db_max_connections {
            errors.add(
                "db_min_connections",
                rule(
                    "db_pool_bounds",
                    "db_min_connections cannot exceed db_max_connections",
                ),
            );
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("could not load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

pub(crate) fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

pub(crate) fn cors_origins_required() -> ValidationError {
    rule(
        "cors_allowed_origins_required",
        "Outside development set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true",
    )
}

fn enabled() -> bool {
    true
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
    6
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_max_body_size() -> usize {
    50 * 1024 * 1024
}

fn default_auth_issuer() -> String {
    "catalog-api".to_string()
}

fn default_auth_audience() -> String {
    "catalog-clients".to_string()
}

fn default_category_dir() -> String {
    "images/categories".to_string()
}

fn default_subcategory_dir() -> String {
    "images/subcategories".to_string()
}

fn default_product_dir() -> String {
    "images/products".to_string()
}

fn default_mail_backend() -> String {
    "log".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "no-reply@localhost.localdomain".to_string()
}

fn default_reset_link_base() -> String {
    "http://localhost:3000/reset-password".to_string()
}

fn default_reset_token_ttl_secs() -> u64 {
    30 * 60
}

fn validate_mail_backend(value: &str) -> Result<(), ValidationError> {
    let value = value.to_ascii_lowercase();
    if MAIL_BACKENDS.contains(&value.as_str()) {
        Ok(())
    } else {
        Err(rule("mail_backend", "mail.backend must be smtp or log"))
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let level = level.to_ascii_lowercase();
    if LOG_LEVELS.contains(&level.as_str()) {
        Ok(())
    } else {
        Err(rule(
            "log_level",
            "log_level must be trace, debug, info, warn or error",
        ))
    }
}

/// Why `secret` is unfit for signing tokens, if it is.
fn weak_secret_reason(secret: &str) -> Option<&'static str> {
    const PLACEHOLDERS: [&str; 3] = [
        "CHANGE_THIS_SECRET_IN_PRODUCTION",
        "your-secret-key",
        "default-secret-key",
    ];
    const WEAK_FRAGMENTS: [&str; 4] = ["changeme", "password", "12345", "abcdef"];

    let secret = secret.trim();
    let lower = secret.to_ascii_lowercase();
    let distinct = secret.chars().collect::<HashSet<_>>().len();

    if secret.len() < 64 {
        Some("jwt_secret needs at least 64 characters")
    } else if PLACEHOLDERS.iter().any(|p| secret.eq_ignore_ascii_case(p)) {
        Some("jwt_secret is still a placeholder value")
    } else if distinct == 1 {
        Some("jwt_secret is one character repeated")
    } else if WEAK_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        Some("jwt_secret contains a guessable fragment")
    } else if distinct < 10 {
        Some("jwt_secret needs at least 10 distinct characters")
    } else {
        None
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    match weak_secret_reason(secret) {
        Some(reason) => Err(rule("jwt_secret", reason)),
        None => Ok(()),
    }
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("catalog_api={level},tower_http=debug"));

    let builder = fmt().with_env_filter(EnvFilter::new(directive));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Loads and validates configuration.
///
/// Later sources override earlier ones: built-in defaults, `config/default.toml`,
/// `config/{RUN_ENV or APP_ENV}.toml`, then `APP__*` environment variables
/// (`APP__MAIL__SMTP_HOST` sets `mail.smtp_host`).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(environment = %run_env, "Loading configuration");

    let layered = Config::builder()
        .set_default("database_url", "sqlite://catalog.db?mode=rwc")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // No built-in secret: refuse to start rather than sign with a known key.
    if layered.get_string("jwt_secret").is_err() {
        error!("APP__JWT_SECRET is not set");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret (set APP__JWT_SECRET to at least 64 random characters)".into(),
        )));
    }

    let app_config: AppConfig = layered.try_deserialize()?;
    validate_config(&app_config)?;

    info!("Configuration loaded");
    Ok(app_config)
}

/// Runs field validation followed by the cross-field checks.
pub fn validate_config(app_config: &AppConfig) -> Result<(), AppConfigError> {
    app_config
        .validate()
        .and_then(|()| app_config.check_cross_field_rules())
        .map_err(|e| {
            error!(errors = ?e, "Configuration rejected");
            AppConfigError::Validation(e)
        })
}

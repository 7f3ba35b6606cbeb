use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "development_only_jwt_secret_replace_me_before_deploying_anywhere_real";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL, used when a redis backed cache or limiter is selected
    pub redis_url: String,

    /// HS256 signing secret
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in seconds (5min - 24h)
    #[validate(range(min = 300, max = 86400))]
    pub jwt_expiration_secs: u64,

    /// Refresh token lifetime in seconds (1h - 30d)
    #[validate(range(min = 3600, max = 2592000))]
    pub refresh_token_expiration_secs: u64,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// How long a user's token revocation cut-off is trusted before it is
    /// read from the database again
    #[serde(default = "default_revocation_cache_ttl_secs")]
    pub revocation_cache_ttl_secs: u64,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
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

    /// "in-memory" or "redis"
    #[serde(default = "default_cache_backend")]
    #[validate(custom = "validate_backend")]
    pub cache_backend: String,

    /// TTL of the cached category listing
    #[serde(default = "default_category_cache_ttl_secs")]
    pub category_cache_ttl_secs: u64,

    /// Cart security limiter: requests per window per client IP
    #[serde(default = "default_cart_rate_limit_requests")]
    #[validate(range(min = 1))]
    pub cart_rate_limit_requests: u32,

    #[serde(default = "default_cart_rate_limit_window_secs")]
    #[validate(range(min = 1))]
    pub cart_rate_limit_window_secs: u64,

    #[serde(default)]
    pub rate_limit_use_redis: bool,

    #[serde(default = "default_rate_limit_namespace")]
    pub rate_limit_namespace: String,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Orders still open after this many hours get escalated
    #[serde(default = "default_escalate_after_hours")]
    #[validate(range(min = 1))]
    pub escalate_after_hours: i64,

    /// Carts idle for this many hours get a reminder
    #[serde(default = "default_abandon_after_hours")]
    #[validate(range(min = 1))]
    pub abandon_after_hours: i64,

    /// Trashed emails older than this are purged
    #[serde(default = "default_trash_retention_days")]
    #[validate(range(min = 1))]
    pub trash_retention_days: i64,

    /// Disables the in-process job scheduler (jobs can still run via the CLI)
    #[serde(default = "default_true_bool")]
    pub jobs_enabled: bool,

    #[serde(default = "default_hourly_job_interval_secs")]
    #[validate(range(min = 1))]
    pub escalation_interval_secs: u64,

    #[serde(default = "default_hourly_job_interval_secs")]
    #[validate(range(min = 1))]
    pub user_logout_interval_secs: u64,

    #[serde(default = "default_hourly_job_interval_secs")]
    #[validate(range(min = 1))]
    pub cart_reminder_interval_secs: u64,

    #[serde(default = "default_daily_job_interval_secs")]
    #[validate(range(min = 1))]
    pub trash_purge_interval_secs: u64,

    /// Recipient of order escalation notices
    #[serde(default = "default_ops_email")]
    #[validate(email)]
    pub ops_email: String,

    /// Sender address for outbound mail
    #[serde(default = "default_mail_from")]
    #[validate(email)]
    pub mail_from: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            jwt_secret,
            jwt_expiration_secs: 3600,
            refresh_token_expiration_secs: 604_800,
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            revocation_cache_ttl_secs: default_revocation_cache_ttl_secs(),
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
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            cache_backend: default_cache_backend(),
            category_cache_ttl_secs: default_category_cache_ttl_secs(),
            cart_rate_limit_requests: default_cart_rate_limit_requests(),
            cart_rate_limit_window_secs: default_cart_rate_limit_window_secs(),
            rate_limit_use_redis: false,
            rate_limit_namespace: default_rate_limit_namespace(),
            event_channel_capacity: default_event_channel_capacity(),
            escalate_after_hours: default_escalate_after_hours(),
            abandon_after_hours: default_abandon_after_hours(),
            trash_retention_days: default_trash_retention_days(),
            jobs_enabled: true,
            escalation_interval_secs: default_hourly_job_interval_secs(),
            user_logout_interval_secs: default_hourly_job_interval_secs(),
            cart_reminder_interval_secs: default_hourly_job_interval_secs(),
            trash_purge_interval_secs: default_daily_job_interval_secs(),
            ops_email: default_ops_email(),
            mail_from: default_mail_from(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn uses_redis_cache(&self) -> bool {
        self.cache_backend.eq_ignore_ascii_case("redis")
    }

    pub fn category_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.category_cache_ttl_secs)
    }

    pub fn cart_rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.cart_rate_limit_window_secs)
    }

    /// Explicit origins, if any were configured.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some("Set APP__CORS_ALLOWED_ORIGINS in production".into());
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development".into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_auth_issuer() -> String {
    "commerce-admin-auth".to_string()
}
fn default_auth_audience() -> String {
    "commerce-admin-api".to_string()
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
fn default_revocation_cache_ttl_secs() -> u64 {
    30
}
fn default_cache_backend() -> String {
    "in-memory".to_string()
}
fn default_category_cache_ttl_secs() -> u64 {
    3600
}
fn default_cart_rate_limit_requests() -> u32 {
    5
}
fn default_cart_rate_limit_window_secs() -> u64 {
    60
}
fn default_rate_limit_namespace() -> String {
    "commerce:rl".to_string()
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_escalate_after_hours() -> i64 {
    48
}
fn default_abandon_after_hours() -> i64 {
    24
}
fn default_trash_retention_days() -> i64 {
    30
}
fn default_true_bool() -> bool {
    true
}
fn default_hourly_job_interval_secs() -> u64 {
    3600
}
fn default_daily_job_interval_secs() -> u64 {
    86_400
}
fn default_ops_email() -> String {
    "ops@example.com".to_string()
}
fn default_mail_from() -> String {
    "no-reply@example.com".to_string()
}

fn validate_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("cache_backend");
            err.message = Some("Must be one of: in-memory, redis".into());
            Err(err)
        }
    }
}

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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must have at least 10 unique characters".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("commerce_admin_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt().with_env_filter(EnvFilter::new(filter_directive));
    let result = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing already initialized: {}", err);
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. Environment variables (`APP__*`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://commerce.db?mode=rwc")?
        .set_default("redis_url", "redis://127.0.0.1:6379")?
        .set_default("jwt_expiration_secs", 3600)?
        .set_default("refresh_token_expiration_secs", 604_800)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SECRET: &str = "k3y-for-unit-tests-0123456789-abcdefghij";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            SECRET.into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_pass_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cart_rate_limit_requests, 5);
        assert_eq!(cfg.cart_rate_limit_window(), Duration::from_secs(60));
    }

    #[test]
    fn production_requires_cors_origins() {
        let mut cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.cors_allowed_origins = Some("https://admin.example.com, ".into());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.cors_origins(), vec!["https://admin.example.com"]);
    }

    #[test]
    fn dev_secret_rejected_outside_development() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://admin.example.com".into());
        cfg.jwt_secret = DEV_DEFAULT_JWT_SECRET.into();
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn weak_secrets_and_bad_levels_fail() {
        let mut cfg = base_config();
        cfg.jwt_secret = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into();
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("jwt_secret"));
        assert!(fields.contains_key("log_level"));
    }

    #[test]
    fn unknown_cache_backend_fails() {
        let mut cfg = base_config();
        cfg.cache_backend = "memcached".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_values_from_config_file() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            jwt_secret = "{SECRET}"
            environment = "development"
            cart_rate_limit_requests = 7
            escalate_after_hours = 12
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.cart_rate_limit_requests, 7);
        assert_eq!(cfg.escalate_after_hours, 12);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}

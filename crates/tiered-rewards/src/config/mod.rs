use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::AppError;
use crate::levels::catalog::RuleCatalog;

const DEFAULT_EVALUATION_WINDOW_DAYS: u32 = 30;
const DEFAULT_BASELINE_PERIOD_DAYS: u32 = 30;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Longest baseline or evaluation period accepted, in days.
pub const MAX_PERIOD_DAYS: u32 = 3_650;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub engine: EngineSettings,
    pub telemetry: TelemetryConfig,
    pub rule_catalog_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let engine = EngineSettings {
            evaluation_window_days: period_var(
                "APP_EVALUATION_WINDOW_DAYS",
                DEFAULT_EVALUATION_WINDOW_DAYS,
            )?,
            default_baseline_period_days: period_var(
                "APP_BASELINE_PERIOD_DAYS",
                DEFAULT_BASELINE_PERIOD_DAYS,
            )?,
            batch_concurrency: positive_var("APP_BATCH_CONCURRENCY", DEFAULT_BATCH_CONCURRENCY)?,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let rule_catalog_path = env::var("APP_RULE_CATALOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            environment,
            engine,
            telemetry: TelemetryConfig { log_level },
            rule_catalog_path,
        })
    }

    /// The configured catalog file, or the standard program when none is set.
    pub fn rule_catalog(&self) -> Result<RuleCatalog, AppError> {
        match &self.rule_catalog_path {
            Some(path) => {
                let payload = std::fs::read_to_string(path)?;
                Ok(RuleCatalog::from_json(&payload)?)
            }
            None => Ok(RuleCatalog::standard()),
        }
    }
}

fn positive_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .ok()
            .filter(|value| *value > T::default())
            .ok_or(ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn period_var(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    validate_period_days(key, positive_var(key, default)?)
}

/// Accepts `1..=MAX_PERIOD_DAYS`.
pub fn validate_period_days(key: &'static str, days: u32) -> Result<u32, ConfigError> {
    if days == 0 {
        return Err(ConfigError::InvalidNumber { key });
    }
    if days > MAX_PERIOD_DAYS {
        return Err(ConfigError::OutOfRange {
            key,
            max: MAX_PERIOD_DAYS,
        });
    }
    Ok(days)
}

/// Engine-wide evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Trailing window used for "current" values.
    pub evaluation_window_days: u32,
    /// Used when an organization does not set its own baseline period.
    pub default_baseline_period_days: u32,
    pub batch_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            evaluation_window_days: DEFAULT_EVALUATION_WINDOW_DAYS,
            default_baseline_period_days: DEFAULT_BASELINE_PERIOD_DAYS,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str },
    OutOfRange { key: &'static str, max: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a positive whole number")
            }
            ConfigError::OutOfRange { key, max } => {
                write!(f, "{key} must not exceed {max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

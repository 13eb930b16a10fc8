use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::currency::CurrencyCode;
use crate::domain::unit::UnitCode;
use crate::pricing::ledger::PricingSettings;

const RATE_ENV_PREFIX: &str = "LOADQUOTE_RATE_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub pricing: PricingConfig,
    pub rates: RatesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub base_currency: String,
    pub default_unit: String,
}

#[derive(Clone, Debug, Default)]
pub struct RatesConfig {
    pub table: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub base_currency: Option<String>,
    pub default_unit: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub rates: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig {
                base_currency: "TRY".to_string(),
                default_unit: UnitCode::Piece.code().to_string(),
            },
            rates: RatesConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("loadquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Per-session ledger settings. Only meaningful on a validated config.
    pub fn pricing_settings(&self) -> PricingSettings {
        PricingSettings {
            base_currency: CurrencyCode::new(&self.pricing.base_currency),
            default_unit: UnitCode::parse(&self.pricing.default_unit),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(pricing) = patch.pricing {
            if let Some(base_currency) = pricing.base_currency {
                self.pricing.base_currency = base_currency;
            }
            if let Some(default_unit) = pricing.default_unit {
                self.pricing.default_unit = default_unit;
            }
        }

        if let Some(rates) = patch.rates {
            if let Some(table) = rates.table {
                self.rates
                    .table
                    .extend(table.into_iter().map(|(code, rate)| (normalize_code(&code), rate)));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LOADQUOTE_PRICING_BASE_CURRENCY") {
            self.pricing.base_currency = value;
        }
        if let Some(value) = read_env("LOADQUOTE_PRICING_DEFAULT_UNIT") {
            self.pricing.default_unit = value;
        }

        for (key, value) in env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            let Some(code) = key.strip_prefix(RATE_ENV_PREFIX) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            let rate = parse_decimal(key, value)?;
            self.rates.table.insert(normalize_code(code), rate);
        }

        let log_level =
            read_env("LOADQUOTE_LOGGING_LEVEL").or_else(|| read_env("LOADQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LOADQUOTE_LOGGING_FORMAT").or_else(|| read_env("LOADQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_currency) = overrides.base_currency {
            self.pricing.base_currency = base_currency;
        }
        if let Some(default_unit) = overrides.default_unit {
            self.pricing.default_unit = default_unit;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        self.rates
            .table
            .extend(overrides.rates.into_iter().map(|(code, rate)| (normalize_code(&code), rate)));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_pricing(&self.pricing)?;
        validate_rates(&self.rates)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("loadquote.toml"), PathBuf::from("config/loadquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if !CurrencyCode::new(&pricing.base_currency).is_well_formed() {
        return Err(ConfigError::Validation(format!(
            "pricing.base_currency must be a three-letter currency code, got `{}`",
            pricing.base_currency
        )));
    }

    if pricing.default_unit.trim().is_empty() {
        return Err(ConfigError::Validation(
            "pricing.default_unit must not be empty (for example `NIU` or `KGM`)".to_string(),
        ));
    }

    Ok(())
}

fn validate_rates(rates: &RatesConfig) -> Result<(), ConfigError> {
    for (code, rate) in &rates.table {
        if !CurrencyCode::new(code).is_well_formed() {
            return Err(ConfigError::Validation(format!(
                "rates.table key `{code}` must be a three-letter currency code"
            )));
        }
        if *rate <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "rates.table.{code} must be greater than zero, got {rate}"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn normalize_code(code: &str) -> String {
    CurrencyCode::new(code).as_str().to_string()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    pricing: Option<PricingPatch>,
    rates: Option<RatesPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    base_currency: Option<String>,
    default_unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RatesPatch {
    table: Option<BTreeMap<String, Decimal>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::currency::CurrencyCode;
use crate::domain::product::ProductId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product `{0}` was not found")]
    NotFound(ProductId),
    #[error("product catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateLookupError {
    #[error("no exchange rate is known for `{0}`")]
    UnknownCurrency(CurrencyCode),
    #[error("exchange rate service unavailable: {0}")]
    Unavailable(String),
    #[error("exchange rate for `{currency}` must be positive, got {rate}")]
    InvalidRate { currency: CurrencyCode, rate: Decimal },
}

/// Failures that end a CLI command. Catalog and rate lookups never appear
/// here: the ledger absorbs them fail-soft.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("invalid input: {0}")]
    Input(String),
    #[error("runtime initialization failed: {0}")]
    Runtime(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config_validation",
            Self::Input(_) => "input",
            Self::Runtime(_) => "runtime_init",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Input(_) => 3,
            Self::Runtime(_) => 4,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration is invalid. Fix the reported field and retry.",
            Self::Input(_) => "The input could not be processed. Check the document and try again.",
            Self::Runtime(_) => "Loadquote could not start its async runtime. Please retry.",
        }
    }
}

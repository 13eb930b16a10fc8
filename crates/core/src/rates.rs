use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::config::AppConfig;
use crate::domain::currency::CurrencyCode;
use crate::errors::RateLookupError;

/// Source of multipliers converting an amount in `currency` to base currency.
///
/// Implementations must answer `1` for the base currency without a remote call.
#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    async fn get_rate(&self, currency: &CurrencyCode) -> Result<Decimal, RateLookupError>;
}

/// Fixed rate table, typically taken from configuration.
#[derive(Clone, Debug)]
pub struct StaticRateTable {
    base_currency: CurrencyCode,
    rates: BTreeMap<CurrencyCode, Decimal>,
}

impl StaticRateTable {
    pub fn new(base_currency: CurrencyCode) -> Self {
        Self { base_currency, rates: BTreeMap::new() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut table = Self::new(CurrencyCode::new(&config.pricing.base_currency));
        for (code, rate) in &config.rates.table {
            table.rates.insert(CurrencyCode::new(code), *rate);
        }
        table
    }

    pub fn with_rate(mut self, currency: impl Into<CurrencyCode>, rate: Decimal) -> Self {
        self.rates.insert(currency.into(), rate);
        self
    }

    pub fn base_currency(&self) -> &CurrencyCode {
        &self.base_currency
    }
}

#[async_trait]
impl ExchangeRateProvider for StaticRateTable {
    async fn get_rate(&self, currency: &CurrencyCode) -> Result<Decimal, RateLookupError> {
        if currency == &self.base_currency {
            return Ok(Decimal::ONE);
        }

        match self.rates.get(currency) {
            Some(rate) if *rate > Decimal::ZERO => Ok(*rate),
            Some(rate) => {
                Err(RateLookupError::InvalidRate { currency: currency.clone(), rate: *rate })
            }
            None => Err(RateLookupError::UnknownCurrency(currency.clone())),
        }
    }
}

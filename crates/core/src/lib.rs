pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod rates;

pub use catalog::{search_or_empty, InMemoryCatalog, ProductCatalog, ProductSearch};
pub use domain::currency::CurrencyCode;
pub use domain::line::{CalculableField, LineField, LineId, PricingLine, SavedLine};
pub use domain::product::{Product, ProductId, ProductSnapshot};
pub use domain::unit::UnitCode;
pub use errors::{ApplicationError, CatalogError, RateLookupError};
pub use pricing::{
    LedgerHandle, PricingLedger, PricingSettings, RateOutcome, SnapshotOutcome, Totals,
};
pub use rates::{ExchangeRateProvider, StaticRateTable};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::unit::UnitCode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog record as returned by product search and fetch-by-id.
///
/// `price` is optional: catalog entries without a list price leave the line's
/// unit price untouched when selected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub unit: UnitCode,
    pub vat_rate: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Point-in-time copy of product metadata embedded in a pricing line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub code: String,
    pub name: String,
    pub unit: UnitCode,
    pub vat_rate: Decimal,
}

impl From<&Product> for ProductSnapshot {
    fn from(product: &Product) -> Self {
        Self {
            code: product.code.clone(),
            name: product.name.clone(),
            unit: product.unit.clone(),
            vat_rate: product.vat_rate,
        }
    }
}

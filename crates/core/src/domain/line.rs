use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::currency::CurrencyCode;
use crate::domain::product::{Product, ProductId, ProductSnapshot};
use crate::domain::unit::UnitCode;
use crate::pricing::calculator::{calculate, LineAmounts, LineInputs};

/// Identity of a line within one ledger. Assigned on creation, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LineId(pub(crate) u64);

impl LineId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line-{}", self.0)
    }
}

/// Edits that never participate in calculation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineField {
    Description(String),
    Unit(UnitCode),
    /// Reference assignment without recompute. A changed reference drops the
    /// snapshot since it described another product.
    Product(Option<ProductId>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculableField {
    Quantity,
    UnitPrice,
    ExchangeRate,
    VatRate,
    DiscountRate,
    DiscountAmount,
}

impl CalculableField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quantity => "quantity",
            Self::UnitPrice => "unit_price",
            Self::ExchangeRate => "exchange_rate",
            Self::VatRate => "vat_rate",
            Self::DiscountRate => "discount_rate",
            Self::DiscountAmount => "discount_amount",
        }
    }
}

/// One quote/load cost line.
///
/// `sub_total`, `vat_amount` and `total` have no setters: every mutation that
/// touches a calculable field goes through `recalculate` before returning, so
/// a reader never observes derived fields that disagree with the raw ones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PricingLine {
    id: LineId,
    product_ref: Option<ProductId>,
    product_snapshot: Option<ProductSnapshot>,
    description: String,
    quantity: Decimal,
    unit: UnitCode,
    unit_price: Decimal,
    currency: CurrencyCode,
    exchange_rate: Decimal,
    vat_rate: Decimal,
    discount_rate: Decimal,
    discount_amount: Decimal,
    sub_total: Decimal,
    vat_amount: Decimal,
    total: Decimal,
    sort_order: u32,
}

impl PricingLine {
    pub(crate) fn with_defaults(
        id: LineId,
        sort_order: u32,
        currency: CurrencyCode,
        unit: UnitCode,
    ) -> Self {
        let mut line = Self {
            id,
            product_ref: None,
            product_snapshot: None,
            description: String::new(),
            quantity: Decimal::ONE,
            unit,
            unit_price: Decimal::ZERO,
            currency,
            exchange_rate: Decimal::ONE,
            vat_rate: Decimal::ZERO,
            discount_rate: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            sub_total: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            sort_order,
        };
        line.recalculate();
        line
    }

    /// Rebuilds a line from storage. Stored derived amounts are discarded and
    /// re-derived from the raw fields.
    pub(crate) fn from_saved(id: LineId, fallback_sort_order: u32, saved: SavedLine) -> Self {
        let exchange_rate = if saved.exchange_rate > Decimal::ZERO {
            saved.exchange_rate
        } else {
            tracing::warn!(
                event_name = "pricing.line.invalid_saved_rate",
                line_id = id.get(),
                exchange_rate = %saved.exchange_rate,
                "saved line carries a non-positive exchange rate; using 1"
            );
            Decimal::ONE
        };

        let mut line = Self {
            id,
            product_ref: saved.product_ref,
            product_snapshot: saved.product_snapshot,
            description: saved.description,
            quantity: saved.quantity,
            unit: saved.unit,
            unit_price: saved.unit_price,
            currency: saved.currency,
            exchange_rate,
            vat_rate: saved.vat_rate,
            discount_rate: saved.discount_rate,
            discount_amount: saved.discount_amount,
            sub_total: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            sort_order: saved.sort_order.unwrap_or(fallback_sort_order),
        };
        line.recalculate();
        line
    }

    pub fn to_saved(&self) -> SavedLine {
        SavedLine {
            product_ref: self.product_ref.clone(),
            product_snapshot: self.product_snapshot.clone(),
            description: self.description.clone(),
            quantity: self.quantity,
            unit: self.unit.clone(),
            unit_price: self.unit_price,
            currency: self.currency.clone(),
            exchange_rate: self.exchange_rate,
            vat_rate: self.vat_rate,
            discount_rate: self.discount_rate,
            discount_amount: self.discount_amount,
            sub_total: Some(self.sub_total),
            vat_amount: Some(self.vat_amount),
            total: Some(self.total),
            sort_order: Some(self.sort_order),
        }
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn product_ref(&self) -> Option<&ProductId> {
        self.product_ref.as_ref()
    }

    pub fn product_snapshot(&self) -> Option<&ProductSnapshot> {
        self.product_snapshot.as_ref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit(&self) -> &UnitCode {
        &self.unit
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn exchange_rate(&self) -> Decimal {
        self.exchange_rate
    }

    pub fn vat_rate(&self) -> Decimal {
        self.vat_rate
    }

    pub fn discount_rate(&self) -> Decimal {
        self.discount_rate
    }

    pub fn discount_amount(&self) -> Decimal {
        self.discount_amount
    }

    pub fn sub_total(&self) -> Decimal {
        self.sub_total
    }

    pub fn vat_amount(&self) -> Decimal {
        self.vat_amount
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn sort_order(&self) -> u32 {
        self.sort_order
    }

    pub fn inputs(&self) -> LineInputs {
        LineInputs {
            quantity: self.quantity,
            unit_price: self.unit_price,
            exchange_rate: self.exchange_rate,
            vat_rate: self.vat_rate,
            discount_rate: self.discount_rate,
            discount_amount: self.discount_amount,
        }
    }

    pub fn amounts(&self) -> LineAmounts {
        calculate(&self.inputs())
    }

    pub(crate) fn set_calculable(&mut self, field: CalculableField, value: Decimal) {
        match field {
            CalculableField::Quantity => self.quantity = value,
            CalculableField::UnitPrice => self.unit_price = value,
            CalculableField::ExchangeRate => self.exchange_rate = value,
            CalculableField::VatRate => self.vat_rate = value,
            CalculableField::DiscountRate => self.discount_rate = value,
            CalculableField::DiscountAmount => self.discount_amount = value,
        }
        self.recalculate();
    }

    pub(crate) fn apply_field(&mut self, field: LineField) {
        match field {
            LineField::Description(description) => self.description = description,
            LineField::Unit(unit) => self.unit = unit,
            LineField::Product(product_ref) => {
                if self.product_ref != product_ref {
                    self.product_snapshot = None;
                }
                self.product_ref = product_ref;
            }
        }
    }

    /// Live product selection: several raw fields change, then one recompute.
    pub(crate) fn apply_product(&mut self, product: &Product) {
        let snapshot = ProductSnapshot::from(product);
        self.product_ref = Some(product.id.clone());
        self.unit = snapshot.unit.clone();
        self.vat_rate = snapshot.vat_rate;
        self.description = snapshot.name.clone();
        if let Some(price) = product.price {
            self.unit_price = price;
        }
        self.product_snapshot = Some(snapshot);
        self.recalculate();
    }

    pub(crate) fn clear_product(&mut self) {
        self.product_ref = None;
        self.product_snapshot = None;
    }

    pub(crate) fn set_currency(&mut self, currency: CurrencyCode) {
        self.currency = currency;
    }

    /// Back-fills display metadata only. Calculable fields stay authoritative.
    pub(crate) fn fill_snapshot(&mut self, snapshot: ProductSnapshot) {
        self.product_snapshot = Some(snapshot);
    }

    fn recalculate(&mut self) {
        let amounts = calculate(&self.inputs());
        self.sub_total = amounts.sub_total;
        self.vat_amount = amounts.vat_amount;
        self.total = amounts.total;
    }
}

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

/// Persisted shape of a line, as read from and handed back to storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedLine {
    #[serde(default)]
    pub product_ref: Option<ProductId>,
    #[serde(default)]
    pub product_snapshot: Option<ProductSnapshot>,
    #[serde(default)]
    pub description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: UnitCode,
    pub unit_price: Decimal,
    pub currency: CurrencyCode,
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
    #[serde(default)]
    pub vat_rate: Decimal,
    #[serde(default)]
    pub discount_rate: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_total: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,
}

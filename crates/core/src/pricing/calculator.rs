use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub const AMOUNT_DECIMAL_PLACES: u32 = 2;

/// Raw fields of a line that participate in calculation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInputs {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub exchange_rate: Decimal,
    pub vat_rate: Decimal,
    pub discount_rate: Decimal,
    pub discount_amount: Decimal,
}

/// Calculator output, in base currency, rounded to currency precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAmounts {
    pub line_total_base: Decimal,
    pub discount: Decimal,
    pub sub_total: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

/// Derives base-currency amounts for one line.
///
/// 1. `line_total_base = quantity * unit_price * exchange_rate`
/// 2. `discount`: a positive `discount_rate` wins; otherwise a positive
///    `discount_amount` (line currency) is converted with `exchange_rate`.
/// 3. `sub_total = line_total_base - discount`
/// 4. `vat_amount = sub_total * vat_rate / 100`
/// 5. `total = sub_total + vat_amount`
///
/// Intermediate values keep full precision; outputs are rounded half away from
/// zero to two places. Negative sub totals are not clamped. Arithmetic overflow
/// yields zero amounts instead of panicking.
pub fn calculate(inputs: &LineInputs) -> LineAmounts {
    match try_calculate(inputs) {
        Some(amounts) => amounts,
        None => {
            tracing::warn!(
                event_name = "pricing.calculator.overflow",
                quantity = %inputs.quantity,
                unit_price = %inputs.unit_price,
                exchange_rate = %inputs.exchange_rate,
                "line amounts overflowed decimal range; using zero amounts"
            );
            LineAmounts::default()
        }
    }
}

fn try_calculate(inputs: &LineInputs) -> Option<LineAmounts> {
    let line_total_base =
        inputs.quantity.checked_mul(inputs.unit_price)?.checked_mul(inputs.exchange_rate)?;
    let discount = resolve_discount(inputs, line_total_base)?;
    let sub_total = line_total_base.checked_sub(discount)?;
    let vat_amount = sub_total.checked_mul(percentage(inputs.vat_rate)?)?;
    let total = sub_total.checked_add(vat_amount)?;

    Some(LineAmounts {
        line_total_base: round_amount(line_total_base),
        discount: round_amount(discount),
        sub_total: round_amount(sub_total),
        vat_amount: round_amount(vat_amount),
        total: round_amount(total),
    })
}

fn resolve_discount(inputs: &LineInputs, line_total_base: Decimal) -> Option<Decimal> {
    if inputs.discount_rate > Decimal::ZERO {
        line_total_base.checked_mul(percentage(inputs.discount_rate)?)
    } else if inputs.discount_amount > Decimal::ZERO {
        inputs.discount_amount.checked_mul(inputs.exchange_rate)
    } else {
        Some(Decimal::ZERO)
    }
}

fn percentage(rate: Decimal) -> Option<Decimal> {
    rate.checked_div(Decimal::ONE_HUNDRED)
}

pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Reads a numeric form value. Anything that is not a number counts as zero.
///
/// A lone decimal comma is accepted (`"12,5"`), as entered on Turkish-locale
/// keyboards.
pub fn parse_amount(text: &str) -> Decimal {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }

    let normalized = if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };

    match Decimal::from_str(&normalized) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(
                event_name = "pricing.input.malformed_number",
                input = trimmed,
                error = %error,
                "treating malformed numeric input as zero"
            );
            Decimal::ZERO
        }
    }
}

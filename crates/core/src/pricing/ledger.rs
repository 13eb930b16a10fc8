use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::currency::CurrencyCode;
use crate::domain::line::{CalculableField, LineField, LineId, PricingLine, SavedLine};
use crate::domain::product::{Product, ProductId, ProductSnapshot};
use crate::domain::unit::UnitCode;
use crate::errors::{CatalogError, RateLookupError};
use crate::pricing::calculator::parse_amount;
use crate::pricing::latest::{LatestOnly, Ticket};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingSettings {
    pub base_currency: CurrencyCode,
    pub default_unit: UnitCode,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self { base_currency: CurrencyCode::new("TRY"), default_unit: UnitCode::Piece }
    }
}

/// Aggregate amounts across all lines, in base currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub sub_total: Decimal,
    pub vat_amount: Decimal,
    pub grand_total: Decimal,
    pub line_count: usize,
}

/// Outstanding exchange-rate lookup for one line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateRequest {
    pub line_id: LineId,
    pub currency: CurrencyCode,
    ticket: Ticket,
}

/// Outstanding product fetch that back-fills a missing snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub line_id: LineId,
    pub product_id: ProductId,
    ticket: Ticket,
}

/// Result of the synchronous half of a currency change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CurrencyChange {
    /// Base currency: rate fixed at 1, nothing to look up.
    Resolved,
    Pending(RateRequest),
    /// Index out of range; nothing changed.
    Ignored,
}

impl CurrencyChange {
    pub fn into_request(self) -> Option<RateRequest> {
        match self {
            Self::Pending(request) => Some(request),
            Self::Resolved | Self::Ignored => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateOutcome {
    Applied,
    /// Lookup failed or returned a non-positive rate; the line now uses 1.
    FellBack,
    Superseded,
    LineRemoved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Filled,
    Failed,
    Superseded,
    LineRemoved,
}

/// Ordered pricing lines of one quote/load being edited.
///
/// Every operation leaves each line's derived amounts equal to the calculator
/// output for its raw fields. Index-addressed operations with an out-of-range
/// index are logged no-ops; callers are expected to guard with `len()`.
///
/// Currency changes and snapshot reconciles span an asynchronous lookup and
/// are split into a begin step that issues a ticket and a complete step that
/// applies the result only while that ticket is still the newest for the line.
#[derive(Debug)]
pub struct PricingLedger {
    settings: PricingSettings,
    lines: Vec<PricingLine>,
    next_line_id: u64,
    rate_requests: LatestOnly<LineId>,
    snapshot_requests: LatestOnly<LineId>,
}

impl PricingLedger {
    pub fn new(settings: PricingSettings) -> Self {
        Self {
            settings,
            lines: Vec::new(),
            next_line_id: 1,
            rate_requests: LatestOnly::new(),
            snapshot_requests: LatestOnly::new(),
        }
    }

    /// Attaches previously saved lines, keeping their order.
    pub fn from_saved(
        settings: PricingSettings,
        saved: impl IntoIterator<Item = SavedLine>,
    ) -> Self {
        let mut ledger = Self::new(settings);
        for line in saved {
            let id = ledger.allocate_id();
            let fallback_sort_order = sort_order_for(ledger.lines.len());
            ledger.lines.push(PricingLine::from_saved(id, fallback_sort_order, line));
        }
        debug!(
            event_name = "pricing.ledger.attached",
            line_count = ledger.lines.len(),
            "pricing ledger attached to saved lines"
        );
        ledger
    }

    pub fn settings(&self) -> &PricingSettings {
        &self.settings
    }

    pub fn lines(&self) -> &[PricingLine] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&PricingLine> {
        self.lines.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn position_of(&self, line_id: LineId) -> Option<usize> {
        self.lines.iter().position(|line| line.id() == line_id)
    }

    pub fn rate_lookup_in_flight(&self, index: usize) -> bool {
        self.lines.get(index).is_some_and(|line| self.rate_requests.in_flight(&line.id()))
    }

    pub fn add_line(&mut self) -> &[PricingLine] {
        let id = self.allocate_id();
        let sort_order = sort_order_for(self.lines.len());
        self.lines.push(PricingLine::with_defaults(
            id,
            sort_order,
            self.settings.base_currency.clone(),
            self.settings.default_unit.clone(),
        ));
        debug!(event_name = "pricing.line.added", line_id = id.get(), sort_order, "line added");
        &self.lines
    }

    pub fn remove_line(&mut self, index: usize) -> &[PricingLine] {
        if index >= self.lines.len() {
            self.log_out_of_range("remove_line", index);
            return &self.lines;
        }

        let removed = self.lines.remove(index);
        self.rate_requests.forget(&removed.id());
        self.snapshot_requests.forget(&removed.id());
        debug!(
            event_name = "pricing.line.removed",
            line_id = removed.id().get(),
            index,
            "line removed"
        );
        &self.lines
    }

    /// Sets a field that does not participate in calculation.
    pub fn update_field(&mut self, index: usize, field: LineField) -> &[PricingLine] {
        let Some(line) = self.line_mut(index, "update_field") else {
            return &self.lines;
        };
        let line_id = line.id();
        let reference_changed = match &field {
            LineField::Product(product_ref) => line.product_ref() != product_ref.as_ref(),
            _ => false,
        };
        line.apply_field(field);

        if reference_changed {
            self.snapshot_requests.forget(&line_id);
        }
        &self.lines
    }

    /// Sets a calculable field and re-derives the line's amounts before
    /// returning. A manual exchange rate supersedes any in-flight lookup.
    pub fn update_calculable_field(
        &mut self,
        index: usize,
        field: CalculableField,
        value: Decimal,
    ) -> &[PricingLine] {
        let Some(line) = self.line_mut(index, "update_calculable_field") else {
            return &self.lines;
        };
        let line_id = line.id();
        line.set_calculable(field, value);
        debug!(
            event_name = "pricing.line.recalculated",
            line_id = line_id.get(),
            field = field.as_str(),
            value = %value,
            "calculable field updated"
        );

        if field == CalculableField::ExchangeRate {
            self.rate_requests.forget(&line_id);
        }
        &self.lines
    }

    /// Form-text variant of `update_calculable_field`; malformed numbers count
    /// as zero.
    pub fn update_calculable_text(
        &mut self,
        index: usize,
        field: CalculableField,
        text: &str,
    ) -> &[PricingLine] {
        self.update_calculable_field(index, field, parse_amount(text))
    }

    /// `None` clears the product link only. `Some` copies unit, VAT rate and
    /// name (and price, when the product has one, zero included) onto the
    /// line, then recalculates once.
    pub fn select_product(&mut self, index: usize, product: Option<&Product>) -> &[PricingLine] {
        let Some(line) = self.line_mut(index, "select_product") else {
            return &self.lines;
        };
        let line_id = line.id();

        match product {
            Some(product) => {
                line.apply_product(product);
                debug!(
                    event_name = "pricing.line.product_selected",
                    line_id = line_id.get(),
                    product_id = %product.id,
                    price_applied = product.price.is_some(),
                    "product selected"
                );
            }
            None => {
                line.clear_product();
                debug!(
                    event_name = "pricing.line.product_cleared",
                    line_id = line_id.get(),
                    "product cleared"
                );
            }
        }

        self.snapshot_requests.forget(&line_id);
        &self.lines
    }

    /// Sets the line currency. Base currency resolves immediately to rate 1;
    /// any other currency returns the lookup the caller must perform and hand
    /// to `complete_currency_change`.
    pub fn begin_currency_change(
        &mut self,
        index: usize,
        currency: CurrencyCode,
    ) -> CurrencyChange {
        let base_currency = self.settings.base_currency.clone();
        let Some(line) = self.line_mut(index, "select_currency") else {
            return CurrencyChange::Ignored;
        };
        let line_id = line.id();
        line.set_currency(currency.clone());

        if currency == base_currency {
            line.set_calculable(CalculableField::ExchangeRate, Decimal::ONE);
            self.rate_requests.forget(&line_id);
            debug!(
                event_name = "pricing.rate.base_currency",
                line_id = line_id.get(),
                currency = %currency,
                "base currency selected; exchange rate fixed at 1"
            );
            return CurrencyChange::Resolved;
        }

        let ticket = self.rate_requests.issue(line_id);
        debug!(
            event_name = "pricing.rate.requested",
            line_id = line_id.get(),
            currency = %currency,
            ticket = ticket.get(),
            "exchange rate lookup issued"
        );
        CurrencyChange::Pending(RateRequest { line_id, currency, ticket })
    }

    /// Applies a finished lookup if it is still the newest one for a line that
    /// still exists. Failures and non-positive rates fall back to 1.
    pub fn complete_currency_change(
        &mut self,
        request: &RateRequest,
        result: Result<Decimal, RateLookupError>,
    ) -> RateOutcome {
        let Some(position) = self.position_of(request.line_id) else {
            self.rate_requests.forget(&request.line_id);
            debug!(
                event_name = "pricing.rate.line_removed",
                line_id = request.line_id.get(),
                currency = %request.currency,
                "exchange rate resolved for a removed line; ignoring"
            );
            return RateOutcome::LineRemoved;
        };

        if !self.rate_requests.settle(&request.line_id, request.ticket) {
            debug!(
                event_name = "pricing.rate.superseded",
                line_id = request.line_id.get(),
                currency = %request.currency,
                ticket = request.ticket.get(),
                "stale exchange rate result discarded"
            );
            return RateOutcome::Superseded;
        }

        let (rate, outcome) = match result {
            Ok(rate) if rate > Decimal::ZERO => (rate, RateOutcome::Applied),
            Ok(rate) => {
                warn!(
                    event_name = "pricing.rate.fallback",
                    line_id = request.line_id.get(),
                    currency = %request.currency,
                    rate = %rate,
                    "exchange rate lookup returned a non-positive rate; using 1"
                );
                (Decimal::ONE, RateOutcome::FellBack)
            }
            Err(error) => {
                warn!(
                    event_name = "pricing.rate.fallback",
                    line_id = request.line_id.get(),
                    currency = %request.currency,
                    error = %error,
                    "exchange rate lookup failed; using 1"
                );
                (Decimal::ONE, RateOutcome::FellBack)
            }
        };

        self.lines[position].set_calculable(CalculableField::ExchangeRate, rate);
        debug!(
            event_name = "pricing.rate.applied",
            line_id = request.line_id.get(),
            currency = %request.currency,
            rate = %rate,
            "exchange rate applied"
        );
        outcome
    }

    /// Issues a fetch for every line that references a product but carries no
    /// snapshot, as happens when attaching lines saved with only a reference.
    pub fn pending_snapshot_requests(&mut self) -> Vec<SnapshotRequest> {
        let missing: Vec<(LineId, ProductId)> = self
            .lines
            .iter()
            .filter(|line| line.product_snapshot().is_none())
            .filter_map(|line| line.product_ref().map(|product_id| (line.id(), product_id.clone())))
            .collect();

        missing
            .into_iter()
            .map(|(line_id, product_id)| {
                let ticket = self.snapshot_requests.issue(line_id);
                SnapshotRequest { line_id, product_id, ticket }
            })
            .collect()
    }

    /// Back-fills the snapshot from a fetched product. Description, unit, VAT
    /// rate and price already on the line are left as stored and nothing is
    /// recalculated.
    pub fn complete_snapshot(
        &mut self,
        request: &SnapshotRequest,
        result: Result<Product, CatalogError>,
    ) -> SnapshotOutcome {
        let Some(position) = self.position_of(request.line_id) else {
            self.snapshot_requests.forget(&request.line_id);
            return SnapshotOutcome::LineRemoved;
        };

        if !self.snapshot_requests.settle(&request.line_id, request.ticket) {
            debug!(
                event_name = "pricing.snapshot.superseded",
                line_id = request.line_id.get(),
                product_id = %request.product_id,
                "stale product fetch discarded"
            );
            return SnapshotOutcome::Superseded;
        }

        let line = &mut self.lines[position];
        if line.product_ref() != Some(&request.product_id) || line.product_snapshot().is_some() {
            return SnapshotOutcome::Superseded;
        }

        match result {
            Ok(product) => {
                line.fill_snapshot(ProductSnapshot::from(&product));
                debug!(
                    event_name = "pricing.snapshot.reconciled",
                    line_id = request.line_id.get(),
                    product_id = %request.product_id,
                    "product snapshot back-filled"
                );
                SnapshotOutcome::Filled
            }
            Err(error) => {
                warn!(
                    event_name = "pricing.snapshot.fetch_failed",
                    line_id = request.line_id.get(),
                    product_id = %request.product_id,
                    error = %error,
                    "product fetch failed; snapshot left empty"
                );
                SnapshotOutcome::Failed
            }
        }
    }

    /// Sums the stored line amounts. Never cached. A sum that overflows
    /// yields zero amounts, as the calculator does for a single line.
    pub fn totals(&self) -> Totals {
        let line_count = self.lines.len();
        let summed = self.lines.iter().try_fold(
            Totals { line_count, ..Totals::default() },
            |totals, line| {
                Some(Totals {
                    sub_total: totals.sub_total.checked_add(line.sub_total())?,
                    vat_amount: totals.vat_amount.checked_add(line.vat_amount())?,
                    grand_total: totals.grand_total.checked_add(line.total())?,
                    line_count,
                })
            },
        );

        summed.unwrap_or_else(|| {
            warn!(
                event_name = "pricing.totals.overflow",
                line_count,
                "quote totals overflowed; reporting zero amounts"
            );
            Totals { line_count, ..Totals::default() }
        })
    }

    pub fn to_saved(&self) -> Vec<SavedLine> {
        self.lines.iter().map(PricingLine::to_saved).collect()
    }

    fn allocate_id(&mut self) -> LineId {
        let id = LineId(self.next_line_id);
        self.next_line_id += 1;
        id
    }

    fn line_mut(&mut self, index: usize, operation: &'static str) -> Option<&mut PricingLine> {
        if index >= self.lines.len() {
            self.log_out_of_range(operation, index);
            return None;
        }
        self.lines.get_mut(index)
    }

    fn log_out_of_range(&self, operation: &'static str, index: usize) {
        warn!(
            event_name = "pricing.ledger.index_out_of_range",
            operation,
            index,
            line_count = self.lines.len(),
            "line index out of range; ignoring"
        );
    }
}

fn sort_order_for(line_count: usize) -> u32 {
    u32::try_from(line_count).unwrap_or(u32::MAX)
}

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{watch, RwLock};

use crate::catalog::ProductCatalog;
use crate::domain::currency::CurrencyCode;
use crate::domain::line::{CalculableField, LineField, PricingLine, SavedLine};
use crate::domain::product::Product;
use crate::pricing::ledger::{CurrencyChange, PricingLedger, RateOutcome, SnapshotOutcome, Totals};
use crate::rates::ExchangeRateProvider;

/// Shared owner of one form session's ledger.
///
/// The lock is held only for the synchronous part of each operation, never
/// across a collaborator call, so edits keep flowing while a rate lookup or
/// product fetch is outstanding. Observers receive the full line list after
/// every applied transition.
#[derive(Clone)]
pub struct LedgerHandle {
    inner: Arc<Shared>,
}

struct Shared {
    ledger: RwLock<PricingLedger>,
    updates: watch::Sender<Vec<PricingLine>>,
}

impl LedgerHandle {
    pub fn new(ledger: PricingLedger) -> Self {
        let (updates, _) = watch::channel(ledger.lines().to_vec());
        Self { inner: Arc::new(Shared { ledger: RwLock::new(ledger), updates }) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<PricingLine>> {
        self.inner.updates.subscribe()
    }

    pub async fn lines(&self) -> Vec<PricingLine> {
        self.inner.ledger.read().await.lines().to_vec()
    }

    pub async fn line(&self, index: usize) -> Option<PricingLine> {
        self.inner.ledger.read().await.line(index).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.ledger.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.ledger.read().await.is_empty()
    }

    pub async fn totals(&self) -> Totals {
        self.inner.ledger.read().await.totals()
    }

    pub async fn saved_lines(&self) -> Vec<SavedLine> {
        self.inner.ledger.read().await.to_saved()
    }

    pub async fn add_line(&self) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.add_line();
        })
        .await
    }

    pub async fn remove_line(&self, index: usize) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.remove_line(index);
        })
        .await
    }

    pub async fn update_field(&self, index: usize, field: LineField) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.update_field(index, field);
        })
        .await
    }

    pub async fn update_calculable_field(
        &self,
        index: usize,
        field: CalculableField,
        value: Decimal,
    ) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.update_calculable_field(index, field, value);
        })
        .await
    }

    pub async fn update_calculable_text(
        &self,
        index: usize,
        field: CalculableField,
        text: &str,
    ) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.update_calculable_text(index, field, text);
        })
        .await
    }

    pub async fn select_product(
        &self,
        index: usize,
        product: Option<&Product>,
    ) -> Vec<PricingLine> {
        self.mutate(|ledger| {
            ledger.select_product(index, product);
        })
        .await
    }

    /// Changes a line's currency and resolves its exchange rate.
    ///
    /// Base currency resolves without calling `rates` and reports `Applied`.
    /// An out-of-range index reports `LineRemoved`.
    pub async fn select_currency<R>(
        &self,
        index: usize,
        currency: CurrencyCode,
        rates: &R,
    ) -> RateOutcome
    where
        R: ExchangeRateProvider + ?Sized,
    {
        let change = self.transition(|ledger| ledger.begin_currency_change(index, currency)).await;
        let request = match change {
            CurrencyChange::Pending(request) => request,
            CurrencyChange::Resolved => return RateOutcome::Applied,
            CurrencyChange::Ignored => return RateOutcome::LineRemoved,
        };

        let result = rates.get_rate(&request.currency).await;
        self.transition(|ledger| ledger.complete_currency_change(&request, result)).await
    }

    /// Back-fills snapshots for lines attached with only a product reference.
    pub async fn reconcile_missing_snapshots<C>(&self, catalog: &C) -> Vec<SnapshotOutcome>
    where
        C: ProductCatalog + ?Sized,
    {
        let requests = self.transition(|ledger| ledger.pending_snapshot_requests()).await;
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            let result = catalog.get(&request.product_id).await;
            let outcome =
                self.transition(|ledger| ledger.complete_snapshot(&request, result)).await;
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn mutate(&self, operation: impl FnOnce(&mut PricingLedger)) -> Vec<PricingLine> {
        let mut ledger = self.inner.ledger.write().await;
        operation(&mut ledger);
        let lines = ledger.lines().to_vec();
        self.inner.updates.send_replace(lines.clone());
        lines
    }

    async fn transition<T>(&self, operation: impl FnOnce(&mut PricingLedger) -> T) -> T {
        let mut ledger = self.inner.ledger.write().await;
        let output = operation(&mut ledger);
        self.inner.updates.send_replace(ledger.lines().to_vec());
        output
    }
}

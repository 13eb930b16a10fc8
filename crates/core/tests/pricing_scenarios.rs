use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loadquote_core::pricing::{calculate, LineInputs};
use loadquote_core::{
    CalculableField, CurrencyCode, ExchangeRateProvider, InMemoryCatalog, LedgerHandle, LineField,
    PricingLedger, PricingSettings, Product, ProductId, RateLookupError, RateOutcome, SavedLine,
    SnapshotOutcome, UnitCode,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::oneshot;

fn try_settings() -> PricingSettings {
    PricingSettings { base_currency: CurrencyCode::new("TRY"), default_unit: UnitCode::Piece }
}

struct Gate {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<Result<Decimal, RateLookupError>>,
}

/// Rate provider whose answers are released by the test, one currency at a
/// time, so resolution order can be forced.
#[derive(Default)]
struct GatedRates {
    gates: Mutex<HashMap<CurrencyCode, Gate>>,
}

impl GatedRates {
    fn gate(
        &self,
        currency: &str,
    ) -> (oneshot::Receiver<()>, oneshot::Sender<Result<Decimal, RateLookupError>>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates
            .lock()
            .expect("gate lock")
            .insert(CurrencyCode::new(currency), Gate { started: started_tx, release: release_rx });
        (started_rx, release_tx)
    }
}

#[async_trait]
impl ExchangeRateProvider for GatedRates {
    async fn get_rate(&self, currency: &CurrencyCode) -> Result<Decimal, RateLookupError> {
        let gate = self.gates.lock().expect("gate lock").remove(currency);
        let Some(gate) = gate else {
            return Err(RateLookupError::UnknownCurrency(currency.clone()));
        };
        let _ = gate.started.send(());
        gate.release
            .await
            .unwrap_or_else(|_| Err(RateLookupError::Unavailable("gate dropped".to_string())))
    }
}

#[test]
fn worked_example_foreign_currency_with_rate_discount() {
    let mut ledger = PricingLedger::new(try_settings());
    ledger.add_line();
    ledger.update_calculable_field(0, CalculableField::Quantity, dec!(2));
    ledger.update_calculable_field(0, CalculableField::UnitPrice, dec!(100));
    let request = ledger
        .begin_currency_change(0, CurrencyCode::new("USD"))
        .into_request()
        .expect("usd lookup");
    assert_eq!(ledger.complete_currency_change(&request, Ok(dec!(30))), RateOutcome::Applied);
    ledger.update_calculable_field(0, CalculableField::VatRate, dec!(20));
    ledger.update_calculable_field(0, CalculableField::DiscountRate, dec!(10));

    let line = &ledger.lines()[0];
    assert_eq!(line.amounts().line_total_base, dec!(6000));
    assert_eq!(line.amounts().discount, dec!(600));
    assert_eq!(line.sub_total(), dec!(5400.00));
    assert_eq!(line.vat_amount(), dec!(1080.00));
    assert_eq!(line.total(), dec!(6480.00));
}

#[test]
fn amount_discount_without_rate() {
    let mut ledger = PricingLedger::new(try_settings());
    ledger.add_line();
    ledger.update_calculable_field(0, CalculableField::UnitPrice, dec!(50));
    ledger.update_calculable_field(0, CalculableField::DiscountAmount, dec!(5));

    let line = &ledger.lines()[0];
    assert_eq!(line.sub_total(), dec!(45.00));
    assert_eq!(line.vat_amount(), dec!(0.00));
    assert_eq!(line.total(), dec!(45.00));
}

#[test]
fn huge_discount_amount_is_ignored_when_rate_is_set() {
    let mut ledger = PricingLedger::new(try_settings());
    ledger.add_line();
    ledger.update_calculable_field(0, CalculableField::Quantity, dec!(3));
    ledger.update_calculable_field(0, CalculableField::UnitPrice, dec!(200));
    ledger.update_calculable_field(0, CalculableField::DiscountRate, dec!(10));
    let rate_only = ledger.lines()[0].total();

    ledger.update_calculable_field(0, CalculableField::DiscountAmount, dec!(1000000));

    assert_eq!(ledger.lines()[0].total(), rate_only);
    assert_eq!(rate_only, dec!(540));
}

#[test]
fn product_selection_overwrites_unit_vat_and_price() {
    let mut ledger = PricingLedger::new(try_settings());
    ledger.add_line();
    assert_eq!(ledger.lines()[0].unit().code(), "NIU");
    assert_eq!(ledger.lines()[0].vat_rate(), Decimal::ZERO);
    assert_eq!(ledger.lines()[0].unit_price(), Decimal::ZERO);

    let product = Product {
        id: ProductId("11".to_string()),
        code: "BULK".to_string(),
        name: "Bulk cargo".to_string(),
        unit: UnitCode::parse("KGM"),
        vat_rate: dec!(20),
        price: Some(dec!(75)),
    };
    ledger.select_product(0, Some(&product));

    let line = &ledger.lines()[0];
    assert_eq!(line.unit().code(), "KGM");
    assert_eq!(line.vat_rate(), dec!(20));
    assert_eq!(line.unit_price(), dec!(75));
    assert_eq!(line.sub_total(), dec!(75));
    assert_eq!(line.vat_amount(), dec!(15));
    assert_eq!(line.total(), dec!(90));
}

#[tokio::test]
async fn reconcile_does_not_clobber_saved_amounts() {
    let saved = SavedLine {
        product_ref: Some(ProductId("7".to_string())),
        product_snapshot: None,
        description: "Port fee (as quoted)".to_string(),
        quantity: dec!(1),
        unit: UnitCode::Piece,
        unit_price: dec!(999),
        currency: CurrencyCode::new("TRY"),
        exchange_rate: Decimal::ONE,
        vat_rate: dec!(18),
        discount_rate: Decimal::ZERO,
        discount_amount: Decimal::ZERO,
        sub_total: None,
        vat_amount: None,
        total: None,
        sort_order: Some(0),
    };
    let handle = LedgerHandle::new(PricingLedger::from_saved(try_settings(), vec![saved]));
    let before = handle.totals().await;
    let catalog = InMemoryCatalog::new(vec![Product {
        id: ProductId("7".to_string()),
        code: "PORT".to_string(),
        name: "Port fee".to_string(),
        unit: UnitCode::Piece,
        vat_rate: Decimal::ZERO,
        price: Some(dec!(10)),
    }]);

    let outcomes = handle.reconcile_missing_snapshots(&catalog).await;

    assert_eq!(outcomes, vec![SnapshotOutcome::Filled]);
    let line = handle.line(0).await.expect("line");
    assert_eq!(line.unit_price(), dec!(999));
    assert_eq!(line.vat_rate(), dec!(18));
    assert_eq!(line.description(), "Port fee (as quoted)");
    let snapshot = line.product_snapshot().expect("snapshot");
    assert_eq!(snapshot.code, "PORT");
    assert_eq!(snapshot.name, "Port fee");
    assert_eq!(snapshot.vat_rate, Decimal::ZERO);
    assert_eq!(handle.totals().await, before);
}

#[tokio::test]
async fn stale_rate_lookup_does_not_regress_currency() {
    let handle = LedgerHandle::new(PricingLedger::new(try_settings()));
    handle.add_line().await;
    handle.update_calculable_field(0, CalculableField::UnitPrice, dec!(10)).await;

    let rates = Arc::new(GatedRates::default());
    let (usd_started, usd_release) = rates.gate("USD");
    let (eur_started, eur_release) = rates.gate("EUR");

    let usd_task = tokio::spawn({
        let handle = handle.clone();
        let rates = Arc::clone(&rates);
        async move { handle.select_currency(0, CurrencyCode::new("USD"), rates.as_ref()).await }
    });
    usd_started.await.expect("usd lookup started");

    let eur_task = tokio::spawn({
        let handle = handle.clone();
        let rates = Arc::clone(&rates);
        async move { handle.select_currency(0, CurrencyCode::new("EUR"), rates.as_ref()).await }
    });
    eur_started.await.expect("eur lookup started");

    eur_release.send(Ok(dec!(35))).expect("release eur");
    assert_eq!(eur_task.await.expect("eur task"), RateOutcome::Applied);

    usd_release.send(Ok(dec!(30))).expect("release usd");
    assert_eq!(usd_task.await.expect("usd task"), RateOutcome::Superseded);

    let line = handle.line(0).await.expect("line");
    assert_eq!(line.currency().as_str(), "EUR");
    assert_eq!(line.exchange_rate(), dec!(35));
    assert_eq!(line.total(), dec!(350));
}

#[tokio::test]
async fn edits_proceed_while_lookup_is_in_flight() {
    let handle = LedgerHandle::new(PricingLedger::new(try_settings()));
    handle.add_line().await;
    handle.add_line().await;

    let rates = Arc::new(GatedRates::default());
    let (usd_started, usd_release) = rates.gate("USD");

    let usd_task = tokio::spawn({
        let handle = handle.clone();
        let rates = Arc::clone(&rates);
        async move { handle.select_currency(1, CurrencyCode::new("USD"), rates.as_ref()).await }
    });
    usd_started.await.expect("usd lookup started");

    handle.update_calculable_field(1, CalculableField::UnitPrice, dec!(4)).await;
    handle.remove_line(0).await;
    handle.update_field(0, LineField::Description("Fuel surcharge".to_string())).await;

    usd_release.send(Ok(dec!(30))).expect("release usd");
    assert_eq!(usd_task.await.expect("usd task"), RateOutcome::Applied);

    let line = handle.line(0).await.expect("line");
    assert_eq!(line.description(), "Fuel surcharge");
    assert_eq!(line.exchange_rate(), dec!(30));
    assert_eq!(line.total(), dec!(120));
}

#[tokio::test]
async fn lookup_for_removed_line_is_silent() {
    let handle = LedgerHandle::new(PricingLedger::new(try_settings()));
    handle.add_line().await;

    let rates = Arc::new(GatedRates::default());
    let (started, release) = rates.gate("USD");
    let task = tokio::spawn({
        let handle = handle.clone();
        let rates = Arc::clone(&rates);
        async move { handle.select_currency(0, CurrencyCode::new("USD"), rates.as_ref()).await }
    });
    started.await.expect("lookup started");

    handle.remove_line(0).await;
    handle.add_line().await;
    release.send(Ok(dec!(30))).expect("release");

    assert_eq!(task.await.expect("task"), RateOutcome::LineRemoved);
    let fresh = handle.line(0).await.expect("fresh line");
    assert_eq!(fresh.exchange_rate(), Decimal::ONE);
    assert_eq!(fresh.currency().as_str(), "TRY");
}

#[tokio::test]
async fn failed_lookup_is_fail_soft() {
    let handle = LedgerHandle::new(PricingLedger::new(try_settings()));
    handle.add_line().await;
    handle.update_calculable_field(0, CalculableField::UnitPrice, dec!(100)).await;

    let rates = GatedRates::default();
    let (_started, release) = rates.gate("USD");
    release
        .send(Err(RateLookupError::Unavailable("upstream timeout".to_string())))
        .expect("queue failure");

    let outcome = handle.select_currency(0, CurrencyCode::new("USD"), &rates).await;

    assert_eq!(outcome, RateOutcome::FellBack);
    let line = handle.line(0).await.expect("line");
    assert_eq!(line.currency().as_str(), "USD");
    assert_eq!(line.exchange_rate(), Decimal::ONE);
    assert_eq!(line.total(), dec!(100));
}

#[derive(Clone, Debug)]
enum Op {
    Add,
    Remove(usize),
    Describe(usize),
    Edit(usize, CalculableField, i64),
}

fn field_strategy() -> impl Strategy<Value = CalculableField> {
    prop_oneof![
        Just(CalculableField::Quantity),
        Just(CalculableField::UnitPrice),
        Just(CalculableField::ExchangeRate),
        Just(CalculableField::VatRate),
        Just(CalculableField::DiscountRate),
        Just(CalculableField::DiscountAmount),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        (0usize..6).prop_map(Op::Remove),
        (0usize..6).prop_map(Op::Describe),
        (0usize..6, field_strategy(), 0i64..1_000_000).prop_map(|(index, field, cents)| Op::Edit(
            index, field, cents
        )),
    ]
}

fn decimal_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000, 0u32..4).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

proptest! {
    #[test]
    fn calculator_is_deterministic(
        quantity in decimal_strategy(),
        unit_price in decimal_strategy(),
        exchange_rate in decimal_strategy(),
        vat_rate in 0i64..100,
        discount_rate in 0i64..100,
        discount_amount in decimal_strategy(),
    ) {
        let inputs = LineInputs {
            quantity,
            unit_price,
            exchange_rate,
            vat_rate: Decimal::from(vat_rate),
            discount_rate: Decimal::from(discount_rate),
            discount_amount,
        };

        let first = calculate(&inputs);
        let second = calculate(&inputs);

        prop_assert_eq!(first, second);
        prop_assert!(first.sub_total.scale() <= 2);
        prop_assert!(first.total.scale() <= 2);
    }

    #[test]
    fn totals_equal_sum_of_lines(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut ledger = PricingLedger::new(try_settings());

        for op in ops {
            match op {
                Op::Add => {
                    ledger.add_line();
                }
                Op::Remove(index) => {
                    ledger.remove_line(index);
                }
                Op::Describe(index) => {
                    let before = ledger.totals();
                    ledger.update_field(index, LineField::Description(format!("line {index}")));
                    prop_assert_eq!(ledger.totals(), before);
                }
                Op::Edit(index, field, cents) => {
                    ledger.update_calculable_field(index, field, Decimal::new(cents, 2));
                }
            }

            let totals = ledger.totals();
            let sub_total: Decimal = ledger.lines().iter().map(|line| line.sub_total()).sum();
            let vat_amount: Decimal = ledger.lines().iter().map(|line| line.vat_amount()).sum();
            let grand_total: Decimal = ledger.lines().iter().map(|line| line.total()).sum();

            prop_assert_eq!(totals.sub_total, sub_total);
            prop_assert_eq!(totals.vat_amount, vat_amount);
            prop_assert_eq!(totals.grand_total, grand_total);
            prop_assert_eq!(totals.line_count, ledger.len());

            for line in ledger.lines() {
                prop_assert_eq!(line.amounts().total, line.total());
            }
        }
    }
}

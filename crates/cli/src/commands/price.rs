use std::fmt::Display;
use std::path::PathBuf;

use loadquote_core::config::{AppConfig, LoadOptions};
use loadquote_core::{
    ApplicationError, InMemoryCatalog, LedgerHandle, PricingLedger, PricingLine, Product,
    RateOutcome, SavedLine, SnapshotOutcome, StaticRateTable, Totals,
};
use serde::{Deserialize, Serialize};

use crate::commands::{read_json, CommandResult};

const COMMAND: &str = "price";

#[derive(Debug, Clone)]
pub struct PriceRequest {
    pub input: PathBuf,
    pub catalog: Option<PathBuf>,
    pub refresh_rates: bool,
    pub load_options: LoadOptions,
}

#[derive(Debug, Deserialize)]
struct QuoteDocument {
    #[serde(default)]
    lines: Vec<SavedLine>,
}

#[derive(Debug, Serialize)]
struct PriceReport {
    command: &'static str,
    status: &'static str,
    lines: Vec<PricingLine>,
    totals: Totals,
}

pub fn run(request: PriceRequest) -> CommandResult {
    match price(request) {
        Ok(report) => CommandResult::report(&report),
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}

fn price(request: PriceRequest) -> Result<PriceReport, ApplicationError> {
    let config = AppConfig::load(request.load_options)?;

    let document: QuoteDocument = read_json(&request.input)
        .map_err(|error| ApplicationError::Input(format!("{error:#}")))?;
    let catalog = request
        .catalog
        .as_deref()
        .map(read_json::<Vec<Product>>)
        .transpose()
        .map_err(|error| ApplicationError::Input(format!("{error:#}")))?
        .map(InMemoryCatalog::new);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(runtime_failure)?;

    let settings = config.pricing_settings();
    let rates = StaticRateTable::from_config(&config);
    let handle = LedgerHandle::new(PricingLedger::from_saved(settings.clone(), document.lines));

    runtime.block_on(async {
        if let Some(catalog) = &catalog {
            let outcomes = handle.reconcile_missing_snapshots(catalog).await;
            let failed =
                outcomes.iter().filter(|outcome| **outcome == SnapshotOutcome::Failed).count();
            tracing::info!(
                event_name = "cli.price.snapshots_reconciled",
                requested = outcomes.len(),
                failed,
                "reconciled missing product snapshots"
            );
        }

        if request.refresh_rates {
            let mut fell_back = 0usize;
            for (index, line) in handle.lines().await.iter().enumerate() {
                if line.currency() == &settings.base_currency {
                    continue;
                }
                let outcome =
                    handle.select_currency(index, line.currency().clone(), &rates).await;
                if outcome == RateOutcome::FellBack {
                    fell_back += 1;
                }
            }
            tracing::info!(
                event_name = "cli.price.rates_refreshed",
                fell_back,
                "refreshed foreign-currency exchange rates"
            );
        }

        Ok(PriceReport {
            command: COMMAND,
            status: "ok",
            lines: handle.lines().await,
            totals: handle.totals().await,
        })
    })
}

fn runtime_failure(error: impl Display) -> ApplicationError {
    ApplicationError::Runtime(format!("failed to initialize async runtime: {error}"))
}

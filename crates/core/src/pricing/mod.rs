pub mod calculator;
pub mod latest;
pub mod ledger;
pub mod session;

pub use calculator::{calculate, parse_amount, LineAmounts, LineInputs};
pub use latest::{LatestOnly, Ticket};
pub use ledger::{
    CurrencyChange, PricingLedger, PricingSettings, RateOutcome, RateRequest, SnapshotOutcome,
    SnapshotRequest, Totals,
};
pub use session::LedgerHandle;

//! Reconciliation matching engine: proposes groupings that explain bank
//! statement records with ledger cashflow transactions, within an amount
//! tolerance and a date window, each proposal carrying a confidence.
//!
//! The engine is a pure, synchronous computation. Fetching inputs,
//! persisting matches and rendering results belong to the callers.

pub mod engine;
mod normalize;
mod report;
mod score;
pub mod subset_sum;
pub mod types;

pub use engine::MatchEngine;
pub use ledgermatch_core::{BankRecord, CashflowTransaction, Direction, Money};
pub use subset_sum::{SubsetSumOutcome, SubsetSumSearch};
pub use types::{
    Confidence, MatchError, MatchOptions, MatchProposal, MatchResult, MatchSummary, MatchType,
    PhaseTimings, SignalScores,
};

/// Matches bank records against cashflow transactions and returns every
/// accepted proposal plus the unmatched residuals.
///
/// The only error is a cross-currency transaction without a resolvable
/// exchange rate; it aborts the run before any matching happens.
pub fn match_bank_records(
    bank_records: &[BankRecord],
    transactions: &[CashflowTransaction],
    options: MatchOptions,
) -> Result<MatchResult, MatchError> {
    MatchEngine::new(options).run(bank_records, transactions)
}

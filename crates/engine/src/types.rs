use ledgermatch_core::{BankRecord, CashflowTransaction, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Tuning knobs for one engine run. Every field has a usable default, so
/// callers can deserialize a partial options object or write
/// `MatchOptions { tolerance: 0.05, ..Default::default() }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchOptions {
    /// Amount tolerance in money units.
    pub tolerance: f64,
    pub date_window_days: i64,
    /// Largest subset explored on either side of a grouping (clamped 2-10).
    pub max_group_size: usize,
    /// Echoed into the result; never interpreted by the engine.
    pub currency: Option<String>,
    /// Rates applied to cross-currency transactions, keyed by currency code.
    pub exchange_rates: HashMap<String, f64>,
    /// Tolerance widening for cross-currency pairings, as a fraction of
    /// the target amount.
    pub fx_tolerance_pct: f64,
    /// Enumerate every admissible subset instead of stopping at the first.
    pub find_all: bool,
    /// Node budget per subset-sum search; 0 means unlimited.
    pub max_dfs_nodes: u64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            date_window_days: 14,
            max_group_size: 5,
            currency: None,
            exchange_rates: HashMap::new(),
            fx_tolerance_pct: 0.05,
            find_all: false,
            max_dfs_nodes: 500_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "N:1")]
    ManyToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:M")]
    ManyToMany,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::OneToOne => write!(f, "1:1"),
            MatchType::ManyToOne => write!(f, "N:1"),
            MatchType::OneToMany => write!(f, "1:N"),
            MatchType::ManyToMany => write!(f, "N:M"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    High,
    Medium,
    Low,
}

/// The individual signals that fed a proposal's composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub text: f64,
    pub date: f64,
    #[serde(rename = "type")]
    pub type_: f64,
}

/// One accepted grouping. Self-contained: carries clones of the original
/// records and transactions, never internal pool indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchProposal {
    pub match_type: MatchType,
    pub confidence: Confidence,
    pub score: f64,
    pub bank_records: Vec<BankRecord>,
    pub transactions: Vec<CashflowTransaction>,
    pub bank_total: Money,
    pub transaction_total: Money,
    pub variance: Money,
    /// Present only when the grouping involves a cross-currency
    /// transaction; expressed in bank currency after rate conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fx_variance: Option<Money>,
    pub signals: SignalScores,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub total_records: usize,
    pub total_transactions: usize,
    pub matched_records: usize,
    pub matched_transactions: usize,
    pub unmatched_records: usize,
    pub unmatched_transactions: usize,
    pub one_to_one: usize,
    pub many_to_one: usize,
    pub one_to_many: usize,
    pub many_to_many: usize,
    pub matched_amount: Money,
    pub unmatched_record_amount: Money,
    pub unmatched_transaction_amount: Money,
    pub total_unmatched_amount: Money,
    /// Percentage of bank records explained, rounded to 2 dp.
    pub match_rate: f64,
}

/// Wall-clock diagnostics, in milliseconds. Not part of the
/// deterministic output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub exact_ms: f64,
    pub fuzzy_ms: f64,
    pub many_to_one_ms: f64,
    pub one_to_many_ms: f64,
    pub many_to_many_ms: f64,
    pub total_ms: f64,
}

/// Output of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matches: Vec<MatchProposal>,
    pub unmatched_records: Vec<BankRecord>,
    pub unmatched_transactions: Vec<CashflowTransaction>,
    pub summary: MatchSummary,
    pub timing: PhaseTimings,
    /// Per-phase narrative for audit display; not meant to be parsed.
    pub workings: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// The engine's one unrecoverable input error: a cross-currency
/// transaction whose rate cannot be resolved. Raised during
/// normalization, before any phase runs.
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("transaction {id}: cross-currency but no currency code given")]
    MissingCurrency { id: String },
    #[error("transaction {id}: no exchange rate for currency '{currency}'")]
    MissingExchangeRate { id: String, currency: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_defaults_match_documented_values() {
        let opts = MatchOptions::default();
        assert_eq!(opts.tolerance, 0.01);
        assert_eq!(opts.date_window_days, 14);
        assert_eq!(opts.max_group_size, 5);
        assert_eq!(opts.fx_tolerance_pct, 0.05);
        assert!(!opts.find_all);
        assert_eq!(opts.max_dfs_nodes, 500_000);
        assert!(opts.currency.is_none());
        assert!(opts.exchange_rates.is_empty());
    }

    #[test]
    fn partial_options_deserialize_with_defaults() {
        let opts: MatchOptions =
            serde_json::from_str(r#"{"dateWindowDays": 30, "exchangeRates": {"USD": 1.6}}"#)
                .unwrap();
        assert_eq!(opts.date_window_days, 30);
        assert_eq!(opts.exchange_rates["USD"], 1.6);
        assert_eq!(opts.tolerance, 0.01);
    }

    #[test]
    fn match_type_wire_names() {
        assert_eq!(serde_json::to_string(&MatchType::ManyToOne).unwrap(), "\"N:1\"");
        assert_eq!(MatchType::ManyToMany.to_string(), "N:M");
    }

    #[test]
    fn missing_rate_error_names_the_currency() {
        let err = MatchError::MissingExchangeRate {
            id: "T9".into(),
            currency: "USD".into(),
        };
        assert!(err.to_string().contains("USD"));
        assert!(err.to_string().contains("T9"));
    }
}

//! Converts caller-supplied records and transactions into the internal
//! pool representation: signed integer cents, day numbers, and
//! normalized text fields. Runs once, before any phase.

use chrono::{Datelike, NaiveDate};
use ledgermatch_core::{BankRecord, CashflowTransaction};

use crate::types::{MatchError, MatchOptions};

/// A bank record as the phases see it. Text fields are pre-normalized;
/// `None` means absent or normalized to nothing.
#[derive(Debug, Clone)]
pub(crate) struct NormRecord {
    pub idx: usize,
    pub cents: i64,
    pub day: i64,
    pub contact: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// A cashflow transaction as the phases see it. `cents` is signed by
/// direction and FX-adjusted where applicable.
#[derive(Debug, Clone)]
pub(crate) struct NormTxn {
    pub idx: usize,
    pub cents: i64,
    pub day: i64,
    pub contact: Option<String>,
    pub reference: Option<String>,
    pub fx: bool,
}

/// Round-half-away-from-zero conversion to integer cents. All later
/// amount comparisons happen on these integers; the float never
/// participates in a tolerance test directly.
pub(crate) fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Days since the common era; only differences matter.
pub(crate) fn day_number(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Lowercase, drop non-alphanumerics, collapse runs of whitespace.
/// Used for scoring and grouping, never for identity.
pub(crate) fn normalize_text(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn norm_field(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(normalize_text)
        .filter(|s| !s.is_empty())
}

pub(crate) fn normalize_inputs(
    records: &[BankRecord],
    transactions: &[CashflowTransaction],
    options: &MatchOptions,
) -> Result<(Vec<NormRecord>, Vec<NormTxn>), MatchError> {
    let recs = records
        .iter()
        .enumerate()
        .map(|(idx, r)| NormRecord {
            idx,
            cents: to_cents(r.amount),
            day: day_number(r.date),
            contact: norm_field(&r.contact),
            reference: norm_field(&r.reference),
            description: norm_field(&r.description),
        })
        .collect();

    let mut txns = Vec::with_capacity(transactions.len());
    for (idx, t) in transactions.iter().enumerate() {
        let mut cents = to_cents(t.amount) * t.direction.sign();
        if t.cross_currency {
            let code = t.currency.as_deref().ok_or_else(|| MatchError::MissingCurrency {
                id: t.id.clone(),
            })?;
            let rate = options.exchange_rates.get(code).copied().ok_or_else(|| {
                MatchError::MissingExchangeRate {
                    id: t.id.clone(),
                    currency: code.to_string(),
                }
            })?;
            cents = (cents as f64 * rate).round() as i64;
        }
        txns.push(NormTxn {
            idx,
            cents,
            day: day_number(t.date),
            contact: norm_field(&t.contact),
            reference: norm_field(&t.reference),
            fx: t.cross_currency,
        });
    }

    Ok((recs, txns))
}

//! Turns the cascade's raw state into the final `MatchResult`: ordering,
//! unmatched residuals, summary statistics, and the workings narrative.

use std::fmt::Write as _;
use std::time::Instant;

use ledgermatch_core::Money;

use crate::engine::Run;
use crate::types::{Confidence, MatchResult, MatchSummary, MatchType, PhaseTimings};

pub(crate) fn assemble(
    run: Run<'_>,
    mut timing: PhaseTimings,
    started: Instant,
    currency: Option<String>,
) -> MatchResult {
    let Run {
        records,
        transactions,
        recs,
        txns,
        record_pool,
        txn_pool,
        mut matches,
        phase_counts,
        ..
    } = run;

    // Exact matches first, everything else by descending score. The sort
    // is stable, so equal scores keep their phase commit order.
    matches.sort_by(|a, b| {
        let a_exact = u8::from(a.confidence != Confidence::Exact);
        let b_exact = u8::from(b.confidence != Confidence::Exact);
        a_exact.cmp(&b_exact).then(
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });

    // BTreeSet iteration is ascending, which is original input order.
    let unmatched_records: Vec<_> = record_pool.iter().map(|&i| records[i].clone()).collect();
    let unmatched_transactions: Vec<_> = txn_pool.iter().map(|&i| transactions[i].clone()).collect();

    let mut summary = MatchSummary {
        total_records: records.len(),
        total_transactions: transactions.len(),
        matched_records: records.len() - record_pool.len(),
        matched_transactions: transactions.len() - txn_pool.len(),
        unmatched_records: record_pool.len(),
        unmatched_transactions: txn_pool.len(),
        ..Default::default()
    };
    for proposal in &matches {
        match proposal.match_type {
            MatchType::OneToOne => summary.one_to_one += 1,
            MatchType::ManyToOne => summary.many_to_one += 1,
            MatchType::OneToMany => summary.one_to_many += 1,
            MatchType::ManyToMany => summary.many_to_many += 1,
        }
    }

    let matched_cents: i64 = recs
        .iter()
        .filter(|rec| !record_pool.contains(&rec.idx))
        .map(|rec| rec.cents.abs())
        .sum();
    let unmatched_rec_cents: i64 = recs
        .iter()
        .filter(|rec| record_pool.contains(&rec.idx))
        .map(|rec| rec.cents.abs())
        .sum();
    let unmatched_txn_cents: i64 = txns
        .iter()
        .filter(|txn| txn_pool.contains(&txn.idx))
        .map(|txn| txn.cents.abs())
        .sum();
    summary.matched_amount = Money::from_cents(matched_cents);
    summary.unmatched_record_amount = Money::from_cents(unmatched_rec_cents);
    summary.unmatched_transaction_amount = Money::from_cents(unmatched_txn_cents);
    summary.total_unmatched_amount = Money::from_cents(unmatched_rec_cents + unmatched_txn_cents);
    summary.match_rate = if records.is_empty() {
        0.0
    } else {
        let rate = summary.matched_records as f64 / records.len() as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    };

    let workings = narrative(&summary, &phase_counts);
    timing.total_ms = started.elapsed().as_secs_f64() * 1e3;

    MatchResult {
        matches,
        unmatched_records,
        unmatched_transactions,
        summary,
        timing,
        workings,
        currency,
    }
}

fn narrative(summary: &MatchSummary, phase_counts: &[usize; 5]) -> String {
    let labels = [
        "phase 1 exact 1:1",
        "phase 2 fuzzy 1:1",
        "phase 3 many-to-one",
        "phase 4 one-to-many",
        "phase 5 contact groups",
    ];
    let mut out = String::new();
    let _ = writeln!(out, "Reconciliation workings:");
    for (label, count) in labels.iter().zip(phase_counts) {
        let noun = if *count == 1 { "match" } else { "matches" };
        let _ = writeln!(out, "  {label:<24} {count} {noun}");
    }
    let _ = writeln!(
        out,
        "  matched {} of {} bank records ({:.2}%)",
        summary.matched_records, summary.total_records, summary.match_rate
    );
    let _ = writeln!(
        out,
        "  unmatched: {} records ({}), {} transactions ({})",
        summary.unmatched_records,
        summary.unmatched_record_amount,
        summary.unmatched_transactions,
        summary.unmatched_transaction_amount
    );
    out
}

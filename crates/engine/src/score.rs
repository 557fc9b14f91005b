//! Pure scoring functions. Everything here operates on pre-normalized
//! text (see `normalize`) and day deltas; nothing mutates state.

use std::collections::HashSet;

use crate::normalize::{NormRecord, NormTxn};
use crate::types::{Confidence, MatchType};

/// Text weight dominates: names and references are the strongest signal
/// the inputs carry.
const WEIGHT_TEXT: f64 = 0.55;
const WEIGHT_DATE: f64 = 0.30;
const WEIGHT_TYPE: f64 = 0.15;

/// Flat penalty when either side of a pairing is cross-currency.
const FX_PENALTY: f64 = 0.05;

/// Similarity of two normalized strings in [0, 1].
///
/// Empty on either side scores 0, as do two strings that are both under
/// four characters (too little signal to trust). Equality scores 1.0, a
/// substring containment 0.85, and anything else the ratio of shared
/// tokens to the smaller token set.
pub(crate) fn text_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.chars().count() < 4 && b.chars().count() < 4 {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if long.contains(short) {
        return 0.85;
    }

    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    let smaller = tokens_a.len().min(tokens_b.len());
    if smaller == 0 {
        return 0.0;
    }
    let shared = tokens_a.intersection(&tokens_b).count();
    shared as f64 / smaller as f64
}

/// Best similarity across every pairing of the record's text fields
/// against the transaction's, short-circuiting on a perfect hit.
pub(crate) fn cross_field_text_score(rec: &NormRecord, txn: &NormTxn) -> f64 {
    let mut best = 0.0;
    for r in [&rec.contact, &rec.reference, &rec.description] {
        let Some(r) = r else { continue };
        for t in [&txn.contact, &txn.reference] {
            let Some(t) = t else { continue };
            let s = text_similarity(r, t);
            if s >= 1.0 {
                return 1.0;
            }
            if s > best {
                best = s;
            }
        }
    }
    best
}

/// Cross-field score of one record against a group of transactions.
pub(crate) fn group_text_score_txns(rec: &NormRecord, txns: &[&NormTxn]) -> f64 {
    let mut best = 0.0;
    for txn in txns {
        let s = cross_field_text_score(rec, txn);
        if s >= 1.0 {
            return 1.0;
        }
        if s > best {
            best = s;
        }
    }
    best
}

/// Cross-field score of one transaction against a group of records.
pub(crate) fn group_text_score_records(recs: &[&NormRecord], txn: &NormTxn) -> f64 {
    let mut best = 0.0;
    for rec in recs {
        let s = cross_field_text_score(rec, txn);
        if s >= 1.0 {
            return 1.0;
        }
        if s > best {
            best = s;
        }
    }
    best
}

/// Best cross-field score over the full record-group x transaction-group
/// cross product.
pub(crate) fn group_pair_text_score(recs: &[&NormRecord], txns: &[&NormTxn]) -> f64 {
    let mut best = 0.0;
    for rec in recs {
        let s = group_text_score_txns(rec, txns);
        if s >= 1.0 {
            return 1.0;
        }
        if s > best {
            best = s;
        }
    }
    best
}

/// Exponential decay with a five-day half-life: 1.0 at zero distance.
pub(crate) fn date_score(delta_days: i64) -> f64 {
    (-(delta_days.abs() as f64) / 5.0).exp()
}

/// Occam's-razor prior: simpler explanations score higher, and larger
/// groups pay for their extra degrees of freedom.
pub(crate) fn type_score(match_type: MatchType, group_size: usize) -> f64 {
    let over = |base: usize| group_size.saturating_sub(base) as f64;
    match match_type {
        MatchType::OneToOne => 0.90,
        MatchType::ManyToOne => (0.70 - 0.05 * over(2)).max(0.40),
        MatchType::OneToMany => (0.60 - 0.05 * over(2)).max(0.35),
        MatchType::ManyToMany => (0.40 - 0.03 * over(3)).max(0.19),
    }
}

/// Weighted blend of the three signals. With no usable text signal the
/// remaining weights are renormalized so date and type still span [0, 1].
pub(crate) fn composite_score(text: f64, date: f64, type_: f64) -> f64 {
    if text == 0.0 {
        (date * WEIGHT_DATE + type_ * WEIGHT_TYPE) / (WEIGHT_DATE + WEIGHT_TYPE)
    } else {
        text * WEIGHT_TEXT + date * WEIGHT_DATE + type_ * WEIGHT_TYPE
    }
}

pub(crate) fn apply_fx_penalty(score: f64, fx: bool) -> f64 {
    if fx {
        (score - FX_PENALTY).max(0.0)
    } else {
        score
    }
}

/// Buckets a composite score. `Confidence::Exact` is reserved for the
/// hash-join phase and never produced here.
pub(crate) fn score_to_confidence(score: f64) -> Confidence {
    if score >= 0.70 {
        Confidence::High
    } else if score >= 0.40 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_similarity_empty_and_short_guards() {
        assert_eq!(text_similarity("", "acme"), 0.0);
        assert_eq!(text_similarity("acme", ""), 0.0);
        assert_eq!(text_similarity("ab", "ab"), 0.0);
        assert_eq!(text_similarity("ab", "cd"), 0.0);
        // The threshold counts characters, not bytes.
        assert_eq!(text_similarity("été", "été"), 0.0);
        // One short side is fine when the other is long enough.
        assert_eq!(text_similarity("abc", "abc plumbing"), 0.85);
    }

    #[test]
    fn text_similarity_equal_and_substring() {
        assert_eq!(text_similarity("acme ltd", "acme ltd"), 1.0);
        assert_eq!(text_similarity("acme", "acme holdings ltd"), 0.85);
        assert_eq!(text_similarity("acme holdings ltd", "acme"), 0.85);
    }

    #[test]
    fn text_similarity_token_overlap() {
        // {acme, uk} vs {acme, trading, ltd}: 1 shared / 2 smaller.
        let s = text_similarity("acme uk", "trading acme ltd");
        assert!((s - 0.5).abs() < 1e-9);
        assert_eq!(text_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn date_score_decays_exponentially() {
        assert_eq!(date_score(0), 1.0);
        assert!((date_score(5) - (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(date_score(-3), date_score(3));
        assert!(date_score(14) < date_score(7));
    }

    #[test]
    fn type_score_prefers_simpler_explanations() {
        assert_eq!(type_score(MatchType::OneToOne, 2), 0.90);
        assert_eq!(type_score(MatchType::ManyToOne, 2), 0.70);
        assert!((type_score(MatchType::ManyToOne, 4) - 0.60).abs() < 1e-12);
        assert_eq!(type_score(MatchType::ManyToOne, 10), 0.40);
        assert_eq!(type_score(MatchType::OneToMany, 2), 0.60);
        assert_eq!(type_score(MatchType::OneToMany, 10), 0.35);
        assert_eq!(type_score(MatchType::ManyToMany, 3), 0.40);
        assert_eq!(type_score(MatchType::ManyToMany, 20), 0.19);
    }

    #[test]
    fn composite_renormalizes_without_text() {
        let with_text = composite_score(1.0, 1.0, 1.0);
        assert!((with_text - 1.0).abs() < 1e-12);
        let no_text = composite_score(0.0, 1.0, 1.0);
        assert!((no_text - 1.0).abs() < 1e-12);
        let no_text_half = composite_score(0.0, 0.5, 0.9);
        assert!((no_text_half - (0.5 * 0.30 + 0.9 * 0.15) / 0.45).abs() < 1e-12);
    }

    #[test]
    fn fx_penalty_flat_and_floored() {
        assert_eq!(apply_fx_penalty(0.80, false), 0.80);
        assert!((apply_fx_penalty(0.80, true) - 0.75).abs() < 1e-12);
        assert_eq!(apply_fx_penalty(0.03, true), 0.0);
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(score_to_confidence(0.95), Confidence::High);
        assert_eq!(score_to_confidence(0.70), Confidence::High);
        assert_eq!(score_to_confidence(0.55), Confidence::Medium);
        assert_eq!(score_to_confidence(0.40), Confidence::Medium);
        assert_eq!(score_to_confidence(0.39), Confidence::Low);
    }
}

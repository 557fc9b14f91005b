//! The five-phase matching cascade. Phases run strictly in order over
//! two shrinking pools of unclaimed indices; an index claimed by an
//! earlier phase is invisible to every later one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use ledgermatch_core::{BankRecord, CashflowTransaction, Money};
use tracing::debug;

use crate::normalize::{normalize_inputs, to_cents, NormRecord, NormTxn};
use crate::report;
use crate::score::{
    apply_fx_penalty, composite_score, cross_field_text_score, date_score, group_pair_text_score,
    group_text_score_records, group_text_score_txns, score_to_confidence, type_score,
};
use crate::subset_sum::SubsetSumSearch;
use crate::types::{
    Confidence, MatchError, MatchOptions, MatchProposal, MatchResult, MatchType, PhaseTimings,
    SignalScores,
};

/// Fuzzy pairs scoring below this never make the candidate list.
const MIN_PAIR_SCORE: f64 = 0.15;

/// Greedy 1:1 assignments below this are not committed; their endpoints
/// stay in the pools so the group phases can explain them better.
const FUZZY_COMMIT_THRESHOLD: f64 = 0.70;

pub struct MatchEngine {
    options: MatchOptions,
}

impl MatchEngine {
    pub fn new(mut options: MatchOptions) -> Self {
        options.max_group_size = options.max_group_size.clamp(2, 10);
        Self { options }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Runs the full cascade. The only failure mode is a cross-currency
    /// transaction without a resolvable rate; everything else always
    /// produces a result.
    pub fn run(
        &self,
        records: &[BankRecord],
        transactions: &[CashflowTransaction],
    ) -> Result<MatchResult, MatchError> {
        let started = Instant::now();
        let (recs, txns) = normalize_inputs(records, transactions, &self.options)?;

        let mut run = Run {
            records,
            transactions,
            recs,
            txns,
            record_pool: (0..records.len()).collect(),
            txn_pool: (0..transactions.len()).collect(),
            matches: Vec::new(),
            phase_counts: [0; 5],
            tol_cents: to_cents(self.options.tolerance),
            date_window: self.options.date_window_days,
            max_group: self.options.max_group_size,
            fx_pct: self.options.fx_tolerance_pct,
            find_all: self.options.find_all,
            node_budget: self.options.max_dfs_nodes,
        };

        let mut timing = PhaseTimings::default();
        timing.exact_ms = run.timed_phase(0, Run::phase_exact);
        timing.fuzzy_ms = run.timed_phase(1, Run::phase_fuzzy);
        timing.many_to_one_ms = run.timed_phase(2, Run::phase_many_to_one);
        timing.one_to_many_ms = run.timed_phase(3, Run::phase_one_to_many);
        timing.many_to_many_ms = run.timed_phase(4, Run::phase_grouped);

        Ok(report::assemble(
            run,
            timing,
            started,
            self.options.currency.clone(),
        ))
    }
}

/// State for one invocation: the immutable inputs, their normalized
/// forms, and the two pools every phase consumes from.
pub(crate) struct Run<'a> {
    pub(crate) records: &'a [BankRecord],
    pub(crate) transactions: &'a [CashflowTransaction],
    pub(crate) recs: Vec<NormRecord>,
    pub(crate) txns: Vec<NormTxn>,
    pub(crate) record_pool: BTreeSet<usize>,
    pub(crate) txn_pool: BTreeSet<usize>,
    pub(crate) matches: Vec<MatchProposal>,
    pub(crate) phase_counts: [usize; 5],
    pub(crate) tol_cents: i64,
    pub(crate) date_window: i64,
    pub(crate) max_group: usize,
    pub(crate) fx_pct: f64,
    pub(crate) find_all: bool,
    pub(crate) node_budget: u64,
}

struct FuzzyPair {
    score: f64,
    signals: SignalScores,
    rec: usize,
    txn: usize,
}

impl Run<'_> {
    fn timed_phase(&mut self, phase: usize, f: fn(&mut Self)) -> f64 {
        let before = self.matches.len();
        let t = Instant::now();
        f(self);
        self.phase_counts[phase] = self.matches.len() - before;
        debug!(
            phase = phase + 1,
            committed = self.phase_counts[phase],
            records_left = self.record_pool.len(),
            transactions_left = self.txn_pool.len(),
            "phase complete"
        );
        t.elapsed().as_secs_f64() * 1e3
    }

    /// Tolerance actually applied to a comparison: widened to a fraction
    /// of the target amount when a cross-currency transaction is involved.
    fn effective_tolerance(&self, target_cents: i64, fx: bool) -> i64 {
        if fx {
            self.tol_cents
                .max((target_cents.abs() as f64 * self.fx_pct).round() as i64)
        } else {
            self.tol_cents
        }
    }

    /// Removes the claimed indices from the pools and emits a proposal
    /// referencing the original records and transactions.
    fn commit(
        &mut self,
        match_type: MatchType,
        confidence: Confidence,
        score: f64,
        signals: SignalScores,
        rec_idxs: Vec<usize>,
        txn_idxs: Vec<usize>,
        reason: String,
    ) {
        for i in &rec_idxs {
            self.record_pool.remove(i);
        }
        for i in &txn_idxs {
            self.txn_pool.remove(i);
        }

        let bank_cents: i64 = rec_idxs.iter().map(|&i| self.recs[i].cents).sum();
        let txn_cents: i64 = txn_idxs.iter().map(|&i| self.txns[i].cents).sum();
        let fx = txn_idxs.iter().any(|&i| self.txns[i].fx);
        let variance = Money::from_cents(bank_cents - txn_cents);

        self.matches.push(MatchProposal {
            match_type,
            confidence,
            score,
            bank_records: rec_idxs.iter().map(|&i| self.records[i].clone()).collect(),
            transactions: txn_idxs
                .iter()
                .map(|&i| self.transactions[i].clone())
                .collect(),
            bank_total: Money::from_cents(bank_cents),
            transaction_total: Money::from_cents(txn_cents),
            variance,
            fx_variance: fx.then_some(variance),
            signals,
            reason,
        });
    }

    /// Phase 1: hash join on (cents, normalized contact, day). Claims the
    /// first still-available record under each colliding bucket.
    fn phase_exact(&mut self) {
        let mut buckets: HashMap<(i64, String, i64), Vec<usize>> = HashMap::new();
        for &r in &self.record_pool {
            let rec = &self.recs[r];
            buckets
                .entry((rec.cents, rec.contact.clone().unwrap_or_default(), rec.day))
                .or_default()
                .push(r);
        }

        let probe: Vec<usize> = self.txn_pool.iter().copied().collect();
        for t in probe {
            let key = {
                let txn = &self.txns[t];
                (txn.cents, txn.contact.clone().unwrap_or_default(), txn.day)
            };
            let Some(bucket) = buckets.get_mut(&key) else {
                continue;
            };
            if bucket.is_empty() {
                continue;
            }
            let r = bucket.remove(0);
            self.commit(
                MatchType::OneToOne,
                Confidence::Exact,
                1.0,
                SignalScores {
                    text: 1.0,
                    date: 1.0,
                    type_: 1.0,
                },
                vec![r],
                vec![t],
                "exact amount, contact and date".to_string(),
            );
        }
    }

    /// Phase 2: greedy bipartite assignment over scored pairs, highest
    /// score first. Deliberately an approximation, not an optimal
    /// matching; the regret threshold is its safety valve.
    fn phase_fuzzy(&mut self) {
        let mut pairs: Vec<FuzzyPair> = Vec::new();
        for &r in &self.record_pool {
            let rec = &self.recs[r];
            for &t in &self.txn_pool {
                let txn = &self.txns[t];
                if rec.cents.signum() != txn.cents.signum() {
                    continue;
                }
                let dd = (rec.day - txn.day).abs();
                if dd > self.date_window {
                    continue;
                }
                let tol = self.effective_tolerance(rec.cents, txn.fx);
                if (rec.cents - txn.cents).abs() > tol {
                    continue;
                }

                let text = cross_field_text_score(rec, txn);
                let date = date_score(dd);
                let type_ = type_score(MatchType::OneToOne, 2);
                let score = apply_fx_penalty(composite_score(text, date, type_), txn.fx);
                if score < MIN_PAIR_SCORE {
                    continue;
                }
                pairs.push(FuzzyPair {
                    score,
                    signals: SignalScores { text, date, type_ },
                    rec: r,
                    txn: t,
                });
            }
        }

        pairs.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rec.cmp(&b.rec))
                .then_with(|| a.txn.cmp(&b.txn))
        });

        let mut taken_recs: BTreeSet<usize> = BTreeSet::new();
        let mut taken_txns: BTreeSet<usize> = BTreeSet::new();
        for pair in pairs {
            if taken_recs.contains(&pair.rec) || taken_txns.contains(&pair.txn) {
                continue;
            }
            taken_recs.insert(pair.rec);
            taken_txns.insert(pair.txn);
            if pair.score < FUZZY_COMMIT_THRESHOLD {
                // Regret: leave both endpoints in the pools for the
                // multi-item phases.
                continue;
            }
            let reason = format!("fuzzy 1:1 (score {:.2})", pair.score);
            self.commit(
                MatchType::OneToOne,
                score_to_confidence(pair.score),
                pair.score,
                pair.signals,
                vec![pair.rec],
                vec![pair.txn],
                reason,
            );
        }
    }

    /// Phase 3: for each remaining record, search for 2..max_group
    /// same-sign transactions summing to its amount. Smallest subset
    /// wins; ties break on composite score.
    fn phase_many_to_one(&mut self) {
        let rec_idxs: Vec<usize> = self.record_pool.iter().copied().collect();
        for r in rec_idxs {
            let rec = &self.recs[r];
            let mut cands: Vec<(usize, i64)> = Vec::new();
            let mut fx_any = false;
            for &t in &self.txn_pool {
                let txn = &self.txns[t];
                if rec.cents.signum() != txn.cents.signum() {
                    continue;
                }
                if (rec.day - txn.day).abs() > self.date_window {
                    continue;
                }
                cands.push((t, txn.cents.abs()));
                fx_any |= txn.fx;
            }
            if cands.len() < 2 {
                continue;
            }

            let target = rec.cents.abs();
            let tol = self.effective_tolerance(target, fx_any);
            let search =
                SubsetSumSearch::new(target, tol, self.max_group, self.find_all, self.node_budget);
            let outcome = search.run(&cands);
            if outcome.truncated {
                debug!(
                    record = %self.records[r].id,
                    nodes = outcome.nodes,
                    "subset search budget exhausted, keeping partial results"
                );
            }

            let mut best: Option<(Vec<usize>, f64, SignalScores)> = None;
            for subset in &outcome.subsets {
                // The search ran with the widened window; only subsets
                // that actually contain a cross-currency transaction may
                // use it. All-domestic subsets re-check the base tolerance.
                let fx = subset.iter().any(|&i| self.txns[i].fx);
                let sum: i64 = subset.iter().map(|&i| self.txns[i].cents.abs()).sum();
                if (sum - target).abs() > self.effective_tolerance(target, fx) {
                    continue;
                }
                let (score, signals) = self.group_score_txns(r, subset);
                let better = match &best {
                    None => true,
                    Some((chosen, chosen_score, _)) => {
                        subset.len() < chosen.len()
                            || (subset.len() == chosen.len() && score > *chosen_score)
                    }
                };
                if better {
                    best = Some((subset.clone(), score, signals));
                }
            }

            if let Some((subset, score, signals)) = best {
                let reason = format!(
                    "{} transactions sum to record {} within tolerance",
                    subset.len(),
                    self.records[r].id
                );
                self.commit(
                    MatchType::ManyToOne,
                    score_to_confidence(score),
                    score,
                    signals,
                    vec![r],
                    subset,
                    reason,
                );
            }
        }
    }

    /// Phase 4: the mirror of phase 3, records summing to a transaction.
    /// Tie-break is fewest-items only (first minimal subset in search
    /// order) — a deliberate asymmetry versus phase 3.
    fn phase_one_to_many(&mut self) {
        let txn_idxs: Vec<usize> = self.txn_pool.iter().copied().collect();
        for t in txn_idxs {
            let txn = &self.txns[t];
            let mut cands: Vec<(usize, i64)> = Vec::new();
            for &r in &self.record_pool {
                let rec = &self.recs[r];
                if rec.cents.signum() != txn.cents.signum() {
                    continue;
                }
                if (rec.day - txn.day).abs() > self.date_window {
                    continue;
                }
                cands.push((r, rec.cents.abs()));
            }
            if cands.len() < 2 {
                continue;
            }

            let target = txn.cents.abs();
            let tol = self.effective_tolerance(target, txn.fx);
            let search =
                SubsetSumSearch::new(target, tol, self.max_group, self.find_all, self.node_budget);
            let outcome = search.run(&cands);
            if outcome.truncated {
                debug!(
                    transaction = %self.transactions[t].id,
                    nodes = outcome.nodes,
                    "subset search budget exhausted, keeping partial results"
                );
            }

            let mut best: Option<Vec<usize>> = None;
            for subset in outcome.subsets {
                if best.as_ref().map_or(true, |chosen| subset.len() < chosen.len()) {
                    best = Some(subset);
                }
            }

            if let Some(subset) = best {
                let (score, signals) = self.group_score_records(t, &subset);
                let reason = format!(
                    "{} records sum to transaction {} within tolerance",
                    subset.len(),
                    self.transactions[t].id
                );
                self.commit(
                    MatchType::OneToMany,
                    score_to_confidence(score),
                    score,
                    signals,
                    subset,
                    vec![t],
                    reason,
                );
            }
        }
    }

    /// Phase 5: bucket the leftovers by normalized contact and search
    /// subset-vs-subset within each bucket. Items without a contact are
    /// excluded — grouping them blindly is unsafe.
    fn phase_grouped(&mut self) {
        let mut buckets: BTreeMap<String, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for &r in &self.record_pool {
            if let Some(contact) = &self.recs[r].contact {
                buckets.entry(contact.clone()).or_default().0.push(r);
            }
        }
        for &t in &self.txn_pool {
            if let Some(contact) = &self.txns[t].contact {
                buckets.entry(contact.clone()).or_default().1.push(t);
            }
        }

        for (contact, (rec_side, txn_side)) in buckets {
            if rec_side.is_empty() || txn_side.is_empty() {
                continue;
            }
            if rec_side.len() + txn_side.len() > 2 * self.max_group {
                continue;
            }

            let rec_subsets = subsets_up_to(&rec_side, self.max_group);
            let txn_subsets = subsets_up_to(&txn_side, self.max_group);

            let mut best: Option<GroupCandidate> = None;
            for rsub in &rec_subsets {
                let rsum: i64 = rsub.iter().map(|&i| self.recs[i].cents).sum();
                for tsub in &txn_subsets {
                    let combined = rsub.len() + tsub.len();
                    // A 1x1 pair is phase 1/2 territory.
                    if combined < 3 {
                        continue;
                    }
                    let tsum: i64 = tsub.iter().map(|&i| self.txns[i].cents).sum();
                    let fx = tsub.iter().any(|&i| self.txns[i].fx);
                    let tol = self.effective_tolerance(rsum, fx);
                    if (rsum - tsum).abs() > tol {
                        continue;
                    }

                    let candidate = self.score_group_pair(rsub, tsub, fx);
                    let better = match &best {
                        None => true,
                        Some(chosen) => {
                            candidate.score > chosen.score
                                || (candidate.score == chosen.score
                                    && combined < chosen.combined())
                        }
                    };
                    if better {
                        best = Some(candidate);
                    }
                }
            }

            if let Some(chosen) = best {
                let reason = format!(
                    "contact group '{}': {} records vs {} transactions",
                    contact,
                    chosen.rec_idxs.len(),
                    chosen.txn_idxs.len()
                );
                self.commit(
                    chosen.match_type,
                    score_to_confidence(chosen.score),
                    chosen.score,
                    chosen.signals,
                    chosen.rec_idxs,
                    chosen.txn_idxs,
                    reason,
                );
            }
        }
    }

    fn group_score_txns(&self, r: usize, subset: &[usize]) -> (f64, SignalScores) {
        let rec = &self.recs[r];
        let group: Vec<&NormTxn> = subset.iter().map(|&t| &self.txns[t]).collect();
        let text = group_text_score_txns(rec, &group);
        let nearest = group
            .iter()
            .map(|t| (rec.day - t.day).abs())
            .min()
            .unwrap_or(0);
        let date = date_score(nearest);
        let type_ = type_score(MatchType::ManyToOne, subset.len());
        let fx = group.iter().any(|t| t.fx);
        let score = apply_fx_penalty(composite_score(text, date, type_), fx);
        (score, SignalScores { text, date, type_ })
    }

    fn group_score_records(&self, t: usize, subset: &[usize]) -> (f64, SignalScores) {
        let txn = &self.txns[t];
        let group: Vec<&NormRecord> = subset.iter().map(|&r| &self.recs[r]).collect();
        let text = group_text_score_records(&group, txn);
        let nearest = group
            .iter()
            .map(|r| (r.day - txn.day).abs())
            .min()
            .unwrap_or(0);
        let date = date_score(nearest);
        let type_ = type_score(MatchType::OneToMany, subset.len());
        let score = apply_fx_penalty(composite_score(text, date, type_), txn.fx);
        (score, SignalScores { text, date, type_ })
    }

    fn score_group_pair(&self, rsub: &[usize], tsub: &[usize], fx: bool) -> GroupCandidate {
        let rec_group: Vec<&NormRecord> = rsub.iter().map(|&r| &self.recs[r]).collect();
        let txn_group: Vec<&NormTxn> = tsub.iter().map(|&t| &self.txns[t]).collect();

        // Label by shape: one-sided groupings reduce to N:1 or 1:N even
        // when found via the contact buckets.
        let (match_type, size) = if rsub.len() > 1 && tsub.len() > 1 {
            (MatchType::ManyToMany, rsub.len() + tsub.len())
        } else if rsub.len() == 1 {
            (MatchType::ManyToOne, tsub.len())
        } else {
            (MatchType::OneToMany, rsub.len())
        };

        let text = group_pair_text_score(&rec_group, &txn_group);
        let nearest = rec_group
            .iter()
            .flat_map(|r| txn_group.iter().map(move |t| (r.day - t.day).abs()))
            .min()
            .unwrap_or(0);
        let date = date_score(nearest);
        let type_ = type_score(match_type, size);
        let score = apply_fx_penalty(composite_score(text, date, type_), fx);

        GroupCandidate {
            match_type,
            score,
            signals: SignalScores { text, date, type_ },
            rec_idxs: rsub.to_vec(),
            txn_idxs: tsub.to_vec(),
        }
    }
}

struct GroupCandidate {
    match_type: MatchType,
    score: f64,
    signals: SignalScores,
    rec_idxs: Vec<usize>,
    txn_idxs: Vec<usize>,
}

impl GroupCandidate {
    fn combined(&self) -> usize {
        self.rec_idxs.len() + self.txn_idxs.len()
    }
}

/// All non-empty subsets of `items` up to `max_len` elements, in mask
/// order. Bucket sizes are capped well under 2^20 by the caller.
fn subsets_up_to(items: &[usize], max_len: usize) -> Vec<Vec<usize>> {
    let n = items.len();
    let mut out = Vec::new();
    for mask in 1u32..(1u32 << n) {
        if (mask.count_ones() as usize) > max_len {
            continue;
        }
        out.push(
            items
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, &idx)| idx)
                .collect(),
        );
    }
    out
}

//! Bounded depth-first subset-sum search: find subsets of monetary
//! amounts whose sum lands within a tolerance window of a target.
//! Shared by the many-to-one and one-to-many phases.

/// One search, configured once and run against a candidate list.
///
/// Candidates are `(caller index, cents)` pairs with non-negative cents;
/// callers pass absolute values after filtering for matching sign.
#[derive(Debug, Clone)]
pub struct SubsetSumSearch {
    target: i64,
    tolerance: i64,
    max_k: usize,
    find_all: bool,
    node_budget: u64,
}

/// What a search produced. `truncated` means the node budget ran out and
/// the subset list is best-effort rather than exhaustive.
#[derive(Debug, Clone)]
pub struct SubsetSumOutcome {
    pub subsets: Vec<Vec<usize>>,
    pub nodes: u64,
    pub truncated: bool,
}

struct DfsState {
    nodes: u64,
    truncated: bool,
    stack: Vec<usize>,
    found: Vec<Vec<usize>>,
}

impl SubsetSumSearch {
    /// `max_k` is clamped to 2..=10; `node_budget` of 0 means unlimited.
    pub fn new(target: i64, tolerance: i64, max_k: usize, find_all: bool, node_budget: u64) -> Self {
        Self {
            target,
            tolerance,
            max_k: max_k.clamp(2, 10),
            find_all,
            node_budget,
        }
    }

    pub fn run(&self, candidates: &[(usize, i64)]) -> SubsetSumOutcome {
        // Descending order makes the overshoot/undershoot prunes bite
        // early; index tie-break keeps the walk deterministic.
        let mut items: Vec<(usize, i64)> = candidates.to_vec();
        items.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        // suffix[i] = sum of cents from position i to the end.
        let mut suffix = vec![0i64; items.len() + 1];
        for i in (0..items.len()).rev() {
            suffix[i] = suffix[i + 1] + items[i].1;
        }

        let mut state = DfsState {
            nodes: 0,
            truncated: false,
            stack: Vec::with_capacity(self.max_k),
            found: Vec::new(),
        };
        self.dfs(&items, &suffix, 0, 0, &mut state);

        SubsetSumOutcome {
            subsets: state.found,
            nodes: state.nodes,
            truncated: state.truncated,
        }
    }

    /// Take-or-skip descent. Returns true when the search should stop
    /// outright (first hit with `find_all` off, or budget exhausted).
    fn dfs(&self, items: &[(usize, i64)], suffix: &[i64], start: usize, sum: i64, st: &mut DfsState) -> bool {
        st.nodes += 1;
        if self.node_budget != 0 && st.nodes > self.node_budget {
            st.truncated = true;
            return true;
        }

        if st.stack.len() >= 2 && (sum - self.target).abs() <= self.tolerance {
            st.found.push(st.stack.iter().map(|&pos| items[pos].0).collect());
            if !self.find_all {
                return true;
            }
        }
        if st.stack.len() == self.max_k {
            return false;
        }

        for pos in start..items.len() {
            // Overshoot: this item is too big, but later (smaller) ones
            // may still fit.
            if sum + items[pos].1 > self.target + self.tolerance {
                continue;
            }
            // Undershoot: even taking everything left falls short, and
            // the remainder only shrinks from here.
            if sum + suffix[pos] < self.target - self.tolerance {
                break;
            }
            st.stack.push(pos);
            let stop = self.dfs(items, suffix, pos + 1, sum + items[pos].1, st);
            st.stack.pop();
            if stop {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(values: &[i64]) -> Vec<(usize, i64)> {
        values.iter().copied().enumerate().collect()
    }

    #[test]
    fn finds_a_pair_summing_to_target() {
        let search = SubsetSumSearch::new(300, 0, 5, false, 0);
        let out = search.run(&cents(&[100, 250, 200]));
        assert_eq!(out.subsets.len(), 1);
        let mut subset = out.subsets[0].clone();
        subset.sort();
        assert_eq!(subset, vec![0, 2]);
        assert!(!out.truncated);
    }

    #[test]
    fn never_returns_singletons() {
        let search = SubsetSumSearch::new(500, 0, 5, true, 0);
        let out = search.run(&cents(&[500, 250, 250]));
        for subset in &out.subsets {
            assert!(subset.len() >= 2);
        }
        assert_eq!(out.subsets.len(), 1);
    }

    #[test]
    fn respects_tolerance_window() {
        let search = SubsetSumSearch::new(1000, 5, 5, true, 0);
        let out = search.run(&cents(&[400, 597, 603, 300]));
        for subset in &out.subsets {
            let total: i64 = subset.iter().map(|&i| [400, 597, 603, 300][i]).sum();
            assert!((total - 1000).abs() <= 5, "sum {total} outside tolerance");
        }
        // 400+597=997 and 400+603=1003 clear the window, 400+300 does not.
        assert_eq!(out.subsets.len(), 2);
    }

    #[test]
    fn find_all_enumerates_every_subset() {
        let search = SubsetSumSearch::new(10, 0, 5, true, 0);
        let out = search.run(&cents(&[5, 5, 5]));
        assert_eq!(out.subsets.len(), 3);
    }

    #[test]
    fn first_hit_mode_stops_early() {
        let all = SubsetSumSearch::new(10, 0, 5, true, 0).run(&cents(&[5, 5, 5]));
        let first = SubsetSumSearch::new(10, 0, 5, false, 0).run(&cents(&[5, 5, 5]));
        assert_eq!(first.subsets.len(), 1);
        assert!(first.nodes < all.nodes);
    }

    #[test]
    fn max_k_bounds_subset_size() {
        let search = SubsetSumSearch::new(40, 0, 3, true, 0);
        let out = search.run(&cents(&[10, 10, 10, 10]));
        assert!(out.subsets.is_empty());

        let search = SubsetSumSearch::new(30, 0, 3, true, 0);
        let out = search.run(&cents(&[10, 10, 10, 10]));
        assert_eq!(out.subsets.len(), 4);
    }

    #[test]
    fn max_k_is_clamped() {
        // Asking for size-1 groups still allows pairs.
        let search = SubsetSumSearch::new(20, 0, 1, true, 0);
        let out = search.run(&cents(&[10, 10]));
        assert_eq!(out.subsets.len(), 1);
    }

    #[test]
    fn node_budget_truncates_without_error() {
        let values: Vec<i64> = (0..20).map(|i| 100 + i).collect();
        let candidates = cents(&values);
        let search = SubsetSumSearch::new(1000, 0, 10, true, 10);
        let out = search.run(&candidates);
        assert!(out.truncated);
        assert!(out.nodes <= 11);
    }

    #[test]
    fn unsatisfiable_target_returns_empty() {
        let search = SubsetSumSearch::new(10_000, 0, 5, true, 0);
        let out = search.run(&cents(&[100, 200, 300]));
        assert!(out.subsets.is_empty());
        assert!(!out.truncated);
    }
}

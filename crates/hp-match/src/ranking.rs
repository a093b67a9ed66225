//! Tie-break policy shared by every ranking step.
//!
//! Higher score wins; on equal score more satisfied required rules wins; on a
//! full tie the candidate that came first in input order wins. Sorting is
//! stable so the last rule never depends on iteration order of a hash map.

use std::cmp::Reverse;

use crate::evaluator::MatchOutcome;

/// Ordering key of a match outcome. Greater is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RankKey {
    pub score: u32,
    pub required_satisfied: usize,
}

/// A candidate with its evaluation and its position in the input.
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub position: usize,
    pub item: T,
    pub outcome: MatchOutcome,
}

/// Acceptable candidates (all required rules satisfied), best first.
pub fn rank<T>(candidates: impl IntoIterator<Item = (T, MatchOutcome)>) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .enumerate()
        .filter(|(_, (_, outcome))| outcome.all_required_satisfied)
        .map(|(position, (item, outcome))| Ranked {
            position,
            item,
            outcome,
        })
        .collect();
    ranked.sort_by_key(|r| Reverse(r.outcome.rank_key()));
    ranked
}

/// Every candidate: acceptable ones first, each group best first.
pub fn order<T>(candidates: impl IntoIterator<Item = (T, MatchOutcome)>) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = candidates
        .into_iter()
        .enumerate()
        .map(|(position, (item, outcome))| Ranked {
            position,
            item,
            outcome,
        })
        .collect();
    ranked.sort_by_key(|r| {
        Reverse((r.outcome.all_required_satisfied, r.outcome.rank_key()))
    });
    ranked
}

/// The winning candidate, if any is acceptable.
pub fn best<T>(candidates: impl IntoIterator<Item = (T, MatchOutcome)>) -> Option<Ranked<T>> {
    rank(candidates).into_iter().next()
}

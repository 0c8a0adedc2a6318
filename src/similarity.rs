//! Signature similarity in `[0, 1]`.
//!
//! Two metrics are available:
//! - [`SimilarityMetric::Jaccard`]: blocks as a set, |A ∩ B| / |A ∪ B|.
//! - [`SimilarityMetric::Sequence`]: Ratcliff/Obershelp over the block
//!   sequence, 2·M / (|A| + |B|) where M is the total length of the longest
//!   common runs found recursively on either side of each match.
//!
//! Sequence is the default. Both score two empty signatures 1.0 and an empty
//! against a non-empty signature 0.0.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::signature::{DigestBlock, MasterBlock, Signature};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Jaccard,
    #[default]
    Sequence,
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Jaccard => f.write_str("jaccard"),
            SimilarityMetric::Sequence => f.write_str("sequence"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jaccard" | "set" => Ok(SimilarityMetric::Jaccard),
            "sequence" | "ratcliff" => Ok(SimilarityMetric::Sequence),
            other => Err(format!("unknown similarity metric: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityEngine {
    metric: SimilarityMetric,
}

/// A position after wildcard resolution. `Wild(i)` stands for two wildcards
/// facing each other at index `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Token {
    Block(DigestBlock),
    Wild(usize),
}

impl SimilarityEngine {
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn score(&self, a: &Signature, b: &Signature) -> f64 {
        self.score_slices(a.blocks(), b.blocks())
    }

    /// Wildcard-aware comparison of two patterns (exact signatures or
    /// masters). A wildcard takes the other side's value at the same index,
    /// two wildcards match each other, and a wildcard with nothing opposite
    /// is dropped. A non-empty pattern with no exact position carries no
    /// evidence and scores 0.0 against anything.
    pub fn score_pattern(&self, a: &[MasterBlock], b: &[MasterBlock]) -> f64 {
        if all_wildcards(a) || all_wildcards(b) {
            return 0.0;
        }
        let (ta, tb) = resolve_pair(a, b);
        self.score_slices(&ta, &tb)
    }

    fn score_slices<T: Eq + Hash>(&self, a: &[T], b: &[T]) -> f64 {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }
        match self.metric {
            SimilarityMetric::Jaccard => jaccard(a, b),
            SimilarityMetric::Sequence => ratcliff_obershelp(a, b),
        }
    }
}

fn all_wildcards(pattern: &[MasterBlock]) -> bool {
    !pattern.is_empty() && pattern.iter().all(|b| matches!(b, MasterBlock::Wildcard))
}

fn resolve_pair(a: &[MasterBlock], b: &[MasterBlock]) -> (Vec<Token>, Vec<Token>) {
    fn resolve(own: &[MasterBlock], other: &[MasterBlock]) -> Vec<Token> {
        own.iter()
            .enumerate()
            .filter_map(|(i, block)| match (block, other.get(i)) {
                (MasterBlock::Exact(v), _) => Some(Token::Block(*v)),
                (MasterBlock::Wildcard, Some(MasterBlock::Exact(v))) => Some(Token::Block(*v)),
                (MasterBlock::Wildcard, Some(MasterBlock::Wildcard)) => Some(Token::Wild(i)),
                (MasterBlock::Wildcard, None) => None,
            })
            .collect()
    }
    (resolve(a, b), resolve(b, a))
}

fn jaccard<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    let sa: HashSet<&T> = a.iter().collect();
    let sb: HashSet<&T> = b.iter().collect();
    let intersection = sa.intersection(&sb).count();
    let union = sa.len() + sb.len() - intersection;
    intersection as f64 / union as f64
}

fn ratcliff_obershelp<T: Eq>(a: &[T], b: &[T]) -> f64 {
    2.0 * matched_len(a, b) as f64 / (a.len() + b.len()) as f64
}

/// Total length of matching runs, found by taking the longest common run and
/// recursing on the unmatched ranges to its left and right.
fn matched_len<T: Eq>(a: &[T], b: &[T]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
/// Ties go to the run that ends first in `a`, then in `b`.
fn longest_match<T: Eq>(
    a: &[T],
    b: &[T],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let run = prev[col - 1] + 1;
                cur[col] = run;
                if run > best_k {
                    best_k = run;
                    best_i = i + 1 - run;
                    best_j = j + 1 - run;
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (best_i, best_j, best_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::MasterSignature;

    fn sig(values: &[u32]) -> Signature {
        Signature::new(values.iter().copied().map(DigestBlock::new).collect())
    }

    fn engines() -> [SimilarityEngine; 2] {
        [
            SimilarityEngine::new(SimilarityMetric::Jaccard),
            SimilarityEngine::new(SimilarityMetric::Sequence),
        ]
    }

    #[test]
    fn identical_scores_one() {
        let s = sig(&[1, 2, 3, 2, 5]);
        for engine in engines() {
            assert_eq!(engine.score(&s, &s), 1.0);
        }
    }

    #[test]
    fn empty_signatures() {
        let empty = Signature::empty();
        let full = sig(&[1, 2]);
        for engine in engines() {
            assert_eq!(engine.score(&empty, &empty), 1.0);
            assert_eq!(engine.score(&empty, &full), 0.0);
            assert_eq!(engine.score(&full, &empty), 0.0);
        }
    }

    #[test]
    fn disjoint_scores_zero() {
        for engine in engines() {
            assert_eq!(engine.score(&sig(&[1, 2, 3]), &sig(&[4, 5, 6])), 0.0);
        }
    }

    #[test]
    fn jaccard_collapses_duplicates_and_ignores_order() {
        let engine = SimilarityEngine::new(SimilarityMetric::Jaccard);
        assert_eq!(engine.score(&sig(&[1, 1, 2, 3]), &sig(&[3, 2, 1])), 1.0);
        // {1,2,3} vs {2,3,4}: 2 / 4
        assert_eq!(engine.score(&sig(&[1, 2, 3]), &sig(&[2, 3, 4])), 0.5);
    }

    #[test]
    fn sequence_is_order_sensitive() {
        let engine = SimilarityEngine::new(SimilarityMetric::Sequence);
        // only one of the three can be matched in order
        let score = engine.score(&sig(&[1, 2, 3]), &sig(&[3, 2, 1]));
        assert!((score - 2.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn sequence_recurses_around_longest_run() {
        let engine = SimilarityEngine::new(SimilarityMetric::Sequence);
        // a = 1 2 3 4 5 6, b = 1 2 9 4 5 6: runs "4 5 6" then "1 2" => 5
        let score = engine.score(&sig(&[1, 2, 3, 4, 5, 6]), &sig(&[1, 2, 9, 4, 5, 6]));
        assert!((score - 10.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn sequence_handles_insertion() {
        let engine = SimilarityEngine::new(SimilarityMetric::Sequence);
        let a = sig(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let b = sig(&[1, 2, 3, 4, 100, 101, 5, 6, 7, 8]);
        let score = engine.score(&a, &b);
        assert!((score - 16.0 / 18.0).abs() < 1e-12);
    }

    #[test]
    fn symmetric() {
        let a = sig(&[5, 1, 2, 7, 3, 3]);
        let b = sig(&[1, 2, 3, 8]);
        for engine in engines() {
            assert_eq!(engine.score(&a, &b), engine.score(&b, &a));
        }
    }

    #[test]
    fn pattern_wildcards_match_member() {
        let member = sig(&[1, 2, 3]);
        let master: MasterSignature = "00000001 * 00000003 * *".parse().unwrap();
        for engine in engines() {
            assert_eq!(engine.score_pattern(master.blocks(), &member.to_pattern()), 1.0);
        }
    }

    #[test]
    fn all_wildcard_pattern_matches_nothing() {
        let master: MasterSignature = "* * * * *".parse().unwrap();
        for engine in engines() {
            assert_eq!(engine.score_pattern(master.blocks(), &sig(&[9000, 9001, 9002]).to_pattern()), 0.0);
            assert_eq!(engine.score_pattern(&sig(&[1, 2]).to_pattern(), master.blocks()), 0.0);
            assert_eq!(engine.score_pattern(master.blocks(), master.blocks()), 0.0);
        }
    }

    #[test]
    fn pattern_exact_positions_still_count() {
        let master: MasterSignature = "00000001 * 00000003 00000004".parse().unwrap();
        let other = sig(&[7, 8, 9, 4]);
        let engine = SimilarityEngine::new(SimilarityMetric::Sequence);
        // resolved: [1, 8, 3, 4] vs [7, 8, 9, 4] => two single matches
        let score = engine.score_pattern(master.blocks(), &other.to_pattern());
        assert!((score - 4.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn pattern_without_wildcards_equals_score() {
        let a = sig(&[1, 2, 3, 4]);
        let b = sig(&[2, 3, 9]);
        for engine in engines() {
            assert_eq!(
                engine.score_pattern(&a.to_pattern(), &b.to_pattern()),
                engine.score(&a, &b)
            );
        }
    }

    #[test]
    fn metric_parses() {
        assert_eq!("Jaccard".parse::<SimilarityMetric>(), Ok(SimilarityMetric::Jaccard));
        assert_eq!("sequence".parse::<SimilarityMetric>(), Ok(SimilarityMetric::Sequence));
        assert!("cosine".parse::<SimilarityMetric>().is_err());
    }
}

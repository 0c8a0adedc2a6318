//! Matching a signature against a signature database.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::error::{GlacierError, Result};
use crate::signature::Signature;
use crate::similarity::SimilarityEngine;
use crate::store::SignatureRecord;

pub const DEFAULT_SCAN_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanMatch {
    pub id: String,
    pub score: f64,
    pub is_master: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    engine: SimilarityEngine,
    threshold: f64,
}

impl Scanner {
    pub fn new(engine: SimilarityEngine, threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(GlacierError::config(format!(
                "scan threshold must be in (0, 1], got {threshold}"
            )));
        }
        Ok(Self { engine, threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Every record scoring at least the threshold, best first. Equal scores
    /// are ordered by id.
    pub fn scan(&self, signature: &Signature, records: &[SignatureRecord]) -> Vec<ScanMatch> {
        let pattern = signature.to_pattern();
        let mut matches: Vec<ScanMatch> = records
            .par_iter()
            .filter_map(|record| {
                let score = self.engine.score_pattern(&pattern, &record.signature.pattern());
                (score >= self.threshold).then(|| ScanMatch {
                    id: record.id.clone(),
                    score,
                    is_master: record.signature.is_master(),
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches
    }

    pub fn best_match(&self, signature: &Signature, records: &[SignatureRecord]) -> Option<ScanMatch> {
        self.scan(signature, records).into_iter().next()
    }
}

/// Tally for scanning a whole folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub errors: usize,
}

impl ScanSummary {
    pub fn record_match(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        } else {
            self.unmatched += 1;
        }
    }

    pub fn record_error(&mut self) {
        self.total += 1;
        self.errors += 1;
    }

    /// Matched files as a percentage of all files scanned.
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.matched as f64 * 100.0 / self.total as f64
    }
}

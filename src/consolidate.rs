//! Greedy clustering of near-duplicate signatures into wildcard masters.
//!
//! The first unclustered record seeds a cluster; every other unclustered
//! record scoring at least `threshold` against the seed joins it. Seed scores
//! are computed in parallel, but assignment walks the records in store order,
//! so the partition is the same on every run. Clusters of two or more become
//! one [`MasterSignature`]; lone records are left as they are.
//!
//! Records already covered by a reference set (typically the masters of a
//! separate database) can be set aside before clustering; they are counted
//! as ignored and left untouched in the store.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GlacierError, Result};
use crate::signature::{MasterBlock, MasterSignature};
use crate::similarity::SimilarityEngine;
use crate::store::{RecordMetadata, SignatureRecord, SignatureStore, StoredSignature};

pub const DEFAULT_THRESHOLD: f64 = 0.8;

const FALLBACK_BASE_NAME: &str = "Consolidated.Signature";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidateMode {
    /// Commit every proposed cluster.
    Auto,
    /// Ask a reviewer about each cluster before committing.
    #[default]
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
    pub threshold: f64,
    pub mode: ConsolidateMode,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            mode: ConsolidateMode::default(),
        }
    }
}

impl ConsolidateConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(GlacierError::config(format!(
                "consolidation threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// A proposed master and the records it would replace.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub master: MasterSignature,
    pub members: Vec<SignatureRecord>,
}

impl Cluster {
    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    /// Original record ids covered by the master, looking through any older
    /// masters that were merged again.
    pub fn covered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .members
            .iter()
            .flat_map(|m| match &m.signature {
                StoredSignature::Master(_) if !m.metadata.members.is_empty() => m.metadata.members.clone(),
                _ => vec![m.id.clone()],
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidationPlan {
    pub clusters: Vec<Cluster>,
    pub singletons: Vec<SignatureRecord>,
    /// Records matching a reference signature; never clustered.
    pub ignored: Vec<SignatureRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationSummary {
    pub masters_created: usize,
    pub signatures_merged: usize,
    pub clusters_rejected: usize,
    pub singletons: usize,
    pub ignored: usize,
}

impl ConsolidationPlan {
    pub fn masters(&self) -> impl Iterator<Item = &MasterSignature> {
        self.clusters.iter().map(|c| &c.master)
    }

    /// Drop a proposed cluster; its members stay as they are.
    pub fn reject(&mut self, index: usize) -> Option<Cluster> {
        if index >= self.clusters.len() {
            return None;
        }
        let cluster = self.clusters.remove(index);
        self.singletons.extend(cluster.members.iter().cloned());
        self.singletons.sort_by(|a, b| a.id.cmp(&b.id));
        Some(cluster)
    }

    /// Replace each cluster's members with its master, then compact.
    pub fn apply<S: SignatureStore + ?Sized>(&self, store: &mut S) -> Result<ConsolidationSummary> {
        let mut summary = ConsolidationSummary {
            singletons: self.singletons.len(),
            ignored: self.ignored.len(),
            ..ConsolidationSummary::default()
        };
        for cluster in &self.clusters {
            let metadata = RecordMetadata {
                members: cluster.covered_ids(),
                ..RecordMetadata::default()
            };
            store.replace(&cluster.member_ids(), &cluster.name, cluster.master.clone(), metadata)?;
            summary.masters_created += 1;
            summary.signatures_merged += cluster.members.len();
            info!(
                master = %cluster.name,
                members = cluster.members.len(),
                wildcards = cluster.master.wildcard_count(),
                "consolidated cluster"
            );
        }
        store.compact()?;
        Ok(summary)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Consolidator {
    config: ConsolidateConfig,
    engine: SimilarityEngine,
}

impl Consolidator {
    pub fn new(config: ConsolidateConfig, engine: SimilarityEngine) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &ConsolidateConfig {
        &self.config
    }

    /// Partition `records` into proposed masters and singletons. Records may
    /// be exact signatures or earlier masters. An empty input gives an empty
    /// plan.
    pub fn consolidate(&self, records: Vec<SignatureRecord>) -> ConsolidationPlan {
        self.consolidate_against(records, &[])
    }

    /// Like [`consolidate`](Self::consolidate), but a record scoring at least
    /// the threshold against any of `reference` is moved to `ignored` first.
    pub fn consolidate_against(
        &self,
        records: Vec<SignatureRecord>,
        reference: &[SignatureRecord],
    ) -> ConsolidationPlan {
        let (ignored, records) = self.set_aside_known(records, reference);
        let mut plan = self.cluster(records);
        plan.ignored = ignored;
        plan
    }

    fn set_aside_known(
        &self,
        records: Vec<SignatureRecord>,
        reference: &[SignatureRecord],
    ) -> (Vec<SignatureRecord>, Vec<SignatureRecord>) {
        if reference.is_empty() {
            return (Vec::new(), records);
        }
        let known: Vec<Vec<MasterBlock>> = reference
            .iter()
            .map(|r| r.signature.pattern().into_owned())
            .collect();
        let matched: Vec<bool> = records
            .par_iter()
            .map(|record| {
                let pattern = record.signature.pattern();
                known
                    .iter()
                    .any(|k| self.engine.score_pattern(k, &pattern) >= self.config.threshold)
            })
            .collect();

        let (ignored, rest): (Vec<_>, Vec<_>) = records.into_iter().zip(matched).partition(|(_, m)| *m);
        let ignored: Vec<SignatureRecord> = ignored.into_iter().map(|(r, _)| r).collect();
        if !ignored.is_empty() {
            info!(ignored = ignored.len(), "records already covered by reference signatures");
        }
        (ignored, rest.into_iter().map(|(r, _)| r).collect())
    }

    fn cluster(&self, records: Vec<SignatureRecord>) -> ConsolidationPlan {
        let patterns: Vec<Vec<MasterBlock>> = records
            .iter()
            .map(|r| r.signature.pattern().into_owned())
            .collect();

        let mut partition: Vec<Vec<usize>> = Vec::new();
        let mut remaining: Vec<usize> = (0..records.len()).collect();
        while let Some((&seed, rest)) = remaining.split_first() {
            let scores: Vec<f64> = rest
                .par_iter()
                .map(|&other| self.engine.score_pattern(&patterns[seed], &patterns[other]))
                .collect();

            let mut members = vec![seed];
            let mut unclustered = Vec::with_capacity(rest.len());
            for (&other, score) in rest.iter().zip(scores) {
                if score >= self.config.threshold {
                    members.push(other);
                } else {
                    unclustered.push(other);
                }
            }
            partition.push(members);
            remaining = unclustered;
        }

        let mut slots: Vec<Option<SignatureRecord>> = records.into_iter().map(Some).collect();
        let mut plan = ConsolidationPlan::default();
        for members in partition {
            if members.len() == 1 {
                if let Some(record) = slots[members[0]].take() {
                    plan.singletons.push(record);
                }
                continue;
            }
            let master = MasterSignature::merge(members.iter().map(|&i| patterns[i].as_slice()));
            if master.wildcard_count() == master.len() {
                // nothing in common position by position; such a master would match anything
                debug!(members = members.len(), "cluster has no fixed blocks; keeping members");
                plan.singletons.extend(members.iter().filter_map(|&i| slots[i].take()));
                continue;
            }
            let members: Vec<SignatureRecord> = members.iter().filter_map(|&i| slots[i].take()).collect();
            let name = master_name(&members);
            debug!(master = %name, members = members.len(), "proposed cluster");
            plan.clusters.push(Cluster { name, master, members });
        }
        plan.singletons.sort_by(|a, b| a.id.cmp(&b.id));
        plan
    }

    /// Plan over everything in `store` and commit it. In manual mode `review`
    /// is asked about every cluster and a `false` answer keeps its members.
    pub fn run<S, F>(&self, store: &mut S, review: F) -> Result<(ConsolidationPlan, ConsolidationSummary)>
    where
        S: SignatureStore + ?Sized,
        F: FnMut(&Cluster) -> bool,
    {
        self.run_against(store, &[], review)
    }

    /// [`run`](Self::run) with records matching `reference` left out of
    /// clustering.
    pub fn run_against<S, F>(
        &self,
        store: &mut S,
        reference: &[SignatureRecord],
        mut review: F,
    ) -> Result<(ConsolidationPlan, ConsolidationSummary)>
    where
        S: SignatureStore + ?Sized,
        F: FnMut(&Cluster) -> bool,
    {
        let mut plan = self.consolidate_against(store.get_all()?, reference);
        let mut rejected = 0;
        if self.config.mode == ConsolidateMode::Manual {
            let mut index = 0;
            while index < plan.clusters.len() {
                if review(&plan.clusters[index]) {
                    index += 1;
                } else {
                    plan.reject(index);
                    rejected += 1;
                }
            }
        }
        let mut summary = plan.apply(store)?;
        summary.clusters_rejected = rejected;
        Ok((plan, summary))
    }
}

/// `<most common member stem>.<5 hex chars of BLAKE3 over the sorted ids>`.
fn master_name(members: &[SignatureRecord]) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for member in members {
        let source = member.metadata.path.as_deref().unwrap_or(&member.id);
        *counts.entry(name_stem(source)).or_default() += 1;
    }
    // BTreeMap order makes ties go to the smallest stem
    let base = counts
        .iter()
        .fold(None::<(&String, usize)>, |best, (stem, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((stem, count)),
        })
        .map(|(stem, _)| stem.clone())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| FALLBACK_BASE_NAME.to_string());

    let mut ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();
    ids.sort_unstable();
    let digest = blake3::hash(ids.join("\n").as_bytes()).to_hex();
    format!("{base}.{}", &digest.as_str()[..5])
}

/// File name up to its fourth dot-separated part, or without its extension.
fn name_stem(path: &str) -> String {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let parts: Vec<&str> = file.split('.').collect();
    if parts.len() > 4 {
        return parts[..4].join(".");
    }
    match file.rfind('.') {
        Some(dot) if dot > 0 => file[..dot].to_string(),
        _ => file.to_string(),
    }
}

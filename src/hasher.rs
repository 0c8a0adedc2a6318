use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunker::{AdaptiveChunker, Chunk, ChunkerConfig};
use crate::classify::{ContentClassifier, ContentKind};
use crate::digest::{ChunkDigester, DigestKind};
use crate::error::{InputError, Result};
use crate::normalize::{NormalizeConfig, Normalizer};
use crate::signature::{DigestBlock, Signature};
use crate::similarity::{SimilarityEngine, SimilarityMetric};
use crate::util;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    pub chunker: ChunkerConfig,
    pub digest: DigestKind,
    pub metric: SimilarityMetric,
    /// When false, empty input is an [`InputError::Empty`] instead of an
    /// empty signature.
    pub allow_empty: bool,
    /// Digest chunks on the rayon pool.
    pub parallel: bool,
    /// Overrides the per-kind normalization defaults.
    pub normalize: Option<NormalizeConfig>,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            digest: DigestKind::default(),
            metric: SimilarityMetric::default(),
            allow_empty: true,
            parallel: true,
            normalize: None,
        }
    }
}

/// Normalize → chunk → digest → assemble.
///
/// Each call owns its rolling hash and normalizer state, so one hasher can be
/// shared across threads.
#[derive(Clone)]
pub struct FuzzyHasher {
    config: HasherConfig,
    chunker: AdaptiveChunker,
    digester: ChunkDigester,
    engine: SimilarityEngine,
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl FuzzyHasher {
    pub fn new(config: HasherConfig) -> Result<Self> {
        let chunker = AdaptiveChunker::new(config.chunker)?;
        Ok(Self {
            digester: ChunkDigester::new(config.digest),
            engine: SimilarityEngine::new(config.metric),
            chunker,
            config,
            classifier: None,
        })
    }

    /// Without a classifier every input is treated as binary.
    pub fn with_classifier(mut self, classifier: impl ContentClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    pub fn engine(&self) -> SimilarityEngine {
        self.engine
    }

    pub fn calculate_signature(&self, data: &[u8]) -> Result<Signature> {
        self.calculate_signature_named(data, "<bytes>")
    }

    /// Read `path` and hash its contents. The path is kept in errors.
    pub fn calculate_signature_file(&self, path: &Path) -> Result<Signature> {
        let bytes = util::read_file(path)?;
        self.calculate_signature_named(&bytes, &path.display().to_string())
    }

    pub fn compare_signatures(&self, a: &Signature, b: &Signature) -> f64 {
        self.engine.score(a, b)
    }

    /// Hash bytes already in memory; `source_name` identifies them in errors.
    pub fn calculate_signature_named(&self, data: &[u8], source_name: &str) -> Result<Signature> {
        let reject_empty = || InputError::Empty {
            source_name: source_name.to_string(),
        };
        if data.is_empty() && !self.config.allow_empty {
            return Err(reject_empty().into());
        }

        let (kind, encoding) = match &self.classifier {
            Some(c) => (c.classify(data), c.detect_encoding(data)),
            None => (ContentKind::Binary, None),
        };
        let normalize = self
            .config
            .normalize
            .unwrap_or_else(|| NormalizeConfig::for_kind(kind));
        let normalized = Normalizer::new(normalize).normalize(data, encoding);
        if normalized.is_empty() && !self.config.allow_empty {
            return Err(reject_empty().into());
        }

        let chunks = self.chunker.chunk(&normalized);
        if normalized.len() < self.chunker.config().min_chunk {
            debug!(
                source = source_name,
                len = normalized.len(),
                "input smaller than min chunk; using whole input"
            );
        }
        let blocks = self.digest_chunks(&normalized, &chunks);
        debug!(
            source = source_name,
            ?kind,
            raw_len = data.len(),
            normalized_len = normalized.len(),
            blocks = blocks.len(),
            "signature computed"
        );
        Ok(Signature::new(blocks))
    }

    /// Workers return `(chunk_index, block)` pairs which are written back by
    /// index, so block order never depends on completion order.
    fn digest_chunks(&self, data: &[u8], chunks: &[Chunk]) -> Vec<DigestBlock> {
        let digester = self.digester;
        if !self.config.parallel || chunks.len() < 2 {
            return chunks.iter().map(|c| digester.digest(&data[c.range()])).collect();
        }

        let tagged: Vec<(usize, DigestBlock)> = chunks
            .par_iter()
            .enumerate()
            .map(|(index, chunk)| (index, digester.digest(&data[chunk.range()])))
            .collect();

        let mut blocks = vec![DigestBlock::default(); chunks.len()];
        for (index, block) in tagged {
            blocks[index] = block;
        }
        blocks
    }
}

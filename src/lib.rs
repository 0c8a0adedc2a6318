//! Content-defined fuzzy hashing.
//!
//! Bytes are optionally normalized, cut into content-defined chunks with a
//! Rabin-style rolling hash, and each chunk is reduced to a 32-bit digest. The
//! ordered digests form a [`Signature`]. Signatures are compared with a
//! [`SimilarityEngine`] and families of near-duplicates can be folded into a
//! wildcard [`MasterSignature`] by the [`Consolidator`].

pub mod batch;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod consolidate;
pub mod digest;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod normalize;
pub mod rolling_hash;
pub mod scan;
pub mod signature;
pub mod similarity;
pub mod store;
pub mod util;

pub use chunker::{AdaptiveChunker, Chunk, ChunkerConfig};
pub use classify::{ContentClassifier, ContentKind, SniffingClassifier};
pub use config::GlacierConfig;
pub use consolidate::{
    Cluster, ConsolidateConfig, ConsolidateMode, ConsolidationPlan, ConsolidationSummary, Consolidator,
};
pub use digest::{ChunkDigester, DigestKind};
pub use error::{GlacierError, InputError, Result, StoreError};
pub use hasher::{FuzzyHasher, HasherConfig};
pub use normalize::{NormalizeConfig, Normalizer};
pub use rolling_hash::RollingHash;
pub use scan::{ScanMatch, ScanSummary, Scanner};
pub use signature::{DigestBlock, MasterBlock, MasterSignature, ParseSignatureError, Signature};
pub use similarity::{SimilarityEngine, SimilarityMetric};
pub use store::{FileStore, MemoryStore, RecordMetadata, SignatureRecord, SignatureStore, StoredSignature};

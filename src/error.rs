//! Error types for signature generation, comparison and storage.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum GlacierError {
    /// The byte source could not be read or was rejected.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Invalid chunking bounds, thresholds or other settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure reported by a signature store, passed through untouched.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GlacierError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        GlacierError::Config(message.into())
    }
}

/// Problems with the bytes handed to the hasher.
#[derive(Debug, Error)]
pub enum InputError {
    /// Empty input while the configuration disallows it.
    #[error("empty input: {source_name}")]
    Empty { source_name: String },

    /// The file could not be opened, mapped or read.
    #[error("unreadable input {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by [`SignatureStore`](crate::store::SignatureStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode store snapshot: {0}")]
    Encode(#[from] bincode::Error),

    #[error("compression error: {0}")]
    Compression(std::io::Error),

    #[error("invalid signature database {}: missing magic header", path.display())]
    BadMagic { path: PathBuf },

    #[error("unsupported store version: {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("unknown record id: {0}")]
    UnknownId(String),

    #[error("duplicate record id: {0}")]
    DuplicateId(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GlacierError>;

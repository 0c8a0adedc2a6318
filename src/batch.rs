use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::GlacierError;
use crate::hasher::FuzzyHasher;
use crate::scan::{ScanMatch, ScanSummary, Scanner};
use crate::signature::Signature;
use crate::store::{RecordMetadata, SignatureRecord, SignatureStore, StoredSignature};
use crate::util::{self, FileEntry};

#[derive(Debug)]
pub struct HashedFile {
    pub entry: FileEntry,
    pub signature: Signature,
    pub content_hash: String,
}

#[derive(Debug)]
pub struct HashFailure {
    pub relative_path: String,
    pub error: GlacierError,
}

/// Result of hashing every file under a folder, in walk order.
#[derive(Debug, Default)]
pub struct FolderHashes {
    pub hashed: Vec<HashedFile>,
    pub failures: Vec<HashFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub files_hashed: usize,
    pub files_failed: usize,
    pub records_total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileScan {
    pub relative_path: String,
    pub best: Option<ScanMatch>,
}

fn hash_entry(hasher: &FuzzyHasher, entry: &FileEntry) -> crate::error::Result<(Signature, String)> {
    let bytes = util::read_file(&entry.full_path)?;
    let signature = hasher.calculate_signature_named(&bytes, &entry.relative_path)?;
    Ok((signature, util::content_hash(&bytes)))
}

/// Walk `folder` and hash every file on the rayon pool. An entry that cannot
/// be listed, read or hashed is logged and reported in `failures`; the rest
/// carry on.
pub async fn hash_folder(folder: &Path, hasher: &FuzzyHasher) -> Result<FolderHashes> {
    let root = folder.to_path_buf();
    let walk = tokio::task::spawn_blocking(move || util::walk_files(&root)).await??;
    debug!(
        files = walk.files.len(),
        skipped = walk.skipped.len(),
        folder = %folder.display(),
        "walked folder"
    );

    let mut result = FolderHashes::default();
    result.failures.extend(walk.skipped.into_iter().map(|skipped| HashFailure {
        relative_path: skipped.relative_path,
        error: skipped.error.into(),
    }));

    let entries = walk.files;
    let hasher = hasher.clone();
    let outcomes = tokio::task::spawn_blocking(move || {
        entries
            .into_par_iter()
            .map(|entry| {
                let outcome = hash_entry(&hasher, &entry);
                (entry, outcome)
            })
            .collect::<Vec<_>>()
    })
    .await?;

    for (entry, outcome) in outcomes {
        match outcome {
            Ok((signature, content_hash)) => {
                debug!(file = %entry.relative_path, blocks = signature.len(), "hashed");
                result.hashed.push(HashedFile {
                    entry,
                    signature,
                    content_hash,
                });
            }
            Err(error) => {
                warn!(file = %entry.relative_path, %error, "skipping file");
                result.failures.push(HashFailure {
                    relative_path: entry.relative_path,
                    error,
                });
            }
        }
    }
    Ok(result)
}

/// Hash `folder` and store one exact record per file, keyed by its path
/// relative to `folder`. Records already in the store under the same id are
/// overwritten.
pub async fn build_database<S: SignatureStore + ?Sized>(
    folder: &Path,
    store: &mut S,
    hasher: &FuzzyHasher,
) -> Result<BuildSummary> {
    let hashes = hash_folder(folder, hasher).await?;
    let files_hashed = hashes.hashed.len();

    for file in hashes.hashed {
        let metadata = RecordMetadata {
            path: Some(file.entry.full_path.display().to_string()),
            size: Some(file.entry.size),
            content_hash: Some(file.content_hash),
            members: Vec::new(),
        };
        store
            .put(
                &file.entry.relative_path,
                StoredSignature::Exact(file.signature),
                metadata,
            )
            .with_context(|| format!("Failed to store signature for {}", file.entry.relative_path))?;
    }

    Ok(BuildSummary {
        files_hashed,
        files_failed: hashes.failures.len(),
        records_total: store.len()?,
    })
}

/// Best match for every file under `folder`.
pub async fn scan_folder(
    folder: &Path,
    records: &[SignatureRecord],
    scanner: &Scanner,
    hasher: &FuzzyHasher,
) -> Result<(Vec<FileScan>, ScanSummary)> {
    let hashes = hash_folder(folder, hasher).await?;
    let mut summary = ScanSummary::default();

    let mut scans: Vec<FileScan> = hashes
        .hashed
        .par_iter()
        .map(|file| FileScan {
            relative_path: file.entry.relative_path.clone(),
            best: scanner.best_match(&file.signature, records),
        })
        .collect();
    for scan in &scans {
        summary.record_match(scan.best.is_some());
    }
    for _ in &hashes.failures {
        summary.record_error();
    }
    scans.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok((scans, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HasherConfig;
    use crate::similarity::SimilarityEngine;
    use crate::store::MemoryStore;

    fn write_files(root: &Path, count: usize) {
        for i in 0..count {
            let body: Vec<u8> = (0..3000u32).map(|j| ((j * 7 + i as u32 * 13) % 251) as u8).collect();
            std::fs::write(root.join(format!("file{i:02}.bin")), body).unwrap();
        }
    }

    #[tokio::test]
    async fn build_stores_one_record_per_file() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), 4);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/empty.txt"), b"").unwrap();

        let hasher = FuzzyHasher::new(HasherConfig::default()).unwrap();
        let mut store = MemoryStore::new();
        let summary = build_database(dir.path(), &mut store, &hasher).await.unwrap();

        assert_eq!(summary.files_hashed, 5);
        assert_eq!(summary.files_failed, 0);
        assert_eq!(summary.records_total, 5);
        let records = store.get_all().unwrap();
        assert_eq!(records[0].id, "file00.bin");
        assert_eq!(records[0].metadata.size, Some(3000));
        assert!(records.iter().any(|r| r.id == "sub/empty.txt" && r.signature.is_empty()));
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), 3);
        std::fs::write(dir.path().join("zero.bin"), b"").unwrap();

        let hasher = FuzzyHasher::new(HasherConfig {
            allow_empty: false,
            ..HasherConfig::default()
        })
        .unwrap();
        let hashes = hash_folder(dir.path(), &hasher).await.unwrap();
        assert_eq!(hashes.hashed.len(), 3);
        assert_eq!(hashes.failures.len(), 1);
        assert_eq!(hashes.failures[0].relative_path, "zero.bin");
    }

    #[test]
    fn file_removed_after_walk_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), 2);
        let walk = util::walk_files(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("file01.bin")).unwrap();

        let hasher = FuzzyHasher::new(HasherConfig::default()).unwrap();
        let outcomes: Vec<_> = walk.files.iter().map(|e| hash_entry(&hasher, e)).collect();
        assert!(outcomes[0].is_ok());
        assert!(matches!(
            outcomes[1],
            Err(GlacierError::Input(crate::error::InputError::Unreadable { .. }))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn broken_entries_do_not_abort_build() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), 3);
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

        let hasher = FuzzyHasher::new(HasherConfig::default()).unwrap();
        let hashes = hash_folder(dir.path(), &hasher).await.unwrap();
        assert_eq!(hashes.hashed.len(), 3);
        assert_eq!(hashes.failures.len(), 1);
        assert_eq!(hashes.failures[0].relative_path, "dangling");

        let mut store = MemoryStore::new();
        let summary = build_database(dir.path(), &mut store, &hasher).await.unwrap();
        assert_eq!(summary.files_hashed, 3);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn scanning_the_built_folder_matches_everything() {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), 3);

        let hasher = FuzzyHasher::new(HasherConfig::default()).unwrap();
        let mut store = MemoryStore::new();
        build_database(dir.path(), &mut store, &hasher).await.unwrap();

        let scanner = Scanner::new(SimilarityEngine::default(), 0.5).unwrap();
        let records = store.get_all().unwrap();
        let (scans, summary) = scan_folder(dir.path(), &records, &scanner, &hasher).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.matched, 3);
        for scan in scans {
            let best = scan.best.unwrap();
            assert_eq!(best.id, scan.relative_path);
            assert_eq!(best.score, 1.0);
        }
    }
}

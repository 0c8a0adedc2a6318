use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::Context;
use memmap2::Mmap;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::InputError;

#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the walked root, always with forward slashes.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// An entry the walk could not list or stat.
#[derive(Debug)]
pub struct SkippedEntry {
    pub relative_path: String,
    pub error: InputError,
}

#[derive(Debug, Default)]
pub struct FileWalk {
    pub files: Vec<FileEntry>,
    pub skipped: Vec<SkippedEntry>,
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Walk a directory tree and collect every regular file, sorted by relative
/// path so batch output is stable. Symlinks are followed.
///
/// Only a root that cannot be read fails the walk. Entries below it that
/// cannot be listed or stat'ed (dangling links, unreadable directories,
/// files removed mid-walk) are reported in `skipped`.
pub fn walk_files(root: &Path) -> anyhow::Result<FileWalk> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize path: {}", root.display()))?;

    let mut walk = FileWalk::default();

    for entry in WalkDir::new(&root).min_depth(1).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| format!("Failed to read directory: {}", root.display()));
            }
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                let relative_path = relative_to(&root, &path);
                let source = err.into_io_error().unwrap_or_else(|| io::Error::other("filesystem loop"));
                walk.skipped.push(SkippedEntry {
                    relative_path,
                    error: InputError::Unreadable { path, source },
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative_path = relative_to(&root, &full_path);
        match entry.metadata() {
            Ok(metadata) => walk.files.push(FileEntry {
                relative_path,
                full_path,
                size: metadata.len(),
            }),
            Err(err) => {
                warn!(path = %full_path.display(), error = %err, "skipping file without metadata");
                let source = err.into_io_error().unwrap_or_else(|| io::Error::other("metadata unavailable"));
                walk.skipped.push(SkippedEntry {
                    relative_path,
                    error: InputError::Unreadable {
                        path: full_path,
                        source,
                    },
                });
            }
        }
    }

    Ok(walk)
}

/// Read-only file contents. Zero-length files are not mapped.
pub enum FileBytes {
    Mapped(Mmap),
    Empty,
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => mmap,
            FileBytes::Empty => &[],
        }
    }
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the mapping is live.
pub fn read_file(path: &Path) -> Result<FileBytes, InputError> {
    let unreadable = |source| InputError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(unreadable)?;
    let len = file.metadata().map_err(unreadable)?.len();
    if len == 0 {
        return Ok(FileBytes::Empty);
    }
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    let mmap = unsafe { Mmap::map(&file) }.map_err(unreadable)?;
    Ok(FileBytes::Mapped(mmap))
}

/// BLAKE3 of a byte slice as lowercase hex.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

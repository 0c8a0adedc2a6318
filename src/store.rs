//! Keyed storage of exact and master signatures.
//!
//! [`FileStore`] keeps the records in memory and persists them as a single
//! snapshot: an 8-byte magic header followed by a zstd-compressed bincode
//! encoding of every record. Snapshots are written to a temporary file and
//! renamed into place.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::signature::{MasterBlock, MasterSignature, Signature};

pub const MAGIC: &[u8; 8] = b"GLCRDB01";
pub const FORMAT_VERSION: u32 = 1;

const FLUSH_LEVEL: i32 = 3;
const COMPACT_LEVEL: i32 = 19;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredSignature {
    Exact(Signature),
    Master(MasterSignature),
}

impl StoredSignature {
    pub fn is_master(&self) -> bool {
        matches!(self, StoredSignature::Master(_))
    }

    pub fn pattern(&self) -> Cow<'_, [MasterBlock]> {
        match self {
            StoredSignature::Exact(sig) => Cow::Owned(sig.to_pattern()),
            StoredSignature::Master(master) => Cow::Borrowed(master.blocks()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StoredSignature::Exact(sig) => sig.len(),
            StoredSignature::Master(master) => master.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for StoredSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredSignature::Exact(sig) => fmt::Display::fmt(sig, f),
            StoredSignature::Master(master) => fmt::Display::fmt(master, f),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub path: Option<String>,
    pub size: Option<u64>,
    /// BLAKE3 of the raw file contents.
    pub content_hash: Option<String>,
    /// Ids of the records merged into a master.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: String,
    pub signature: StoredSignature,
    pub metadata: RecordMetadata,
}

pub trait SignatureStore {
    /// Insert a record, overwriting any record with the same id.
    fn put(&mut self, id: &str, signature: StoredSignature, metadata: RecordMetadata) -> Result<(), StoreError>;

    /// Every record, ordered by id.
    fn get_all(&self) -> Result<Vec<SignatureRecord>, StoreError>;

    /// Remove `ids` and store `master` under `master_id` in one step.
    fn replace(
        &mut self,
        ids: &[String],
        master_id: &str,
        master: MasterSignature,
        metadata: RecordMetadata,
    ) -> Result<(), StoreError>;

    fn delete(&mut self, ids: &[String]) -> Result<(), StoreError>;

    /// Reclaim space left by removed records.
    fn compact(&mut self) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.get_all()?.len())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, (StoredSignature, RecordMetadata)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_records(records: Vec<SignatureRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.id, (r.signature, r.metadata)))
                .collect(),
        }
    }

    fn check_known(&self, ids: &[String]) -> Result<(), StoreError> {
        match ids.iter().find(|id| !self.records.contains_key(*id)) {
            Some(missing) => Err(StoreError::UnknownId(missing.clone())),
            None => Ok(()),
        }
    }
}

impl SignatureStore for MemoryStore {
    fn put(&mut self, id: &str, signature: StoredSignature, metadata: RecordMetadata) -> Result<(), StoreError> {
        self.records.insert(id.to_string(), (signature, metadata));
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<SignatureRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .map(|(id, (signature, metadata))| SignatureRecord {
                id: id.clone(),
                signature: signature.clone(),
                metadata: metadata.clone(),
            })
            .collect())
    }

    fn replace(
        &mut self,
        ids: &[String],
        master_id: &str,
        master: MasterSignature,
        metadata: RecordMetadata,
    ) -> Result<(), StoreError> {
        self.check_known(ids)?;
        if self.records.contains_key(master_id) && !ids.iter().any(|id| id == master_id) {
            return Err(StoreError::DuplicateId(master_id.to_string()));
        }
        for id in ids {
            self.records.remove(id);
        }
        self.records
            .insert(master_id.to_string(), (StoredSignature::Master(master), metadata));
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) -> Result<(), StoreError> {
        self.check_known(ids)?;
        for id in ids {
            self.records.remove(id);
        }
        Ok(())
    }

    fn compact(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<SignatureRecord>,
}

/// Snapshot-file store. Mutations stay in memory until [`FileStore::flush`]
/// or [`SignatureStore::compact`].
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl FileStore {
    /// Open `path`, starting an empty database if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "creating new signature database");
            return Ok(Self {
                path: path.to_path_buf(),
                inner: MemoryStore::new(),
                dirty: true,
            });
        }
        Self::open_existing(path)
    }

    pub fn open_existing(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if raw.len() < MAGIC.len() || &raw[..MAGIC.len()] != MAGIC {
            return Err(StoreError::BadMagic {
                path: path.to_path_buf(),
            });
        }

        let decoder = zstd::Decoder::new(&raw[MAGIC.len()..]).map_err(StoreError::Compression)?;
        let snapshot: Snapshot = bincode::deserialize_from(decoder)?;

        if snapshot.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: snapshot.version,
                expected: FORMAT_VERSION,
            });
        }

        debug!(path = %path.display(), records = snapshot.records.len(), "opened signature database");
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::from_records(snapshot.records),
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist pending changes.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.write_snapshot(FLUSH_LEVEL)?;
        }
        Ok(())
    }

    fn write_snapshot(&mut self, level: i32) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            version: FORMAT_VERSION,
            records: self.inner.get_all()?,
        };
        let encoded = bincode::serialize(&snapshot)?;
        let compressed = zstd::bulk::compress(&encoded, level).map_err(StoreError::Compression)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        let mut file = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(MAGIC).map_err(io_err(&tmp))?;
        file.write_all(&compressed).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;

        debug!(
            path = %self.path.display(),
            records = snapshot.records.len(),
            bytes = compressed.len() + MAGIC.len(),
            "wrote signature database"
        );
        self.dirty = false;
        Ok(())
    }
}

impl SignatureStore for FileStore {
    fn put(&mut self, id: &str, signature: StoredSignature, metadata: RecordMetadata) -> Result<(), StoreError> {
        self.inner.put(id, signature, metadata)?;
        self.dirty = true;
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<SignatureRecord>, StoreError> {
        self.inner.get_all()
    }

    fn replace(
        &mut self,
        ids: &[String],
        master_id: &str,
        master: MasterSignature,
        metadata: RecordMetadata,
    ) -> Result<(), StoreError> {
        self.inner.replace(ids, master_id, master, metadata)?;
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) -> Result<(), StoreError> {
        self.inner.delete(ids)?;
        self.dirty = true;
        Ok(())
    }

    /// Rewrite the whole snapshot at a high compression level.
    fn compact(&mut self) -> Result<(), StoreError> {
        self.write_snapshot(COMPACT_LEVEL)
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.inner.len()
    }
}

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt, fs,
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering::Relaxed},
};

use sha2::{Digest, Sha256};
use tracing::{error, trace};

use crate::{
    format::{DataFormat, DataFormatReader, DataHeaderOf},
    BucketError, BucketHash, ClfEntry, CorruptBucket, LedgerEntry, LedgerKey,
};

pub const BUCKET_MAGIC: u32 = 0x4246_4c43; // "CLFB" little-endian on disk
pub const BUCKET_FILE_VERSION: u8 = 1;

/// Serialized entry streams larger than this are backed by a file instead
/// of memory. The decision is taken once, while the bucket is built.
pub const DEFAULT_SPILL_THRESHOLD: usize = 128 * 1024;

/// Fixed header at the front of every bucket file: magic, file version,
/// the entry codec header, then the entry count.
pub(crate) struct BucketFileHeader {
    pub entry_header: DataHeaderOf<ClfEntry>,
    pub entry_count: u64,
}

impl BucketFileHeader {
    fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), BucketError> {
        BUCKET_MAGIC.write_data(writer)?;
        BUCKET_FILE_VERSION.write_data(writer)?;
        self.entry_header.write_data(writer)?;
        self.entry_count.write_data(writer)?;
        Ok(())
    }

    fn read_bytes<R: Read>(reader: &mut R) -> Result<Self, BucketError> {
        let magic: u32 = reader.read_data(&())?;
        if magic != BUCKET_MAGIC {
            return Err(CorruptBucket::BadMagic(magic).into());
        }
        let version: u8 = reader.read_data(&())?;
        if version != BUCKET_FILE_VERSION {
            return Err(CorruptBucket::UnsupportedVersion(version).into());
        }
        Ok(BucketFileHeader {
            entry_header: ClfEntry::read_header(reader)?,
            entry_count: reader.read_data(&())?,
        })
    }
}

enum BucketStorage {
    Memory(Vec<ClfEntry>),
    Spilled {
        path: PathBuf,
        /// Cleared when an identical bucket already owns the file, so two
        /// owners never unlink the same path.
        owns_file: AtomicBool,
    },
}

/// An immutable, identity-sorted, duplicate-free sequence of [`ClfEntry`]s
/// with a content hash over its serialized form.
///
/// Buckets are shared by reference across levels and merges and live as
/// long as their longest holder. A spilled bucket unlinks its backing file
/// when the last owner drops it.
pub struct Bucket {
    storage: BucketStorage,
    hash: BucketHash,
    entry_count: u64,
    byte_size: u64,
}

impl Bucket {
    /// The canonical empty bucket, with the well-known hash of the empty
    /// entry stream.
    pub fn empty() -> Self {
        Bucket {
            storage: BucketStorage::Memory(Vec::new()),
            hash: BucketHash::empty(),
            entry_count: 0,
            byte_size: 0,
        }
    }

    /// Build a bucket from one ledger's unordered live and dead batches.
    ///
    /// Entries are sorted by identity and deduplicated: a dead key beats any
    /// live record with the same identity from the same batch, and among
    /// live records the last-supplied wins.
    pub fn fresh(
        dir: &Path,
        live: Vec<LedgerEntry>,
        dead: Vec<LedgerKey>,
    ) -> Result<Self, BucketError> {
        Self::fresh_with(dir, live, dead, DEFAULT_SPILL_THRESHOLD)
    }

    pub fn fresh_with(
        dir: &Path,
        live: Vec<LedgerEntry>,
        dead: Vec<LedgerKey>,
        spill_threshold: usize,
    ) -> Result<Self, BucketError> {
        let mut entries = BTreeMap::new();
        for entry in live {
            entries.insert(entry.key(), ClfEntry::Live(entry));
        }
        for key in dead {
            entries.insert(key, ClfEntry::Dead(key));
        }

        let mut builder = BucketBuilder::new(dir.to_path_buf(), spill_threshold);
        for entry in entries.values() {
            builder.push(entry)?;
        }
        builder.finish()
    }

    pub fn hash(&self) -> BucketHash {
        self.hash
    }

    /// Number of entries in the bucket
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Size of the serialized entry stream in bytes, excluding the file
    /// header when spilled
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, BucketStorage::Spilled { .. })
    }

    /// Path of the backing file. `None` for memory-resident buckets.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.storage {
            BucketStorage::Memory(_) => None,
            BucketStorage::Spilled { path, .. } => Some(path),
        }
    }

    /// A forward-only pass over the entries in ascending identity order.
    /// Each call starts from the beginning; spilled buckets re-open their
    /// file.
    pub fn iter(&self) -> Result<BucketIter<'_>, BucketError> {
        match &self.storage {
            BucketStorage::Memory(entries) => Ok(BucketIter::Memory(entries.iter())),
            BucketStorage::Spilled { path, .. } => {
                Ok(BucketIter::File(Box::new(FileIter::open(path)?)))
            }
        }
    }

    /// Collect all entries. Intended for small buckets and tests; large
    /// consumers should stream with [`Bucket::iter`].
    pub fn entries(&self) -> Result<Vec<ClfEntry>, BucketError> {
        self.iter()?.collect()
    }

    /// Membership by identity. Memory-resident buckets binary search;
    /// spilled buckets scan and stop at the first greater identity.
    pub fn contains_identity(&self, key: &LedgerKey) -> Result<bool, BucketError> {
        match &self.storage {
            BucketStorage::Memory(entries) => Ok(entries
                .binary_search_by(|entry| entry.identity().cmp(key))
                .is_ok()),
            BucketStorage::Spilled { .. } => {
                for entry in self.iter()? {
                    match entry?.identity().cmp(key) {
                        Ordering::Less => continue,
                        Ordering::Equal => return Ok(true),
                        Ordering::Greater => return Ok(false),
                    }
                }
                Ok(false)
            }
        }
    }

    /// Membership test for an entry's identity, live or dead
    pub fn contains_clf_identity(&self, entry: &ClfEntry) -> Result<bool, BucketError> {
        self.contains_identity(&entry.identity())
    }

    /// Give up ownership of the backing file. Used when an identical
    /// bucket already owns the same path.
    pub(crate) fn disown_file(&self) {
        if let BucketStorage::Spilled { owns_file, .. } = &self.storage {
            owns_file.store(false, Relaxed);
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("hash", &self.hash)
            .field("entries", &self.entry_count)
            .field("bytes", &self.byte_size)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        if let BucketStorage::Spilled { path, owns_file } = &self.storage {
            if owns_file.load(Relaxed) {
                if let Err(err) = fs::remove_file(path) {
                    error!("error deleting bucket file {path:?}: {err}");
                }
            }
        }
    }
}

pub enum BucketIter<'a> {
    Memory(std::slice::Iter<'a, ClfEntry>),
    File(Box<FileIter>),
}

impl Iterator for BucketIter<'_> {
    type Item = Result<ClfEntry, BucketError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            BucketIter::Memory(iter) => iter.next().map(|entry| Ok(*entry)),
            BucketIter::File(iter) => iter.next(),
        }
    }
}

pub struct FileIter {
    reader: BufReader<File>,
    entry_header: DataHeaderOf<ClfEntry>,
    remaining: u64,
    last: Option<LedgerKey>,
}

impl FileIter {
    fn open(path: &Path) -> Result<Self, BucketError> {
        let mut reader = BufReader::new(File::open(path)?);
        let header = BucketFileHeader::read_bytes(&mut reader)?;
        Ok(FileIter {
            reader,
            entry_header: header.entry_header,
            remaining: header.entry_count,
            last: None,
        })
    }

    fn read_entry(&mut self) -> Result<ClfEntry, BucketError> {
        let entry: ClfEntry = self.reader.read_data(&self.entry_header)?;
        let identity = entry.identity();
        if let Some(last) = self.last.replace(identity) {
            if last >= identity {
                return Err(CorruptBucket::OutOfOrder(
                    format!("{last:?}"),
                    format!("{identity:?}"),
                )
                .into());
            }
        }
        Ok(entry)
    }
}

impl Iterator for FileIter {
    type Item = Result<ClfEntry, BucketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        match self.read_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                // poison the iterator so a decode error is reported once
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

enum BuilderSink {
    Memory { entries: Vec<ClfEntry>, buf: Vec<u8> },
    File { writer: BufWriter<tempfile::NamedTempFile> },
}

/// Streaming constructor shared by [`Bucket::fresh`] and the merge engine.
/// Entries must arrive in strictly ascending identity order; the hash is
/// computed as bytes are emitted. The output stays in memory until the
/// stream outgrows the spill threshold, then moves to a uniquely named
/// temp file which is renamed to its content-hash name on success and
/// unlinked on failure.
pub(crate) struct BucketBuilder {
    dir: PathBuf,
    spill_threshold: usize,
    hasher: Sha256,
    scratch: Vec<u8>,
    entry_count: u64,
    stream_bytes: u64,
    last: Option<LedgerKey>,
    sink: BuilderSink,
}

impl BucketBuilder {
    pub fn new(dir: PathBuf, spill_threshold: usize) -> Self {
        BucketBuilder {
            dir,
            spill_threshold,
            hasher: Sha256::new(),
            scratch: Vec::new(),
            entry_count: 0,
            stream_bytes: 0,
            last: None,
            sink: BuilderSink::Memory {
                entries: Vec::new(),
                buf: Vec::new(),
            },
        }
    }

    pub fn push(&mut self, entry: &ClfEntry) -> Result<(), BucketError> {
        let identity = entry.identity();
        if let Some(last) = self.last.replace(identity) {
            if last >= identity {
                return Err(BucketError::InvariantViolation(format!(
                    "bucket entries out of order: {last:?} then {identity:?}"
                )));
            }
        }

        self.scratch.clear();
        entry.write_data(&mut self.scratch)?;
        self.hasher.update(&self.scratch);
        self.entry_count += 1;
        self.stream_bytes += self.scratch.len() as u64;

        let needs_spill = match &mut self.sink {
            BuilderSink::Memory { entries, buf } => {
                entries.push(*entry);
                buf.extend_from_slice(&self.scratch);
                buf.len() > self.spill_threshold
            }
            BuilderSink::File { writer } => {
                writer.write_all(&self.scratch)?;
                false
            }
        };
        if needs_spill {
            self.spill()?;
        }
        Ok(())
    }

    /// One-way switch from the memory sink to a temp file
    fn spill(&mut self) -> Result<(), BucketError> {
        let BuilderSink::Memory { buf, .. } = &mut self.sink else {
            return Ok(());
        };
        let tmp = tempfile::Builder::new()
            .prefix("building-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        let mut writer = BufWriter::new(tmp);
        // placeholder count, patched once the stream is complete
        BucketFileHeader {
            entry_header: ClfEntry::LATEST_HEADER,
            entry_count: 0,
        }
        .write_bytes(&mut writer)?;
        writer.write_all(buf)?;
        self.sink = BuilderSink::File { writer };
        Ok(())
    }

    pub fn finish(self) -> Result<Bucket, BucketError> {
        let hash = BucketHash::from_digest(self.hasher);
        match self.sink {
            BuilderSink::Memory { entries, .. } => Ok(Bucket {
                storage: BucketStorage::Memory(entries),
                hash,
                entry_count: self.entry_count,
                byte_size: self.stream_bytes,
            }),
            BuilderSink::File { writer } => {
                let mut tmp = writer
                    .into_inner()
                    .map_err(|err| BucketError::Io(err.into_error()))?;
                tmp.as_file_mut().seek(SeekFrom::Start(0))?;
                BucketFileHeader {
                    entry_header: ClfEntry::LATEST_HEADER,
                    entry_count: self.entry_count,
                }
                .write_bytes(tmp.as_file_mut())?;
                tmp.as_file().sync_all()?;

                let path = self.dir.join(format!("bucket-{hash}.xdr"));
                tmp.persist(&path)?;
                trace!(
                    "bucket {hash} spilled to {path:?} ({} bytes, {} entries)",
                    self.stream_bytes,
                    self.entry_count
                );
                Ok(Bucket {
                    storage: BucketStorage::Spilled {
                        path,
                        owns_file: AtomicBool::new(true),
                    },
                    hash,
                    entry_count: self.entry_count,
                    byte_size: self.stream_bytes,
                })
            }
        }
    }
}

//! RocksDB persistence for room documents.
//!
//! Column families:
//! - `documents`: full yrs state per document, LZ4 compressed
//! - `deltas`: updates received since the last snapshot, keyed `doc_id ++ version(BE)`
//! - `metadata`: [`DocumentMetadata`] per document
//!
//! Writing a snapshot drops the deltas it covers in the same batch, so a
//! document is always `snapshot + deltas after snapshot_version`.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType,
    DBWithThreadMode, Direction, IteratorMode, Options, SingleThreaded, SliceTransform, WriteBatch,
    WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

const CF_DOCUMENTS: &str = "documents";
const CF_DELTAS: &str = "deltas";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_DOCUMENTS, CF_DELTAS, CF_METADATA];

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    pub bloom_filter_bits: i32,
    /// fsync every write (default: false, RocksDB's own WAL covers crashes)
    pub sync_writes: bool,
    pub max_open_files: i32,
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("codeverse_data/documents"),
            block_cache_size: 128 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub doc_id: Uuid,
    /// Version of the newest stored delta
    pub version: u64,
    /// Newest version folded into the snapshot
    pub snapshot_version: u64,
    /// Deltas currently stored (not yet folded into the snapshot)
    pub delta_count: u64,
    pub snapshot_size: u64,
    pub compressed_size: u64,
    /// Seconds since the unix epoch
    pub created_at: u64,
    pub updated_at: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DocumentMetadata {
    fn new(doc_id: Uuid) -> Self {
        let now = unix_now();
        Self {
            doc_id,
            version: 0,
            snapshot_version: 0,
            delta_count: 0,
            snapshot_size: 0,
            compressed_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, DocStoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| DocStoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, DocStoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| DocStoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("Column family '{0}' not found")]
    MissingColumnFamily(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Document store lock poisoned")]
    LockPoisoned,
}

pub struct DocumentStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Serializes metadata read-modify-write
    write_lock: Mutex<()>,
}

impl DocumentStore {
    pub fn open(config: StoreConfig) -> Result<Self, DocStoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cache = Cache::new_lru_cache(config.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config, &cache)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened document store at {}", config.path.display());

        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig, cache: &Cache) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(f64::from(config.bloom_filter_bits), false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DOCUMENTS => {
                // Values are already LZ4 frames
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(2);
            }
            CF_DELTAS => {
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(4);
                opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(16));
            }
            _ => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(8);
            }
        }
        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Snapshots ────────────────────────────────────────────────────

    /// Store the full document state and drop every delta it covers.
    pub fn save_snapshot(&self, doc_id: Uuid, state: &[u8]) -> Result<DocumentMetadata, DocStoreError> {
        let _guard = self.lock()?;
        let compressed = lz4_flex::compress_prepend_size(state);

        let mut meta = self
            .load_metadata(doc_id)?
            .unwrap_or_else(|| DocumentMetadata::new(doc_id));
        meta.snapshot_version = meta.version;
        meta.snapshot_size = state.len() as u64;
        meta.compressed_size = compressed.len() as u64;
        meta.delta_count = 0;
        meta.updated_at = unix_now();

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_DOCUMENTS)?, doc_id.as_bytes(), &compressed);
        batch.put_cf(self.cf(CF_METADATA)?, doc_id.as_bytes(), meta.encode()?);
        self.stage_delta_range_delete(&mut batch, doc_id, meta.snapshot_version)?;
        self.write(batch)?;

        Ok(meta)
    }

    pub fn load_snapshot(&self, doc_id: Uuid) -> Result<Option<Vec<u8>>, DocStoreError> {
        match self.db.get_cf(self.cf(CF_DOCUMENTS)?, doc_id.as_bytes())? {
            Some(compressed) => lz4_flex::decompress_size_prepended(&compressed)
                .map(Some)
                .map_err(|e| DocStoreError::Compression(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn document_exists(&self, doc_id: Uuid) -> Result<bool, DocStoreError> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(CF_METADATA)?, doc_id.as_bytes())?
            .is_some())
    }

    // ─── Deltas ───────────────────────────────────────────────────────

    /// Append an update. Returns the version it was stored under.
    pub fn append_delta(&self, doc_id: Uuid, delta: &[u8]) -> Result<u64, DocStoreError> {
        let _guard = self.lock()?;
        let mut meta = self
            .load_metadata(doc_id)?
            .unwrap_or_else(|| DocumentMetadata::new(doc_id));
        meta.version += 1;
        meta.delta_count += 1;
        meta.updated_at = unix_now();

        let compressed = lz4_flex::compress_prepend_size(delta);
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_DELTAS)?, delta_key(doc_id, meta.version), &compressed);
        batch.put_cf(self.cf(CF_METADATA)?, doc_id.as_bytes(), meta.encode()?);
        self.write(batch)?;

        Ok(meta.version)
    }

    /// Deltas with a version `>= since`, oldest first.
    pub fn load_deltas_since(&self, doc_id: Uuid, since: u64) -> Result<Vec<(u64, Vec<u8>)>, DocStoreError> {
        let start = delta_key(doc_id, since);
        let iter = self
            .db
            .iterator_cf(self.cf(CF_DELTAS)?, IteratorMode::From(&start, Direction::Forward));

        let mut deltas = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let Some(version) = parse_delta_key(doc_id, &key) else {
                break;
            };
            let delta = lz4_flex::decompress_size_prepended(&value)
                .map_err(|e| DocStoreError::Compression(e.to_string()))?;
            deltas.push((version, delta));
        }
        Ok(deltas)
    }

    /// Snapshot followed by the pending deltas, ready to apply in order.
    /// `None` when the document was never stored.
    pub fn load_updates(&self, doc_id: Uuid) -> Result<Option<Vec<Vec<u8>>>, DocStoreError> {
        let Some(meta) = self.load_metadata(doc_id)? else {
            return Ok(None);
        };
        let mut updates = Vec::with_capacity(meta.delta_count as usize + 1);
        if let Some(snapshot) = self.load_snapshot(doc_id)? {
            updates.push(snapshot);
        }
        updates.extend(
            self.load_deltas_since(doc_id, meta.snapshot_version + 1)?
                .into_iter()
                .map(|(_, delta)| delta),
        );
        Ok(Some(updates))
    }

    /// Delete deltas with a version `<= up_to`. Returns how many went.
    pub fn compact_deltas(&self, doc_id: Uuid, up_to: u64) -> Result<u64, DocStoreError> {
        let _guard = self.lock()?;
        let mut batch = WriteBatch::default();
        let removed = self.stage_delta_range_delete(&mut batch, doc_id, up_to)?;
        if removed > 0 {
            if let Some(mut meta) = self.load_metadata(doc_id)? {
                meta.delta_count = meta.delta_count.saturating_sub(removed);
                batch.put_cf(self.cf(CF_METADATA)?, doc_id.as_bytes(), meta.encode()?);
            }
            self.write(batch)?;
        }
        Ok(removed)
    }

    fn stage_delta_range_delete(
        &self,
        batch: &mut WriteBatch,
        doc_id: Uuid,
        up_to: u64,
    ) -> Result<u64, DocStoreError> {
        let cf = self.cf(CF_DELTAS)?;
        let start = delta_key(doc_id, 0);
        let mut removed = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, _) = item?;
            match parse_delta_key(doc_id, &key) {
                Some(version) if version <= up_to => {
                    batch.delete_cf(cf, &key);
                    removed += 1;
                }
                _ => break,
            }
        }
        Ok(removed)
    }

    // ─── Metadata ─────────────────────────────────────────────────────

    pub fn load_metadata(&self, doc_id: Uuid) -> Result<Option<DocumentMetadata>, DocStoreError> {
        match self.db.get_cf(self.cf(CF_METADATA)?, doc_id.as_bytes())? {
            Some(bytes) => DocumentMetadata::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn list_documents(&self) -> Result<Vec<Uuid>, DocStoreError> {
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_METADATA)?, IteratorMode::Start) {
            let (key, _) = item?;
            if let Ok(bytes) = <[u8; 16]>::try_from(&key[..]) {
                ids.push(Uuid::from_bytes(bytes));
            }
        }
        Ok(ids)
    }

    /// Remove the snapshot, deltas and metadata. Returns whether anything existed.
    pub fn delete_document(&self, doc_id: Uuid) -> Result<bool, DocStoreError> {
        let _guard = self.lock()?;
        let existed = self.document_exists(doc_id)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_DOCUMENTS)?, doc_id.as_bytes());
        batch.delete_cf(self.cf(CF_METADATA)?, doc_id.as_bytes());
        self.stage_delta_range_delete(&mut batch, doc_id, u64::MAX)?;
        self.write(batch)?;
        Ok(existed)
    }

    /// Flush memtables to disk.
    pub fn sync(&self) -> Result<(), DocStoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, DocStoreError> {
        self.db
            .cf_handle(name)
            .ok_or(DocStoreError::MissingColumnFamily(name))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, DocStoreError> {
        self.write_lock.lock().map_err(|_| DocStoreError::LockPoisoned)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), DocStoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }
}

fn delta_key(doc_id: Uuid, version: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(doc_id.as_bytes());
    key.extend_from_slice(&version.to_be_bytes());
    key
}

/// Version of a delta key belonging to `doc_id`.
fn parse_delta_key(doc_id: Uuid, key: &[u8]) -> Option<u64> {
    if key.len() != 24 || &key[..16] != doc_id.as_bytes() {
        return None;
    }
    let version: [u8; 8] = key[16..24].try_into().ok()?;
    Some(u64::from_be_bytes(version))
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

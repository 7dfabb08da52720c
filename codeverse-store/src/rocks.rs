//! RocksDB handle, column-family layout and shared helpers.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamily, ColumnFamilyDescriptor, DBCompressionType,
    DBWithThreadMode, Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;

pub(crate) const CF_USERS: &str = "users";
pub(crate) const CF_EMAILS: &str = "emails";
pub(crate) const CF_SESSIONS: &str = "sessions";
pub(crate) const CF_OTP: &str = "otp";
pub(crate) const CF_TICKETS: &str = "tickets";
pub(crate) const CF_LOGINS: &str = "logins";
pub(crate) const CF_PROJECTS: &str = "projects";
pub(crate) const CF_OWNERS: &str = "owners";
pub(crate) const CF_FILES: &str = "files";
pub(crate) const CF_MEMBERS: &str = "members";
pub(crate) const CF_ROOMS: &str = "rooms";
pub(crate) const CF_ACTIVITY: &str = "activity";

const COLUMN_FAMILIES: &[&str] = &[
    CF_USERS,
    CF_EMAILS,
    CF_SESSIONS,
    CF_OTP,
    CF_TICKETS,
    CF_LOGINS,
    CF_PROJECTS,
    CF_OWNERS,
    CF_FILES,
    CF_MEMBERS,
    CF_ROOMS,
    CF_ACTIVITY,
];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Shared block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write batch
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("codeverse_data/app"),
            block_cache_size: 64 * 1024 * 1024,
            bloom_filter_bits: 10,
            // Credential changes are fsynced before acknowledging
            sync_writes: true,
            max_open_files: 256,
        }
    }
}

impl StoreConfig {
    /// Small caches, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
        }
    }
}

/// Persistent store for users, credentials, sessions, projects and activity.
pub struct AppStore {
    pub(crate) db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Serializes read-modify-write sequences (counters, unique indexes, OTP attempts).
    write_lock: Mutex<()>,
}

impl AppStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

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
        log::info!("Opened app store at {}", config.path.display());

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
        opts.set_block_based_table_factory(&block_opts);
        opts.set_compression_type(DBCompressionType::Lz4);

        // Lookup-only families: point reads dominate
        if matches!(name, CF_USERS | CF_EMAILS | CF_SESSIONS | CF_OTP | CF_TICKETS | CF_ROOMS) {
            opts.optimize_for_point_lookup(8);
        }
        opts
    }

    /// Database directory.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    pub(crate) fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or(StoreError::MissingColumnFamily(name))
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub(crate) fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    pub(crate) fn get_value<T: DeserializeOwned>(
        &self,
        cf: &'static str,
        key: &[u8],
    ) -> Result<Option<T>, StoreError> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn put_value<T: Serialize>(
        &self,
        cf: &'static str,
        key: &[u8],
        value: &T,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(cf)?, key, encode(value)?);
        self.write(batch)
    }

    pub(crate) fn exists(&self, cf: &'static str, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.db.get_pinned_cf(self.cf(cf)?, key)?.is_some())
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in key order.
    pub(crate) fn scan_prefix(
        &self,
        cf: &'static str,
        prefix: &[u8],
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let handle = self.cf(cf)?;
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key, value));
        }
        Ok(out)
    }

    /// Every `(key, value)` pair in a column family.
    pub(crate) fn scan_all(
        &self,
        cf: &'static str,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, StoreError> {
        let handle = self.cf(cf)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            out.push(item?);
        }
        Ok(out)
    }

    /// Last key starting with `prefix`, if any.
    pub(crate) fn last_key_with_prefix(
        &self,
        cf: &'static str,
        prefix: &[u8],
        upper: &[u8],
    ) -> Result<Option<Box<[u8]>>, StoreError> {
        let handle = self.cf(cf)?;
        let mut iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(upper, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(prefix).then_some(key))
            }
            None => Ok(None),
        }
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

/// Concatenate key parts into one key.
pub(crate) fn compound_key(parts: &[&[u8]]) -> Vec<u8> {
    let len = parts.iter().map(|p| p.len()).sum();
    let mut key = Vec::with_capacity(len);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Decode the UUID stored in `key[offset..offset + 16]`.
pub(crate) fn uuid_at(key: &[u8], offset: usize, cf: &'static str) -> Result<uuid::Uuid, StoreError> {
    let bytes: [u8; 16] = key
        .get(offset..offset + 16)
        .and_then(|s| s.try_into().ok())
        .ok_or(StoreError::CorruptKey(cf))?;
    Ok(uuid::Uuid::from_bytes(bytes))
}

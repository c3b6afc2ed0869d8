//! Purpose: Key -> file cache with optional directory sharding, for one-object-per-file workloads.
//! Exports: `MetaFileCache`, `CacheKey`, `CacheValue`, `Json`, `migrate_to_obt`, `INDEX_FILE`.
//! Role: Alternative to `OneBigTable` when objects are fetched whole by key; can migrate into one.
//! Invariants: The key index file is rewritten via temp + rename on every registration change.
//! Invariants: Value files are written beside their target and renamed over it; a failed
//!             overwrite leaves the previous value readable.
//! Invariants: A cache directory keeps the shard level it was created with.
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{Frame, FrameKey};
use crate::core::obt::OneBigTable;
use crate::core::schema::{SchemaOptions, TableSchema};
use crate::core::table::{FrameTable, TableOptions};

pub const INDEX_FILE: &str = "index";
const INDEX_TMP: &str = "index.tmp";
const INDEX_VERSION: u32 = 1;

/// A cache key. The default file name is the SHA-256 hex digest of the key's JSON form.
pub trait CacheKey: Serialize + DeserializeOwned + Clone {
    fn filename(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("cache key is not serializable")
                .with_source(err)
        })?;
        Ok(hex_digest(&json))
    }
}

impl CacheKey for String {}
impl CacheKey for i64 {}
impl CacheKey for serde_json::Value {}

/// A value stored as exactly one file.
pub trait CacheValue: Sized {
    fn extension() -> &'static str;
    fn write_to(&self, path: &Path) -> Result<(), Error>;
    fn read_from(path: &Path) -> Result<Self, Error>;
}

impl CacheValue for Frame {
    fn extension() -> &'static str {
        "tbl"
    }

    fn write_to(&self, path: &Path) -> Result<(), Error> {
        let schema = TableSchema::infer(self, &SchemaOptions::default())?;
        let mut table = FrameTable::create(path, schema, TableOptions::default())?;
        table.append(self)?;
        table.close()
    }

    fn read_from(path: &Path) -> Result<Self, Error> {
        FrameTable::open_read_only(path)?.read_all()
    }
}

/// Wrapper storing any serde value as a JSON file.
#[derive(Clone, Debug, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize + DeserializeOwned> CacheValue for Json<T> {
    fn extension() -> &'static str {
        "json"
    }

    fn write_to(&self, path: &Path) -> Result<(), Error> {
        let bytes = serde_json::to_vec(&self.0).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("value is not serializable")
                .with_source(err)
        })?;
        fs::write(path, bytes).map_err(|err| Error::io(path, err))
    }

    fn read_from(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path).map_err(|err| Error::io(path, err))?;
        serde_json::from_slice(&bytes).map(Json).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("cached value is not valid JSON for this type")
                .with_path(path)
                .with_source(err)
        })
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile<T> {
    version: u32,
    level: usize,
    keys: T,
}

/// Files under `dir`, either flat (`level == 0`) or sharded by the first `level` file-name characters.
pub struct MetaFileCache<K, V> {
    dir: PathBuf,
    level: usize,
    keys: Vec<K>,
    names: HashSet<String>,
    _value: PhantomData<fn() -> V>,
}

impl<K: CacheKey, V: CacheValue> MetaFileCache<K, V> {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open(dir.as_ref(), 0)
    }

    pub fn leveled(dir: impl AsRef<Path>, level: usize) -> Result<Self, Error> {
        if level == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("shard level must be at least 1")
                .with_hint("Use MetaFileCache::new for a flat layout."));
        }
        Self::open(dir.as_ref(), level)
    }

    fn open(dir: &Path, level: usize) -> Result<Self, Error> {
        fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
        let index_path = dir.join(INDEX_FILE);
        let keys = match fs::read(&index_path) {
            Ok(bytes) => {
                let index: IndexFile<Vec<K>> = serde_json::from_slice(&bytes).map_err(|err| {
                    Error::new(ErrorKind::Corrupt)
                        .with_message("invalid cache index")
                        .with_path(&index_path)
                        .with_source(err)
                })?;
                if index.level != level {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "cache was created with shard level {}, opened with {level}",
                            index.level
                        ))
                        .with_path(dir));
                }
                index.keys
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(Error::io(&index_path, err)),
        };
        let names = keys
            .iter()
            .map(|key| key.filename())
            .collect::<Result<HashSet<_>, Error>>()?;
        debug!(dir = %dir.display(), shard_level = level, keys = keys.len(), "opened file cache");
        Ok(Self {
            dir: dir.to_path_buf(),
            level,
            keys,
            names,
            _value: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Keys in registration order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &K) -> Result<bool, Error> {
        Ok(self.names.contains(&key.filename()?))
    }

    pub fn path_for(&self, key: &K) -> Result<PathBuf, Error> {
        let name = key.filename()?;
        Ok(self.path_for_name(&name)?.0)
    }

    pub fn put(&mut self, key: K, value: &V) -> Result<(), Error> {
        let name = key.filename()?;
        let (path, shard) = self.path_for_name(&name)?;
        fs::create_dir_all(&shard).map_err(|err| Error::io(&shard, err))?;
        let tmp = shard.join(format!("{name}.{}.tmp", V::extension()));
        remove_if_present(&tmp)?;
        if let Err(err) = value.write_to(&tmp) {
            if let Err(cleanup) = remove_if_present(&tmp) {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial cache file");
            }
            return Err(err);
        }
        fs::rename(&tmp, &path).map_err(|err| Error::io(&path, err))?;
        if self.names.insert(name) {
            self.keys.push(key);
            self.persist()?;
        }
        Ok(())
    }

    pub fn get(&self, key: &K) -> Result<V, Error> {
        let name = key.filename()?;
        if !self.names.contains(&name) {
            return Err(Error::new(ErrorKind::NoSuchKey)
                .with_message("key is not in the cache")
                .with_path(&self.dir));
        }
        V::read_from(&self.path_for_name(&name)?.0)
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&mut self, key: &K) -> Result<bool, Error> {
        let name = key.filename()?;
        if !self.names.remove(&name) {
            return Ok(false);
        }
        remove_if_present(&self.path_for_name(&name)?.0)?;
        let mut kept = Vec::with_capacity(self.keys.len());
        for existing in self.keys.drain(..) {
            if existing.filename()? != name {
                kept.push(existing);
            }
        }
        self.keys = kept;
        self.persist()?;
        Ok(true)
    }

    /// Copies every key missing from `other`; returns how many were copied.
    pub fn migrate_into<W: CacheValue + From<V>>(&self, other: &mut MetaFileCache<K, W>) -> Result<usize, Error> {
        let mut copied = 0;
        for key in &self.keys {
            if other.contains(key)? {
                continue;
            }
            let value = W::from(self.get(key)?);
            other.put(key.clone(), &value)?;
            copied += 1;
        }
        info!(from = %self.dir.display(), to = %other.dir.display(), copied, "migrated cache");
        Ok(copied)
    }

    fn path_for_name(&self, name: &str) -> Result<(PathBuf, PathBuf), Error> {
        if name.is_empty()
            || name == INDEX_FILE
            || name == INDEX_TMP
            || name.starts_with('.')
            || name.contains(['/', '\\'])
        {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid cache file name {name:?}")));
        }
        let shard = if self.level == 0 {
            self.dir.clone()
        } else {
            let prefix = name.get(..self.level).ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("cache file name {name:?} is shorter than the shard level"))
            })?;
            self.dir.join(prefix)
        };
        let path = shard.join(format!("{name}.{}", V::extension()));
        Ok((path, shard))
    }

    fn persist(&self) -> Result<(), Error> {
        let index = IndexFile {
            version: INDEX_VERSION,
            level: self.level,
            keys: self.keys.as_slice(),
        };
        let bytes = serde_json::to_vec(&index).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode cache index")
                .with_source(err)
        })?;
        let tmp = self.dir.join(INDEX_TMP);
        fs::write(&tmp, bytes).map_err(|err| Error::io(&tmp, err))?;
        let target = self.dir.join(INDEX_FILE);
        fs::rename(&tmp, &target).map_err(|err| Error::io(&target, err))
    }
}

fn remove_if_present(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(path, err)),
    }
}

/// Copies every cached frame whose key the store does not hold yet; returns how many were copied.
pub fn migrate_to_obt<K>(cache: &MetaFileCache<K, Frame>, store: &mut OneBigTable) -> Result<usize, Error>
where
    K: CacheKey,
    FrameKey: From<K>,
{
    let existing = store.keys()?;
    let mut copied = 0;
    for key in cache.keys() {
        let frame_key = FrameKey::from(key.clone());
        if existing.contains(&frame_key) {
            continue;
        }
        store.set(frame_key, &cache.get(key)?)?;
        copied += 1;
    }
    info!(from = %cache.dir().display(), to = %store.path().display(), copied, "migrated cache into store");
    Ok(copied)
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

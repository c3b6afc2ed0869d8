//! Purpose: Host many logical frames inside one physical table, discriminated by a frame-key column.
//! Exports: `OneBigTable`, `OpenMode`, `StoreOptions`, `StoreState`, file name constants.
//! Role: Store-level API over `FrameTable`; owns the base table and its optional index-ordered copy.
//! Invariants: `obt.tbl` is the source of truth; `indexed.tbl` is derived and may be dropped at any time.
//! Invariants: The schema is fixed by the first write (or `set_schema`) and never changes.
//! Invariants: Frames returned by `get` never carry the frame-key column.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{Column, ColumnData, Frame, FrameKey};
use crate::core::query::{Predicate, Query};
use crate::core::schema::{sidecar_path, SchemaOptions, TableSchema};
use crate::core::table::{FrameTable, MetadataMode, TableOptions};

pub const GROUP_FILE: &str = "group.json";
pub const BASE_TABLE: &str = "obt.tbl";
pub const INDEXED_TABLE: &str = "indexed.tbl";
const INDEXED_TMP: &str = "indexed.tbl.tmp";
const GROUP_TYPE: &str = "one_big_table";
pub const DEFAULT_FRAME_KEY: &str = "frame_key";
pub const DEFAULT_FRAME_KEY_WIDTH: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenMode {
    /// Existing store, no mutation.
    Read,
    /// Create if missing, keep existing rows.
    Append,
    /// Start over, discarding any existing store files.
    Write,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreState {
    Uninitialized,
    SchemaLocked,
    Reindexed,
    Closed,
}

#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub frame_key: String,
    /// Minimum width of an inferred string frame-key column.
    pub frame_key_width: usize,
    pub schema: SchemaOptions,
    pub table: TableOptions,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_key(mut self, name: impl Into<String>) -> Self {
        self.frame_key = name.into();
        self
    }

    pub fn with_frame_key_width(mut self, width: usize) -> Self {
        self.frame_key_width = width;
        self
    }

    pub fn with_schema(mut self, schema: SchemaOptions) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_table(mut self, table: TableOptions) -> Self {
        self.table = table;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            frame_key: DEFAULT_FRAME_KEY.to_string(),
            frame_key_width: DEFAULT_FRAME_KEY_WIDTH,
            schema: SchemaOptions::default(),
            table: TableOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct GroupMeta {
    group_type: String,
    frame_key: String,
    table: String,
}

impl GroupMeta {
    fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(GROUP_FILE);
        let bytes = fs::read(&path).map_err(|err| {
            Error::io(&path, err).with_hint("Not a store directory; open with append or write mode to create one.")
        })?;
        let meta: GroupMeta = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("invalid group metadata")
                .with_path(&path)
                .with_source(err)
        })?;
        if meta.group_type != GROUP_TYPE {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unexpected group type {:?}", meta.group_type))
                .with_path(&path));
        }
        Ok(meta)
    }

    fn store(&self, root: &Path) -> Result<(), Error> {
        let path = root.join(GROUP_FILE);
        let bytes = serde_json::to_vec_pretty(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode group metadata")
                .with_source(err)
        })?;
        fs::write(&path, bytes).map_err(|err| Error::io(&path, err))
    }
}

/// A directory holding one base table of tagged rows plus store metadata.
pub struct OneBigTable {
    root: PathBuf,
    mode: OpenMode,
    options: StoreOptions,
    frame_key: String,
    base: Option<FrameTable>,
    indexed: Option<FrameTable>,
    closed: bool,
}

impl OneBigTable {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, options: StoreOptions) -> Result<Self, Error> {
        let root = path.as_ref().to_path_buf();
        if options.frame_key.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("frame key name must be non-empty"));
        }

        let meta = match mode {
            OpenMode::Read => GroupMeta::load(&root)?,
            OpenMode::Append if root.join(GROUP_FILE).exists() => GroupMeta::load(&root)?,
            OpenMode::Append | OpenMode::Write => {
                fs::create_dir_all(&root).map_err(|err| Error::io(&root, err))?;
                if mode == OpenMode::Write {
                    discard_store_files(&root)?;
                }
                let meta = GroupMeta {
                    group_type: GROUP_TYPE.to_string(),
                    frame_key: options.frame_key.clone(),
                    table: BASE_TABLE.to_string(),
                };
                meta.store(&root)?;
                meta
            }
        };
        if meta.frame_key != options.frame_key {
            debug!(
                requested = %options.frame_key,
                stored = %meta.frame_key,
                "store keeps its recorded frame key"
            );
        }

        let writable = mode != OpenMode::Read;
        if writable {
            remove_stale(&root.join(INDEXED_TMP))?;
        }

        let base_path = root.join(&meta.table);
        let base = if base_path.exists() {
            Some(open_table(&base_path, writable)?)
        } else {
            None
        };
        let indexed_path = root.join(INDEXED_TABLE);
        let indexed = match &base {
            Some(base) if indexed_path.exists() => {
                let indexed = FrameTable::open_read_only(&indexed_path)?;
                if indexed.nrows() == base.nrows() {
                    Some(indexed)
                } else {
                    warn!(
                        path = %indexed_path.display(),
                        indexed_rows = indexed.nrows(),
                        base_rows = base.nrows(),
                        "ignoring out-of-date index-ordered copy"
                    );
                    drop(indexed);
                    if writable {
                        fs::remove_file(&indexed_path).map_err(|err| Error::io(&indexed_path, err))?;
                    }
                    None
                }
            }
            _ => None,
        };
        debug!(root = %root.display(), ?mode, rows = base.as_ref().map_or(0, FrameTable::nrows), "opened store");

        let mut store = Self {
            root,
            mode,
            options,
            frame_key: meta.frame_key,
            base,
            indexed,
            closed: false,
        };
        if let Some(base) = store.base.as_mut() {
            base.set_durability(store.options.table.durability);
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn frame_key(&self) -> &str {
        &self.frame_key
    }

    pub fn state(&self) -> StoreState {
        if self.closed {
            StoreState::Closed
        } else if self.base.is_none() {
            StoreState::Uninitialized
        } else if self.indexed.is_some() {
            StoreState::Reindexed
        } else {
            StoreState::SchemaLocked
        }
    }

    pub fn schema(&self) -> Option<&TableSchema> {
        self.base.as_ref().map(FrameTable::schema)
    }

    pub fn nrows(&self) -> usize {
        self.base.as_ref().map_or(0, FrameTable::nrows)
    }

    /// Declares the schema up front. Only allowed before anything has been written.
    pub fn set_schema(&mut self, schema: TableSchema) -> Result<(), Error> {
        self.ensure_writable()?;
        if self.base.is_some() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("schema is immutable once the store holds a table")
                .with_path(&self.root));
        }
        let schema = match schema.frame_key() {
            None => schema.with_frame_key(self.frame_key.clone())?,
            Some(name) if name == self.frame_key => schema,
            Some(name) => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("schema names frame key {name:?}, store uses {:?}", self.frame_key))
                    .with_column(name));
            }
        };
        self.create_base(schema)
    }

    /// Writes `frame` under `key`. Frames already carrying the frame-key column are appended as-is.
    pub fn set(&mut self, key: impl Into<FrameKey>, frame: &Frame) -> Result<usize, Error> {
        self.ensure_writable()?;
        if frame.is_empty() {
            return Ok(0);
        }
        let key = key.into();
        if frame.has_column(&self.frame_key) {
            return self.write(frame);
        }
        let tagged = frame.with_column(Column::new(
            self.frame_key.clone(),
            ColumnData::broadcast(&key.to_scalar(), frame.len()),
        ))?;
        self.write(&tagged)
    }

    /// Appends rows that already carry their frame key.
    pub fn append(&mut self, frame: &Frame) -> Result<usize, Error> {
        self.ensure_writable()?;
        if frame.is_empty() {
            return Ok(0);
        }
        if !frame.has_column(&self.frame_key) {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message("appended frames must carry the frame-key column")
                .with_column(&self.frame_key)
                .with_hint("Use set(key, frame) to tag untagged frames."));
        }
        self.write(frame)
    }

    pub fn get(&self, key: impl Into<FrameKey>) -> Result<Frame, Error> {
        let key = key.into();
        let table = self.active()?;
        let predicate = Query::new(table.schema(), &self.root)
            .col(&self.frame_key)?
            .eq(key.to_scalar())?;
        let frame = table.read_where(predicate.text())?;
        if frame.is_empty() {
            return Err(Error::new(ErrorKind::NoSuchKey)
                .with_message(format!("no frame stored under key {key}"))
                .with_path(&self.root));
        }
        Ok(frame.without_column(&self.frame_key))
    }

    /// Distinct frame keys; reads only the frame-key column.
    pub fn keys(&self) -> Result<BTreeSet<FrameKey>, Error> {
        let table = match self.active() {
            Ok(table) => table,
            Err(err) if err.kind() == ErrorKind::Uninitialized => return Ok(BTreeSet::new()),
            Err(err) => return Err(err),
        };
        match table.read_column(&self.frame_key)? {
            ColumnData::Int64(values) => Ok(values.into_iter().map(FrameKey::Int).collect()),
            ColumnData::Str(values) => Ok(values.into_iter().map(FrameKey::Str).collect()),
            other => Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("frame key column decoded as {}", other.dtype_name()))
                .with_column(&self.frame_key)
                .with_path(&self.root)),
        }
    }

    /// Query builder for predicates executed by [`OneBigTable::select`].
    pub fn query(&self) -> Result<Query<'_>, Error> {
        let table = self.active()?;
        Ok(Query::new(table.schema(), &self.root))
    }

    /// Predicate scan across all frames; the frame-key column is kept.
    pub fn select(&self, predicate: &Predicate) -> Result<Frame, Error> {
        let table = self.active()?;
        predicate.check_origin(&self.root)?;
        table.read_where(predicate.text())
    }

    /// Raw native-predicate scan, as used by the CLI.
    pub fn select_where(&self, predicate: &str) -> Result<Frame, Error> {
        self.active()?.read_where(predicate)
    }

    /// Rewrites the rows in index order into `indexed.tbl`; later reads prefer that copy.
    pub fn sort_index(&mut self) -> Result<(), Error> {
        self.ensure_writable()?;
        let base = self.base.as_ref().ok_or_else(|| self.uninitialized())?;
        let sorted = base.read_all()?.sort_by_index();

        let tmp = self.root.join(INDEXED_TMP);
        remove_stale(&tmp)?;
        let options = self.options.table.with_metadata_mode(MetadataMode::Embedded);
        let mut copy = FrameTable::create(&tmp, base.schema().clone(), options)?;
        copy.append(&sorted)?;
        copy.close()?;

        self.indexed = None;
        let target = self.root.join(INDEXED_TABLE);
        fs::rename(&tmp, &target).map_err(|err| Error::io(&target, err))?;
        self.indexed = Some(FrameTable::open_read_only(&target)?);
        info!(root = %self.root.display(), rows = sorted.len(), "rebuilt index-ordered copy");
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.indexed = None;
        if let Some(base) = self.base.take() {
            base.close()?;
        }
        self.closed = true;
        debug!(root = %self.root.display(), "closed store");
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<usize, Error> {
        if self.base.is_none() {
            let mut schema = TableSchema::infer(frame, &self.options.schema)?;
            schema.widen_string(&self.frame_key, self.options.frame_key_width);
            let schema = schema.with_frame_key(self.frame_key.clone())?;
            self.create_base(schema)?;
        }
        let Some(base) = self.base.as_mut() else {
            return Err(self.uninitialized());
        };
        // The sorted copy goes before the base commit; a crash in between must not hide rows.
        if !frame.is_empty() && self.indexed.is_some() {
            base.schema().check_frame(frame)?;
            self.indexed = None;
            let target = self.root.join(INDEXED_TABLE);
            fs::remove_file(&target).map_err(|err| Error::io(&target, err))?;
            info!(root = %self.root.display(), "append invalidated index-ordered copy");
        }
        base.append(frame)
    }

    fn create_base(&mut self, schema: TableSchema) -> Result<(), Error> {
        let path = self.root.join(BASE_TABLE);
        let mut table = FrameTable::create(&path, schema, self.options.table)?;
        table.set_durability(self.options.table.durability);
        self.base = Some(table);
        Ok(())
    }

    fn active(&self) -> Result<&FrameTable, Error> {
        self.ensure_open()?;
        self.indexed
            .as_ref()
            .or(self.base.as_ref())
            .ok_or_else(|| self.uninitialized())
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store is closed")
                .with_path(&self.root));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        self.ensure_open()?;
        if self.mode == OpenMode::Read {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store is open read-only")
                .with_path(&self.root));
        }
        Ok(())
    }

    fn uninitialized(&self) -> Error {
        Error::new(ErrorKind::Uninitialized)
            .with_message("store has no schema yet")
            .with_path(&self.root)
            .with_hint("Write a frame or call set_schema first.")
    }
}

impl Drop for OneBigTable {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(root = %self.root.display(), error = %err, "failed to close store");
        }
    }
}

fn open_table(path: &Path, writable: bool) -> Result<FrameTable, Error> {
    if writable {
        FrameTable::open(path)
    } else {
        FrameTable::open_read_only(path)
    }
}

fn remove_stale(path: &Path) -> Result<(), Error> {
    match fs::remove_file(path) {
        Ok(()) => {
            warn!(path = %path.display(), "removed stale temporary table");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::io(path, err)),
    }
}

fn discard_store_files(root: &Path) -> Result<(), Error> {
    let base = root.join(BASE_TABLE);
    for path in [
        root.join(GROUP_FILE),
        sidecar_path(&base),
        base,
        root.join(INDEXED_TABLE),
        root.join(INDEXED_TMP),
    ] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(Error::io(&path, err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OneBigTable, OpenMode, StoreOptions, StoreState, INDEXED_TABLE, INDEXED_TMP};
    use crate::core::error::ErrorKind;
    use crate::core::frame::{Column, ColumnData, Frame, FrameKey};
    use crate::core::schema::{ColumnDescriptor, SemanticType, TableSchema};
    use std::fs;

    fn frame(values: &[i64]) -> Frame {
        Frame::new(
            Column::new("i", ColumnData::Int64(values.to_vec())),
            vec![Column::new("v", ColumnData::Float64(values.iter().map(|v| *v as f64 / 2.0).collect()))],
        )
        .unwrap()
    }

    fn open(dir: &std::path::Path, mode: OpenMode) -> OneBigTable {
        OneBigTable::open(dir.join("store"), mode, StoreOptions::default()).expect("open store")
    }

    #[test]
    fn lifecycle_states() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert_eq!(store.get("a").unwrap_err().kind(), ErrorKind::Uninitialized);
        assert!(store.keys().unwrap().is_empty());

        store.set("a", &frame(&[3, 1, 2])).unwrap();
        assert_eq!(store.state(), StoreState::SchemaLocked);
        store.sort_index().unwrap();
        assert_eq!(store.state(), StoreState::Reindexed);
        store.set("b", &frame(&[9])).unwrap();
        assert_eq!(store.state(), StoreState::SchemaLocked);
        assert!(!dir.path().join("store").join(INDEXED_TABLE).exists());

        store.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        assert_eq!(store.keys().unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn out_of_date_sorted_copy_is_ignored_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let saved = dir.path().join("saved.tbl");
        {
            let mut store = open(dir.path(), OpenMode::Write);
            store.set("a", &frame(&[2, 1])).unwrap();
            store.sort_index().unwrap();
            fs::copy(root.join(INDEXED_TABLE), &saved).unwrap();
            store.set("b", &frame(&[3])).unwrap();
            assert!(!root.join(INDEXED_TABLE).exists());
        }
        // A crash after the base commit but before the sorted copy was removed.
        fs::copy(&saved, root.join(INDEXED_TABLE)).unwrap();

        let reader = open(dir.path(), OpenMode::Read);
        assert_eq!(reader.state(), StoreState::SchemaLocked);
        let keys: Vec<FrameKey> = reader.keys().unwrap().into_iter().collect();
        assert_eq!(keys, vec![FrameKey::from("a"), FrameKey::from("b")]);
        assert_eq!(reader.get("b").unwrap(), frame(&[3]));
        assert!(root.join(INDEXED_TABLE).exists());
        drop(reader);

        let writer = open(dir.path(), OpenMode::Append);
        assert_eq!(writer.state(), StoreState::SchemaLocked);
        assert!(!root.join(INDEXED_TABLE).exists());
    }

    #[test]
    fn mismatched_append_keeps_the_sorted_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set("a", &frame(&[2, 1])).unwrap();
        store.sort_index().unwrap();
        let wrong = frame(&[5]).without_column("v");
        assert_eq!(store.set("a", &wrong).unwrap_err().kind(), ErrorKind::SchemaMismatch);
        assert_eq!(store.state(), StoreState::Reindexed);
        assert!(dir.path().join("store").join(INDEXED_TABLE).exists());
    }

    #[test]
    fn get_strips_the_frame_key_and_isolates_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set("a", &frame(&[1, 2])).unwrap();
        store.set("b", &frame(&[3])).unwrap();
        store.set("a", &frame(&[4])).unwrap();

        assert_eq!(store.get("a").unwrap(), frame(&[1, 2, 4]));
        assert_eq!(store.get("b").unwrap(), frame(&[3]));
        assert_eq!(store.get("c").unwrap_err().kind(), ErrorKind::NoSuchKey);
        let keys: Vec<FrameKey> = store.keys().unwrap().into_iter().collect();
        assert_eq!(keys, vec![FrameKey::from("a"), FrameKey::from("b")]);
    }

    #[test]
    fn pretagged_frames_append_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set(1i64, &frame(&[1])).unwrap();
        let tagged = frame(&[5, 6])
            .with_column(Column::new("frame_key", ColumnData::Int64(vec![2, 3])))
            .unwrap();
        store.append(&tagged).unwrap();
        assert_eq!(store.get(3i64).unwrap(), frame(&[6]));
        assert_eq!(store.append(&frame(&[1])).unwrap_err().kind(), ErrorKind::SchemaMismatch);
        assert_eq!(store.set(1i64, &frame(&[])).unwrap(), 0);
    }

    #[test]
    fn schema_is_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set("a", &frame(&[1])).unwrap();
        let wider = frame(&[2])
            .with_column(Column::new("extra", ColumnData::Bool(vec![true])))
            .unwrap();
        assert_eq!(store.set("a", &wider).unwrap_err().kind(), ErrorKind::SchemaMismatch);
        let schema = store.schema().unwrap().clone();
        assert_eq!(store.set_schema(schema).unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(store.nrows(), 1);
    }

    #[test]
    fn declared_schema_gets_the_frame_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        let schema = TableSchema::new(
            ColumnDescriptor::new("i", SemanticType::Int64),
            vec![
                ColumnDescriptor::new("v", SemanticType::Float64),
                ColumnDescriptor::new("frame_key", SemanticType::FixedString { width: 4 }),
            ],
        )
        .unwrap();
        store.set_schema(schema).unwrap();
        assert_eq!(store.schema().unwrap().frame_key(), Some("frame_key"));
        store.set("abcd", &frame(&[1])).unwrap();
        assert_eq!(store.get("abcd").unwrap(), frame(&[1]));
        assert_eq!(store.set("abcde", &frame(&[2])).unwrap_err().kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn reopen_modes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open(dir.path(), OpenMode::Write);
            store.set("a", &frame(&[1, 2])).unwrap();
        }
        {
            let mut store = open(dir.path(), OpenMode::Append);
            store.set("b", &frame(&[3])).unwrap();
            assert_eq!(store.nrows(), 3);
        }
        let mut reader = open(dir.path(), OpenMode::Read);
        assert_eq!(reader.keys().unwrap().len(), 2);
        assert_eq!(reader.set("c", &frame(&[1])).unwrap_err().kind(), ErrorKind::Usage);
        drop(reader);

        let fresh = open(dir.path(), OpenMode::Write);
        assert_eq!(fresh.state(), StoreState::Uninitialized);
        assert_eq!(fresh.nrows(), 0);
    }

    #[test]
    fn read_mode_requires_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = OneBigTable::open(dir.path().join("missing"), OpenMode::Read, StoreOptions::default())
            .err()
            .expect("missing store");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stale_temp_copy_is_removed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open(dir.path(), OpenMode::Write);
            store.set("a", &frame(&[2, 1])).unwrap();
        }
        let tmp = dir.path().join("store").join(INDEXED_TMP);
        fs::write(&tmp, b"partial").unwrap();
        let store = open(dir.path(), OpenMode::Append);
        assert!(!tmp.exists());
        assert_eq!(store.get("a").unwrap(), frame(&[2, 1]));
    }

    #[test]
    fn sorted_copy_serves_reads_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set("a", &frame(&[5, 3, 4])).unwrap();
        store.set("b", &frame(&[1])).unwrap();
        store.sort_index().unwrap();
        assert_eq!(store.get("a").unwrap(), frame(&[3, 4, 5]));
        drop(store);

        let reader = open(dir.path(), OpenMode::Read);
        assert_eq!(reader.state(), StoreState::Reindexed);
        assert_eq!(reader.get("a").unwrap(), frame(&[3, 4, 5]));
    }

    #[test]
    fn select_runs_predicates_built_from_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open(dir.path(), OpenMode::Write);
        store.set("a", &frame(&[1, 2, 3])).unwrap();
        store.set("b", &frame(&[4, 5])).unwrap();
        let pred = {
            let q = store.query().unwrap();
            q.col("v").unwrap().ge(1.0).unwrap() & q.col("frame_key").unwrap().eq("a").unwrap()
        };
        let out = store.select(&pred).unwrap();
        assert_eq!(out.without_column("frame_key"), frame(&[2, 3]));

        let foreign = {
            let schema = store.schema().unwrap().clone();
            crate::core::query::Query::new(&schema, std::path::Path::new("/elsewhere"))
                .col("v")
                .unwrap()
                .ge(0.0)
                .unwrap()
        };
        assert_eq!(store.select(&foreign).unwrap_err().kind(), ErrorKind::Usage);
    }
}

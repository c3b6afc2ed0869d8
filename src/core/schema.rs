//! Purpose: Describe, infer, validate and persist the schema of one physical table.
//! Exports: `SemanticType`, `Atom`, `TimeUnit`, `ColumnDescriptor`, `TableSchema`, `SchemaOptions`.
//! Role: The physical row layout loses semantic type (a datetime is an i64 on disk),
//!       so the schema blob travels with every table and drives decoding.
//! Invariants: The index column is always at position 0.
//! Invariants: A schema is immutable once the table that carries it exists.
//! Invariants: Appends must match column names *and* order exactly; no reordering.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::Frame;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_MIN_STRING_WIDTH: usize = 10;
const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimeUnit {
    pub fn nanos(self) -> i128 {
        match self {
            TimeUnit::Second => 1_000_000_000,
            TimeUnit::Millisecond => 1_000_000,
            TimeUnit::Microsecond => 1_000,
            TimeUnit::Nanosecond => 1,
        }
    }
}

/// Logical value domain of a column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticType {
    Int64,
    Float64,
    Bool,
    FixedString { width: usize },
    DatetimeEpoch { unit: TimeUnit },
}

impl SemanticType {
    pub fn atom(self) -> Atom {
        match self {
            SemanticType::Int64 | SemanticType::DatetimeEpoch { .. } => Atom::Int64,
            SemanticType::Float64 => Atom::Float64,
            SemanticType::Bool => Atom::Bool,
            SemanticType::FixedString { width } => Atom::Bytes(width),
        }
    }
}

/// Fixed-width physical layout of one column inside a row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Atom {
    Int64,
    Float64,
    Bool,
    Bytes(usize),
}

impl Atom {
    pub fn size(self) -> usize {
        match self {
            Atom::Int64 | Atom::Float64 => 8,
            Atom::Bool => 1,
            Atom::Bytes(width) => width,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }

    pub fn atom(&self) -> Atom {
        self.semantic_type.atom()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SchemaOptions {
    pub min_string_width: usize,
    pub datetime_unit: TimeUnit,
}

impl SchemaOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_string_width(mut self, width: usize) -> Self {
        self.min_string_width = width;
        self
    }

    pub fn with_datetime_unit(mut self, unit: TimeUnit) -> Self {
        self.datetime_unit = unit;
        self
    }
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            min_string_width: DEFAULT_MIN_STRING_WIDTH,
            datetime_unit: TimeUnit::Nanosecond,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    version: u32,
    columns: Vec<ColumnDescriptor>,
    index_name: String,
    #[serde(default)]
    frame_key: Option<String>,
    #[serde(default)]
    meta: Map<String, Value>,
}

impl TableSchema {
    pub fn new(index: ColumnDescriptor, columns: Vec<ColumnDescriptor>) -> Result<Self, Error> {
        let index_name = index.name.clone();
        let mut all = Vec::with_capacity(columns.len() + 1);
        all.push(index);
        all.extend(columns);
        let schema = Self {
            version: SCHEMA_VERSION,
            columns: all,
            index_name,
            frame_key: None,
            meta: Map::new(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Derives a schema from the first non-empty frame written to a table.
    pub fn infer(frame: &Frame, options: &SchemaOptions) -> Result<Self, Error> {
        if frame.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("a zero-row frame cannot seed a schema")
                .with_hint("Write at least one row, or declare the schema explicitly."));
        }
        let index = frame.index();
        let index_type = codec::infer(&index.data, options).map_err(|err| err.with_column(&index.name))?;
        let columns = frame
            .columns()
            .iter()
            .map(|column| {
                codec::infer(&column.data, options)
                    .map(|semantic_type| ColumnDescriptor::new(column.name.clone(), semantic_type))
                    .map_err(|err| err.with_column(&column.name))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Self::new(ColumnDescriptor::new(index.name.clone(), index_type), columns)
    }

    /// Marks `name` as the frame-key column; it must be an integer or string column.
    pub fn with_frame_key(mut self, name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let Some(descriptor) = self.column(&name) else {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message("frame key column is not part of the schema")
                .with_column(name));
        };
        match descriptor.semantic_type {
            SemanticType::Int64 | SemanticType::FixedString { .. } => {}
            other => {
                return Err(Error::new(ErrorKind::UnsupportedType)
                    .with_message(format!("frame key must be int64 or string, found {other:?}"))
                    .with_column(name));
            }
        }
        if name == self.index_name {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("the index cannot double as the frame key")
                .with_column(name));
        }
        self.frame_key = Some(name);
        Ok(self)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Raises the width of a fixed-string column; only meaningful before the table exists.
    pub(crate) fn widen_string(&mut self, name: &str, min_width: usize) {
        if let Some(descriptor) = self.columns.iter_mut().find(|c| c.name == name) {
            if let SemanticType::FixedString { width } = descriptor.semantic_type {
                descriptor.semantic_type = SemanticType::FixedString {
                    width: width.max(min_width),
                };
            }
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &ColumnDescriptor {
        &self.columns[0]
    }

    pub fn frame_key(&self) -> Option<&str> {
        self.frame_key.as_deref()
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// All columns in row order, index first.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn data_columns(&self) -> &[ColumnDescriptor] {
        &self.columns[1..]
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn row_len(&self) -> usize {
        self.columns.iter().map(|column| column.atom().size()).sum()
    }

    /// Byte offset of each column within a row.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offset = 0;
        self.columns
            .iter()
            .map(|column| {
                let start = offset;
                offset += column.atom().size();
                start
            })
            .collect()
    }

    /// Rejects frames whose index name, column set, or column order differ.
    pub fn check_frame(&self, frame: &Frame) -> Result<(), Error> {
        if frame.index().name != self.index_name {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message(format!(
                    "index is named `{}` but the table index is `{}`",
                    frame.index().name,
                    self.index_name
                ))
                .with_column(&frame.index().name));
        }
        let expected: Vec<&str> = self.data_columns().iter().map(|c| c.name.as_str()).collect();
        let actual = frame.column_names();
        if expected != actual {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message(format!("expected columns {expected:?}, got {actual:?}"))
                .with_hint("Columns must match the stored schema in both names and order."));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode schema")
                .with_source(err)
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let schema: Self = serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("unreadable schema metadata")
                .with_source(err)
        })?;
        if schema.version != SCHEMA_VERSION {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!("unsupported schema version {}", schema.version)));
        }
        schema.validate().map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("stored schema is invalid")
                .with_source(err)
        })?;
        Ok(schema)
    }

    pub fn write_sidecar(&self, table_path: &Path) -> Result<PathBuf, Error> {
        let path = sidecar_path(table_path);
        let bytes = self.to_bytes()?;
        fs::write(&path, bytes).map_err(|err| Error::io(&path, err))?;
        Ok(path)
    }

    pub fn read_sidecar(table_path: &Path) -> Result<Self, Error> {
        let path = sidecar_path(table_path);
        let bytes = fs::read(&path).map_err(|err| Error::io(&path, err))?;
        Self::from_bytes(&bytes).map_err(|err| err.with_path(&path))
    }

    fn validate(&self) -> Result<(), Error> {
        if self.columns.first().map(|c| c.name.as_str()) != Some(self.index_name.as_str()) {
            return Err(Error::new(ErrorKind::Usage).with_message("index must be the first column"));
        }
        for (pos, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(Error::new(ErrorKind::Usage).with_message("column names must be non-empty"));
            }
            if self.columns[..pos].iter().any(|c| c.name == column.name) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("duplicate column name")
                    .with_column(&column.name));
            }
            if column.atom().size() == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("fixed-width strings need a non-zero width")
                    .with_column(&column.name));
            }
        }
        if let Some(frame_key) = &self.frame_key {
            if self.column(frame_key).is_none() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("frame key column is missing")
                    .with_column(frame_key));
            }
        }
        Ok(())
    }
}

/// Deterministic sidecar location for a table stored in directory-backed mode.
pub fn sidecar_path(table_path: &Path) -> PathBuf {
    let mut name = table_path.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::{sidecar_path, Atom, ColumnDescriptor, SchemaOptions, SemanticType, TableSchema, TimeUnit};
    use crate::core::error::ErrorKind;
    use crate::core::frame::{Column, ColumnData, Frame};
    use serde_json::json;
    use std::path::Path;
    use time::macros::datetime;

    fn frame() -> Frame {
        Frame::new(
            Column::new(
                "timestamp",
                ColumnData::Datetime(vec![datetime!(2000-01-01 0:00 UTC), datetime!(2000-01-01 0:30 UTC)]),
            ),
            vec![
                Column::new("open", ColumnData::Float64(vec![1.0, 2.0])),
                Column::new("symbol", ColumnData::Str(vec!["A".into(), "a-much-longer-name".into()])),
                Column::new("halted", ColumnData::Bool(vec![false, true])),
            ],
        )
        .expect("frame")
    }

    #[test]
    fn infer_builds_ordered_descriptors() {
        let schema = TableSchema::infer(&frame(), &SchemaOptions::default()).expect("infer");
        assert_eq!(schema.index_name(), "timestamp");
        let names: Vec<_> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["timestamp", "open", "symbol", "halted"]);
        assert_eq!(
            schema.index().semantic_type,
            SemanticType::DatetimeEpoch { unit: TimeUnit::Nanosecond }
        );
        assert_eq!(
            schema.column("symbol").unwrap().semantic_type,
            SemanticType::FixedString { width: 18 }
        );
        assert_eq!(schema.row_len(), 8 + 8 + 18 + 1);
        assert_eq!(schema.offsets(), vec![0, 8, 16, 34]);
    }

    #[test]
    fn empty_frame_cannot_seed_schema() {
        let empty = frame().take(&[]);
        let err = TableSchema::infer(&empty, &SchemaOptions::default()).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn check_frame_rejects_reordered_columns() {
        let schema = TableSchema::infer(&frame(), &SchemaOptions::default()).expect("infer");
        schema.check_frame(&frame()).expect("same layout");

        let original = frame();
        let reordered = Frame::new(
            original.index().clone(),
            vec![
                original.column("symbol").unwrap().clone(),
                original.column("open").unwrap().clone(),
                original.column("halted").unwrap().clone(),
            ],
        )
        .expect("frame");
        let err = schema.check_frame(&reordered).expect_err("order");
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let missing = frame().without_column("halted");
        let err = schema.check_frame(&missing).expect_err("set");
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn frame_key_must_be_int_or_string() {
        let schema = TableSchema::infer(&frame(), &SchemaOptions::default()).expect("infer");
        let keyed = schema.clone().with_frame_key("symbol").expect("string key");
        assert_eq!(keyed.frame_key(), Some("symbol"));

        let err = schema.clone().with_frame_key("open").expect_err("float key");
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        let err = schema.with_frame_key("nope").expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn bytes_round_trip_keeps_semantic_types_and_meta() {
        let schema = TableSchema::infer(&frame(), &SchemaOptions::default())
            .expect("infer")
            .with_frame_key("symbol")
            .expect("key")
            .with_meta("source", json!("unit-test"));
        let decoded = TableSchema::from_bytes(&schema.to_bytes().unwrap()).expect("decode");
        assert_eq!(decoded, schema);
        assert_eq!(decoded.meta()["source"], json!("unit-test"));
    }

    #[test]
    fn corrupt_metadata_is_rejected() {
        let err = TableSchema::from_bytes(b"{not json").expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn zero_width_strings_are_invalid() {
        let err = TableSchema::new(
            ColumnDescriptor::new("i", SemanticType::Int64),
            vec![ColumnDescriptor::new("s", SemanticType::FixedString { width: 0 })],
        )
        .expect_err("width");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(Atom::Bytes(4).size(), 4);
    }

    #[test]
    fn sidecar_is_named_after_the_table() {
        assert_eq!(
            sidecar_path(Path::new("/data/store/obt.tbl")),
            Path::new("/data/store/obt.tbl.meta.json")
        );
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = dir.path().join("t.tbl");
        let schema = TableSchema::infer(&frame(), &SchemaOptions::default()).expect("infer");
        let written = schema.write_sidecar(&table).expect("write");
        assert!(written.exists());
        assert_eq!(TableSchema::read_sidecar(&table).expect("read"), schema);
    }
}

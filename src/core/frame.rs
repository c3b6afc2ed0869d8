// In-memory frames exchanged with the store: named, equal-length typed columns plus a row index.
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde_json::Value;
use time::OffsetDateTime;

use crate::core::error::{Error, ErrorKind};

/// Name given to an index the caller left unnamed.
pub const DEFAULT_INDEX_NAME: &str = "index";

/// One dynamically typed column array.
///
/// `UInt64` and `Object` exist because host frames can carry them; the codec
/// refuses to store either.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    Datetime(Vec<OffsetDateTime>),
    UInt64(Vec<u64>),
    Object(Vec<Value>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int64(values) => values.len(),
            ColumnData::Float64(values) => values.len(),
            ColumnData::Bool(values) => values.len(),
            ColumnData::Str(values) => values.len(),
            ColumnData::Datetime(values) => values.len(),
            ColumnData::UInt64(values) => values.len(),
            ColumnData::Object(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            ColumnData::Int64(_) => "int64",
            ColumnData::Float64(_) => "float64",
            ColumnData::Bool(_) => "bool",
            ColumnData::Str(_) => "str",
            ColumnData::Datetime(_) => "datetime",
            ColumnData::UInt64(_) => "uint64",
            ColumnData::Object(_) => "object",
        }
    }

    /// A constant column of `len` copies of `value`.
    pub fn broadcast(value: &Scalar, len: usize) -> Self {
        match value {
            Scalar::Int(v) => ColumnData::Int64(vec![*v; len]),
            Scalar::Float(v) => ColumnData::Float64(vec![*v; len]),
            Scalar::Bool(v) => ColumnData::Bool(vec![*v; len]),
            Scalar::Str(v) => ColumnData::Str(vec![v.clone(); len]),
            Scalar::Datetime(v) => ColumnData::Datetime(vec![*v; len]),
        }
    }

    pub fn take(&self, rows: &[usize]) -> Self {
        fn pick<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
            rows.iter().map(|&row| values[row].clone()).collect()
        }
        match self {
            ColumnData::Int64(values) => ColumnData::Int64(pick(values, rows)),
            ColumnData::Float64(values) => ColumnData::Float64(pick(values, rows)),
            ColumnData::Bool(values) => ColumnData::Bool(pick(values, rows)),
            ColumnData::Str(values) => ColumnData::Str(pick(values, rows)),
            ColumnData::Datetime(values) => ColumnData::Datetime(pick(values, rows)),
            ColumnData::UInt64(values) => ColumnData::UInt64(pick(values, rows)),
            ColumnData::Object(values) => ColumnData::Object(pick(values, rows)),
        }
    }

    pub fn extend_from(&mut self, other: &ColumnData) -> Result<(), Error> {
        match (self, other) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend_from_slice(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend_from_slice(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from_slice(b),
            (ColumnData::Str(a), ColumnData::Str(b)) => a.extend_from_slice(b),
            (ColumnData::Datetime(a), ColumnData::Datetime(b)) => a.extend_from_slice(b),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend_from_slice(b),
            (ColumnData::Object(a), ColumnData::Object(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::new(ErrorKind::SchemaMismatch).with_message(format!(
                    "cannot concatenate {} onto {}",
                    b.dtype_name(),
                    a.dtype_name()
                )));
            }
        }
        Ok(())
    }

    /// Value at `row` as a scalar; `None` for types a scalar cannot hold.
    pub fn get(&self, row: usize) -> Option<Scalar> {
        match self {
            ColumnData::Int64(values) => values.get(row).map(|v| Scalar::Int(*v)),
            ColumnData::Float64(values) => values.get(row).map(|v| Scalar::Float(*v)),
            ColumnData::Bool(values) => values.get(row).map(|v| Scalar::Bool(*v)),
            ColumnData::Str(values) => values.get(row).map(|v| Scalar::Str(v.clone())),
            ColumnData::Datetime(values) => values.get(row).map(|v| Scalar::Datetime(*v)),
            ColumnData::UInt64(_) | ColumnData::Object(_) => None,
        }
    }

    /// Orders the value at `row` against `other`; `None` when the types are not comparable.
    pub fn compare_at(&self, row: usize, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (ColumnData::Int64(values), Scalar::Int(v)) => Some(values[row].cmp(v)),
            (ColumnData::Int64(values), Scalar::Float(v)) => Some((values[row] as f64).total_cmp(v)),
            (ColumnData::Float64(values), Scalar::Float(v)) => Some(values[row].total_cmp(v)),
            (ColumnData::Float64(values), Scalar::Int(v)) => Some(values[row].total_cmp(&(*v as f64))),
            (ColumnData::Bool(values), Scalar::Bool(v)) => Some(values[row].cmp(v)),
            (ColumnData::Str(values), Scalar::Str(v)) => Some(values[row].as_str().cmp(v.as_str())),
            (ColumnData::Datetime(values), Scalar::Datetime(v)) => Some(values[row].cmp(v)),
            _ => None,
        }
    }

    /// Row permutation that sorts the column ascending; ties keep their original order.
    pub fn argsort(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match self {
            ColumnData::Int64(values) => order.sort_by_key(|&row| values[row]),
            ColumnData::Float64(values) => order.sort_by(|&a, &b| values[a].total_cmp(&values[b])),
            ColumnData::Bool(values) => order.sort_by_key(|&row| values[row]),
            ColumnData::Str(values) => order.sort_by(|&a, &b| values[a].cmp(&values[b])),
            ColumnData::Datetime(values) => order.sort_by_key(|&row| values[row]),
            ColumnData::UInt64(values) => order.sort_by_key(|&row| values[row]),
            ColumnData::Object(_) => {}
        }
        order
    }
}

/// A single dynamically typed value: query literals, broadcast keys, index bounds.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Datetime(OffsetDateTime),
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<OffsetDateTime> for Scalar {
    fn from(value: OffsetDateTime) -> Self {
        Scalar::Datetime(value)
    }
}

/// Discriminator value naming one logical frame inside a one-big-table.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameKey {
    Int(i64),
    Str(String),
}

impl FrameKey {
    pub fn to_scalar(&self) -> Scalar {
        match self {
            FrameKey::Int(v) => Scalar::Int(*v),
            FrameKey::Str(v) => Scalar::Str(v.clone()),
        }
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKey::Int(v) => write!(f, "{v}"),
            FrameKey::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for FrameKey {
    fn from(value: &str) -> Self {
        FrameKey::Str(value.to_string())
    }
}

impl From<String> for FrameKey {
    fn from(value: String) -> Self {
        FrameKey::Str(value)
    }
}

impl From<i64> for FrameKey {
    fn from(value: i64) -> Self {
        FrameKey::Int(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    index: Column,
    columns: Vec<Column>,
}

impl Frame {
    /// Builds a frame, checking equal lengths and unique names. An empty index
    /// name becomes [`DEFAULT_INDEX_NAME`].
    pub fn new(mut index: Column, columns: Vec<Column>) -> Result<Self, Error> {
        if index.name.is_empty() {
            index.name = DEFAULT_INDEX_NAME.to_string();
        }
        let len = index.len();
        let mut seen = HashSet::new();
        seen.insert(index.name.clone());
        for column in &columns {
            if column.len() != len {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "column has {} rows but the index has {len}",
                        column.len()
                    ))
                    .with_column(&column.name));
            }
            if !seen.insert(column.name.clone()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("duplicate column name")
                    .with_column(&column.name));
            }
        }
        Ok(Self { index, columns })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &Column {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    /// Copy of this frame with `column` appended; `self` is left untouched.
    pub fn with_column(&self, column: Column) -> Result<Self, Error> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::new(self.index.clone(), columns)
    }

    pub fn without_column(mut self, name: &str) -> Self {
        self.columns.retain(|column| column.name != name);
        self
    }

    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            index: Column::new(self.index.name.clone(), self.index.data.take(rows)),
            columns: self
                .columns
                .iter()
                .map(|column| Column::new(column.name.clone(), column.data.take(rows)))
                .collect(),
        }
    }

    /// Stable sort on the index values.
    pub fn sort_by_index(&self) -> Self {
        self.take(&self.index.data.argsort())
    }

    /// Row-wise concatenation of frames that share names, order and types.
    pub fn concat(frames: &[Frame]) -> Result<Self, Error> {
        let Some((first, rest)) = frames.split_first() else {
            return Err(Error::new(ErrorKind::Usage).with_message("nothing to concatenate"));
        };
        let mut out = first.clone();
        for frame in rest {
            if frame.index.name != out.index.name || frame.column_names() != out.column_names() {
                return Err(Error::new(ErrorKind::SchemaMismatch)
                    .with_message("frames disagree on column names or order"));
            }
            out.index.data.extend_from(&frame.index.data)?;
            for (dst, src) in out.columns.iter_mut().zip(frame.columns.iter()) {
                dst.data
                    .extend_from(&src.data)
                    .map_err(|err| err.with_column(&src.name))?;
            }
        }
        Ok(out)
    }
}

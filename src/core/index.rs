// Cached copy of a table's index column for repeated range and comparison lookups.
use std::cmp::Ordering;
use std::ops::Range;
use std::path::PathBuf;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{ColumnData, Scalar};
use crate::core::query::CompareOp;
use crate::core::table::FrameTable;

/// Lazily loaded index values of one table.
///
/// Appends to the table do not invalidate the cache; call [`CachingIndex::refresh`].
#[derive(Debug, Default)]
pub struct CachingIndex {
    bound: Option<PathBuf>,
    values: Option<ColumnData>,
}

impl CachingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.values.is_some()
    }

    pub fn values(&mut self, table: &FrameTable) -> Result<&ColumnData, Error> {
        self.bind(table)?;
        if self.values.is_none() {
            self.load(table)?;
        }
        self.cached(table)
    }

    pub fn refresh(&mut self, table: &FrameTable) -> Result<&ColumnData, Error> {
        self.bind(table)?;
        self.load(table)?;
        self.cached(table)
    }

    pub fn invalidate(&mut self) {
        self.values = None;
    }

    /// Rows whose index value lies in `start..=end`. The index must be ascending.
    pub fn between(
        &mut self,
        table: &FrameTable,
        start: impl Into<Scalar>,
        end: impl Into<Scalar>,
    ) -> Result<Range<usize>, Error> {
        let (start, end) = (start.into(), end.into());
        let values = self.values(table)?;
        check_comparable(values, &start)?;
        check_comparable(values, &end)?;
        let lo = partition_point(values.len(), |row| values.compare_at(row, &start) == Some(Ordering::Less));
        let hi = partition_point(values.len(), |row| {
            values.compare_at(row, &end) != Some(Ordering::Greater)
        });
        Ok(lo..hi.max(lo))
    }

    /// Ascending positions of rows whose index value satisfies `op value`.
    pub fn positions(&mut self, table: &FrameTable, op: CompareOp, value: impl Into<Scalar>) -> Result<Vec<usize>, Error> {
        let value = value.into();
        let values = self.values(table)?;
        check_comparable(values, &value)?;
        Ok((0..values.len())
            .filter(|&row| values.compare_at(row, &value).is_some_and(|ord| op.holds(ord)))
            .collect())
    }

    fn bind(&mut self, table: &FrameTable) -> Result<(), Error> {
        match &self.bound {
            Some(path) if path != table.path() => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("index cache belongs to {}", path.display()))
                .with_path(table.path())),
            Some(_) => Ok(()),
            None => {
                self.bound = Some(table.path().to_path_buf());
                Ok(())
            }
        }
    }

    fn load(&mut self, table: &FrameTable) -> Result<(), Error> {
        let values = table.read_column(table.schema().index_name())?;
        debug!(path = %table.path().display(), rows = values.len(), "loaded index values");
        self.values = Some(values);
        Ok(())
    }

    fn cached(&self, table: &FrameTable) -> Result<&ColumnData, Error> {
        self.values.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("index cache empty after load")
                .with_path(table.path())
        })
    }
}

fn check_comparable(values: &ColumnData, value: &Scalar) -> Result<(), Error> {
    if !values.is_empty() && values.compare_at(0, value).is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("cannot compare a {} index with {value:?}", values.dtype_name())));
    }
    Ok(())
}

/// First row in `0..len` for which `pred` is false, assuming `pred` is true on a prefix.
fn partition_point(len: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

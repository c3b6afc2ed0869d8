// Physical table file: validated header, schema blob, then append-only fixed-width rows.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::core::codec;
use crate::core::error::{Error, ErrorKind};
use crate::core::filter::{row_object, RowFilter};
use crate::core::frame::{ColumnData, Frame};
use crate::core::query::{Predicate, Query};
use crate::core::ranges;
use crate::core::schema::TableSchema;

const MAGIC: [u8; 4] = *b"OBT1";
const VERSION: u32 = 1;
const ENDIANNESS_LE: u8 = 1;
pub const HEADER_SIZE: usize = 64;

/// Where the schema blob of a table lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetadataMode {
    /// Inside the table file, between the header and the rows.
    Embedded = 0,
    /// In `<table>.meta.json` next to the table file.
    Sidecar = 1,
}

impl MetadataMode {
    fn from_u8(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(MetadataMode::Embedded),
            1 => Ok(MetadataMode::Sidecar),
            _ => Err(Error::new(ErrorKind::Corrupt).with_message("invalid metadata mode")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Durability {
    Fast,
    Flush,
}

#[derive(Clone, Copy, Debug)]
pub struct TableOptions {
    pub metadata_mode: MetadataMode,
    pub durability: Durability,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata_mode(mut self, mode: MetadataMode) -> Self {
        self.metadata_mode = mode;
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            metadata_mode: MetadataMode::Embedded,
            durability: Durability::Fast,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableHeader {
    pub metadata_mode: MetadataMode,
    pub row_len: u32,
    pub row_count: u64,
    pub data_offset: u64,
    pub attrs_len: u32,
}

impl TableHeader {
    fn new(metadata_mode: MetadataMode, row_len: usize, attrs_len: usize) -> Result<Self, Error> {
        let row_len = u32::try_from(row_len)
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("row is too wide"))?;
        let attrs_len = u32::try_from(attrs_len)
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("schema metadata is too large"))?;
        Ok(Self {
            metadata_mode,
            row_len,
            row_count: 0,
            data_offset: align8(HEADER_SIZE + attrs_len as usize) as u64,
            attrs_len,
        })
    }

    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        write_u32(&mut buf, 4, VERSION);
        buf[8] = ENDIANNESS_LE;
        buf[9] = self.metadata_mode as u8;
        write_u32(&mut buf, 12, self.row_len);
        write_u64(&mut buf, 16, self.row_count);
        write_u64(&mut buf, 24, self.data_offset);
        write_u32(&mut buf, 32, self.attrs_len);
        write_u32(&mut buf, 36, self.attrs_len ^ 0xFFFF_FFFF);
        write_u64(&mut buf, 40, self.row_count ^ u64::MAX);
        buf
    }

    fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("header too small"));
        }
        if buf[0..4] != MAGIC {
            return Err(Error::new(ErrorKind::Corrupt).with_message("bad magic"));
        }
        if read_u32(buf, 4) != VERSION {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unsupported version"));
        }
        if buf[8] != ENDIANNESS_LE {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unsupported endianness"));
        }
        let attrs_len = read_u32(buf, 32);
        if attrs_len ^ read_u32(buf, 36) != 0xFFFF_FFFF {
            return Err(Error::new(ErrorKind::Corrupt).with_message("attribute length xor mismatch"));
        }
        let row_count = read_u64(buf, 16);
        if row_count ^ read_u64(buf, 40) != u64::MAX {
            return Err(Error::new(ErrorKind::Corrupt).with_message("row count xor mismatch"));
        }
        Ok(Self {
            metadata_mode: MetadataMode::from_u8(buf[9])?,
            row_len: read_u32(buf, 12),
            row_count,
            data_offset: read_u64(buf, 24),
            attrs_len,
        })
    }

    fn validate(&self, actual_file_size: u64) -> Result<(), Error> {
        if self.row_len == 0 {
            return Err(Error::new(ErrorKind::Corrupt).with_message("row length is zero"));
        }
        if self.data_offset != align8(HEADER_SIZE + self.attrs_len as usize) as u64 {
            return Err(Error::new(ErrorKind::Corrupt).with_message("invalid data offset"));
        }
        let end = self
            .row_count
            .checked_mul(u64::from(self.row_len))
            .and_then(|bytes| bytes.checked_add(self.data_offset))
            .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("row region overflows"))?;
        if end > actual_file_size {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("row region exceeds file size")
                .with_offset(end));
        }
        Ok(())
    }

    fn rows_end(&self) -> u64 {
        self.data_offset + self.row_count * u64::from(self.row_len)
    }
}

pub fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// One physical table holding fixed-width rows of a single schema.
pub struct FrameTable {
    path: PathBuf,
    file: File,
    header: TableHeader,
    schema: TableSchema,
    options: TableOptions,
    writable: bool,
}

impl FrameTable {
    /// Allocates a new table; an existing file at `path` is an error.
    pub fn create(path: impl AsRef<Path>, schema: TableSchema, options: TableOptions) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::io(&path, err).with_message("cannot create table"))?;

        let attrs = match options.metadata_mode {
            MetadataMode::Embedded => schema.to_bytes()?,
            MetadataMode::Sidecar => {
                schema.write_sidecar(&path)?;
                Vec::new()
            }
        };
        let header = TableHeader::new(options.metadata_mode, schema.row_len(), attrs.len())?;
        write_header(&mut file, &header, &path)?;
        if !attrs.is_empty() {
            write_at(&mut file, HEADER_SIZE as u64, &attrs, &path)?;
        }
        file.set_len(header.data_offset)
            .map_err(|err| Error::io(&path, err))?;
        info!(path = %path.display(), row_len = header.row_len, "created table");

        Ok(Self {
            path,
            file,
            header,
            schema,
            options,
            writable: true,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path.as_ref(), true)
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path.as_ref(), false)
    }

    fn open_with(path: &Path, writable: bool) -> Result<Self, Error> {
        let path = path.to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|err| Error::io(&path, err))?;

        let actual_size = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| Error::io(&path, err))?;

        let header = read_header(&mut file, &path)?;
        header
            .validate(actual_size)
            .map_err(|err| err.with_path(&path))?;

        let schema = match header.metadata_mode {
            MetadataMode::Embedded => {
                let mut attrs = vec![0u8; header.attrs_len as usize];
                file.seek(SeekFrom::Start(HEADER_SIZE as u64))
                    .map_err(|err| Error::io(&path, err))?;
                file.read_exact(&mut attrs)
                    .map_err(|err| Error::io(&path, err))?;
                TableSchema::from_bytes(&attrs).map_err(|err| err.with_path(&path))?
            }
            MetadataMode::Sidecar => TableSchema::read_sidecar(&path)?,
        };
        if schema.row_len() != header.row_len as usize {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("schema row length disagrees with header")
                .with_path(&path));
        }

        Ok(Self {
            path,
            file,
            header,
            schema,
            options: TableOptions {
                metadata_mode: header.metadata_mode,
                durability: Durability::Fast,
            },
            writable,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn header(&self) -> TableHeader {
        self.header
    }

    pub fn nrows(&self) -> usize {
        self.header.row_count as usize
    }

    pub fn set_durability(&mut self, durability: Durability) {
        self.options.durability = durability;
    }

    pub fn query(&self) -> Query<'_> {
        Query::new(&self.schema, &self.path)
    }

    /// Appends `frame` after checking it against the stored schema. Empty frames are a no-op.
    pub fn append(&mut self, frame: &Frame) -> Result<usize, Error> {
        if !self.writable {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("table is open read-only")
                .with_path(&self.path));
        }
        if frame.is_empty() {
            return Ok(0);
        }
        self.schema
            .check_frame(frame)
            .map_err(|err| err.with_path(&self.path))?;
        let bytes = codec::encode(frame, &self.schema).map_err(|err| err.with_path(&self.path))?;

        write_at(&mut self.file, self.header.rows_end(), &bytes, &self.path)?;
        if self.options.durability == Durability::Flush {
            self.file
                .sync_data()
                .map_err(|err| Error::io(&self.path, err))?;
        }

        let mut next = self.header;
        next.row_count += frame.len() as u64;
        write_header(&mut self.file, &next, &self.path)?;
        self.header = next;
        debug!(path = %self.path.display(), rows = frame.len(), total = next.row_count, "appended rows");
        Ok(frame.len())
    }

    pub fn read_all(&self) -> Result<Frame, Error> {
        let map = self.map_rows()?;
        codec::decode(self.rows(&map), &self.schema, None).map_err(|err| err.with_path(&self.path))
    }

    /// Scans every row through the native predicate and decodes only the matches.
    pub fn read_where(&self, predicate: &str) -> Result<Frame, Error> {
        let filter = RowFilter::compile(predicate)?;
        let map = self.map_rows()?;
        let rows = self.rows(&map);
        let row_len = self.schema.row_len();

        let mut selected = Vec::new();
        for (pos, row) in rows.chunks_exact(row_len).enumerate() {
            let cells = codec::decode_physical(row, &self.schema).map_err(|err| err.with_path(&self.path))?;
            if filter.matches(row_object(&self.schema, &cells))? {
                selected.push(pos);
            }
        }
        debug!(
            path = %self.path.display(),
            predicate,
            scanned = self.nrows(),
            matched = selected.len(),
            "predicate scan"
        );
        self.gather(rows, &ranges::compact(&selected))
    }

    pub fn read_predicate(&self, predicate: &Predicate) -> Result<Frame, Error> {
        predicate.check_origin(&self.path)?;
        self.read_where(predicate.text())
    }

    /// Reads each `[start, end)` range with one copy and decodes the concatenation once.
    pub fn read_ranges(&self, ranges: &[Range<usize>]) -> Result<Frame, Error> {
        let nrows = self.nrows();
        if let Some(bad) = ranges.iter().find(|r| r.start > r.end || r.end > nrows) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("range {bad:?} is outside 0..{nrows}"))
                .with_path(&self.path));
        }
        let map = self.map_rows()?;
        self.gather(self.rows(&map), ranges)
    }

    /// Reads an ascending row selection as compacted ranges.
    pub fn read_selection(&self, rows: &[usize]) -> Result<Frame, Error> {
        self.read_ranges(&ranges::compact(rows))
    }

    pub fn read_column(&self, name: &str) -> Result<ColumnData, Error> {
        let map = self.map_rows()?;
        codec::decode_column(self.rows(&map), &self.schema, name).map_err(|err| err.with_path(&self.path))
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.file.flush().map_err(|err| Error::io(&self.path, err))?;
        if self.writable {
            self.file.sync_all().map_err(|err| Error::io(&self.path, err))?;
        }
        Ok(())
    }

    pub fn close(mut self) -> Result<(), Error> {
        self.flush()
    }

    fn gather(&self, rows: &[u8], ranges: &[Range<usize>]) -> Result<Frame, Error> {
        let row_len = self.schema.row_len();
        let mut buf = Vec::with_capacity(ranges::covered(ranges) * row_len);
        for range in ranges {
            buf.extend_from_slice(&rows[range.start * row_len..range.end * row_len]);
        }
        codec::decode(&buf, &self.schema, None).map_err(|err| err.with_path(&self.path))
    }

    fn map_rows(&self) -> Result<Mmap, Error> {
        // SAFETY: single-writer contract; nobody truncates the file while it is mapped.
        unsafe { Mmap::map(&self.file) }.map_err(|err| Error::io(&self.path, err))
    }

    fn rows<'m>(&self, map: &'m Mmap) -> &'m [u8] {
        &map[self.header.data_offset as usize..self.header.rows_end() as usize]
    }
}

fn read_header(file: &mut File, path: &Path) -> Result<TableHeader, Error> {
    let mut buf = [0u8; HEADER_SIZE];
    file.seek(SeekFrom::Start(0))
        .map_err(|err| Error::io(path, err))?;
    file.read_exact(&mut buf)
        .map_err(|err| Error::new(ErrorKind::Corrupt).with_message("truncated header").with_path(path).with_source(err))?;
    TableHeader::decode(&buf).map_err(|err| err.with_path(path))
}

fn write_header(file: &mut File, header: &TableHeader, path: &Path) -> Result<(), Error> {
    write_at(file, 0, &header.encode(), path)
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8], path: &Path) -> Result<(), Error> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|err| Error::io(path, err))?;
    file.write_all(bytes)
        .map_err(|err| Error::io(path, err))?;
    file.flush()
        .map_err(|err| Error::io(path, err))?;
    Ok(())
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(out)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::{align8, FrameTable, MetadataMode, TableHeader, TableOptions, HEADER_SIZE};
    use crate::core::error::ErrorKind;
    use crate::core::frame::{Column, ColumnData, Frame, Scalar};
    use crate::core::ranges::compact;
    use crate::core::schema::{sidecar_path, SchemaOptions, TableSchema, TimeUnit};
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use time::{Duration, OffsetDateTime};

    fn start() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(946_684_800).unwrap()
    }

    fn frame(n: usize, offset: usize) -> Frame {
        let ts = (0..n)
            .map(|i| start() + Duration::minutes(30 * (i + offset) as i64))
            .collect();
        Frame::new(
            Column::new("timestamp", ColumnData::Datetime(ts)),
            vec![
                Column::new("value", ColumnData::Float64((0..n).map(|i| (i + offset) as f64 * 0.5).collect())),
                Column::new(
                    "symbol",
                    ColumnData::Str((0..n).map(|i| if (i + offset) % 2 == 0 { "even" } else { "odd" }.to_string()).collect()),
                ),
            ],
        )
        .unwrap()
    }

    fn create(dir: &std::path::Path, options: TableOptions) -> FrameTable {
        let schema = TableSchema::infer(&frame(1, 0), &SchemaOptions::default()).unwrap();
        FrameTable::create(dir.join("t.tbl"), schema, options).expect("create")
    }

    #[test]
    fn header_round_trip() {
        let mut header = TableHeader::new(MetadataMode::Embedded, 33, 100).unwrap();
        header.row_count = 7;
        assert_eq!(header.data_offset, align8(HEADER_SIZE + 100) as u64);
        assert_eq!(TableHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn header_rejects_torn_row_count() {
        let header = TableHeader::new(MetadataMode::Embedded, 8, 0).unwrap();
        let mut buf = header.encode();
        buf[16] = 9;
        assert_eq!(TableHeader::decode(&buf).unwrap_err().kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn create_append_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        assert_eq!(table.append(&frame(10, 0)).unwrap(), 10);
        assert_eq!(table.append(&frame(5, 10)).unwrap(), 5);
        let path = table.path().to_path_buf();
        table.close().unwrap();

        let reopened = FrameTable::open(&path).expect("open");
        assert_eq!(reopened.nrows(), 15);
        assert_eq!(reopened.read_all().unwrap(), frame(15, 0));
    }

    #[test]
    fn recreating_a_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), TableOptions::default());
        drop(table);
        let schema = TableSchema::infer(&frame(1, 0), &SchemaOptions::default()).unwrap();
        let err = FrameTable::create(dir.path().join("t.tbl"), schema, TableOptions::default())
            .err()
            .expect("exists");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn empty_append_is_noop_and_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        assert_eq!(table.append(&frame(0, 0)).unwrap(), 0);
        assert_eq!(table.nrows(), 0);

        let source = frame(3, 0);
        let reordered = Frame::new(
            source.index().clone(),
            vec![source.column("symbol").unwrap().clone(), source.column("value").unwrap().clone()],
        )
        .unwrap();
        assert_eq!(table.append(&reordered).unwrap_err().kind(), ErrorKind::SchemaMismatch);
        let extra = source
            .with_column(Column::new("extra", ColumnData::broadcast(&Scalar::Int(1), 3)))
            .unwrap();
        assert_eq!(table.append(&extra).unwrap_err().kind(), ErrorKind::SchemaMismatch);
        assert_eq!(table.nrows(), 0);
        table.append(&source).expect("identical layout appends");
    }

    #[test]
    fn read_where_filters_inside_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        table.append(&frame(20, 0)).unwrap();

        let q = table.query();
        let pred = q.col("symbol").unwrap().eq("odd").unwrap() & q.col("value").unwrap().ge(5.0).unwrap();
        let out = table.read_predicate(&pred).unwrap();
        let expected: Vec<usize> = (0..20).filter(|i| i % 2 == 1 && *i as f64 * 0.5 >= 5.0).collect();
        assert_eq!(out, frame(20, 0).take(&expected));

        let none = table.read_where(r#".["value"] > 1000"#).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn datetime_equality_hits_exactly_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        let data = frame(12, 0);
        table.append(&data).unwrap();
        let ColumnData::Datetime(stamps) = &data.index().data else {
            panic!("datetime index");
        };
        for (row, ts) in stamps.iter().enumerate() {
            let col = table.query().col("timestamp").unwrap();
            let at = table.read_predicate(&col.eq(*ts).unwrap()).unwrap();
            assert_eq!(at, data.take(&[row]));
            let before = table.read_predicate(&col.eq(*ts - Duration::nanoseconds(1)).unwrap()).unwrap();
            assert!(before.is_empty());
            let after = table.read_predicate(&col.eq(*ts + Duration::nanoseconds(1)).unwrap()).unwrap();
            assert!(after.is_empty());
        }
    }

    #[test]
    fn ranges_and_selections_match_take() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        let data = frame(30, 0);
        table.append(&data).unwrap();

        let selector = [0, 1, 2, 7, 8, 15, 29];
        let ranges = compact(&selector);
        assert_eq!(ranges.len(), 4);
        assert_eq!(table.read_ranges(&ranges).unwrap(), data.take(&selector));
        assert_eq!(table.read_selection(&selector).unwrap(), data.take(&selector));

        let pieces: Vec<Frame> = ranges
            .iter()
            .map(|range| table.read_ranges(std::slice::from_ref(range)).unwrap())
            .collect();
        assert_eq!(Frame::concat(&pieces).unwrap(), data.take(&selector));

        assert_eq!(table.read_ranges(&[25..31]).unwrap_err().kind(), ErrorKind::Usage);
        assert!(table.read_ranges(&[]).unwrap().is_empty());
    }

    #[test]
    fn read_column_decodes_one_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        table.append(&frame(4, 0)).unwrap();
        assert_eq!(
            table.read_column("symbol").unwrap(),
            ColumnData::Str(vec!["even".into(), "odd".into(), "even".into(), "odd".into()])
        );
        assert_eq!(table.read_column("ghost").unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn sidecar_mode_keeps_schema_outside_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = TableOptions::new().with_metadata_mode(MetadataMode::Sidecar);
        let mut table = create(dir.path(), options);
        table.append(&frame(3, 0)).unwrap();
        let path = table.path().to_path_buf();
        assert_eq!(table.header().attrs_len, 0);
        table.close().unwrap();

        assert!(sidecar_path(&path).exists());
        let reopened = FrameTable::open_read_only(&path).unwrap();
        assert_eq!(reopened.read_all().unwrap(), frame(3, 0));
    }

    #[test]
    fn read_only_tables_reject_appends() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), TableOptions::default());
        let path = table.path().to_path_buf();
        drop(table);
        let mut reader = FrameTable::open_read_only(&path).unwrap();
        assert_eq!(reader.append(&frame(1, 0)).unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn truncated_row_region_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = create(dir.path(), TableOptions::default());
        table.append(&frame(4, 0)).unwrap();
        let path = table.path().to_path_buf();
        let end = table.header().data_offset + table.schema().row_len() as u64;
        drop(table);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(end).unwrap();
        let err = FrameTable::open(&path).err().expect("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.tbl");
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path).unwrap();
        file.set_len(4096).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(b"NOPE").unwrap();
        file.flush().unwrap();
        let err = FrameTable::open(&path).err().expect("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn coarse_datetime_units_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let options = SchemaOptions::default().with_datetime_unit(TimeUnit::Second);
        let schema = TableSchema::infer(&frame(1, 0), &options).unwrap();
        let path = dir.path().join("s.tbl");
        let mut table = FrameTable::create(&path, schema, TableOptions::default()).unwrap();
        table.append(&frame(6, 0)).unwrap();
        drop(table);
        assert_eq!(FrameTable::open(&path).unwrap().read_all().unwrap(), frame(6, 0));
    }
}

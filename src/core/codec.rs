// Column arrays <-> fixed-width little-endian row bytes, driven by the table schema.
use time::OffsetDateTime;
use tracing::warn;

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{Column, ColumnData, Frame};
use crate::core::schema::{SchemaOptions, SemanticType, TableSchema, TimeUnit};

/// One cell as stored on disk, before semantic decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Physical<'a> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(&'a str),
}

/// Classifies a column array; types the store cannot represent are rejected outright.
pub fn infer(data: &ColumnData, options: &SchemaOptions) -> Result<SemanticType, Error> {
    match data {
        ColumnData::Int64(_) => Ok(SemanticType::Int64),
        ColumnData::Float64(_) => Ok(SemanticType::Float64),
        ColumnData::Bool(_) => Ok(SemanticType::Bool),
        ColumnData::Str(values) => {
            let observed = values.iter().map(String::len).max().unwrap_or(0);
            Ok(SemanticType::FixedString {
                width: observed.max(options.min_string_width).max(1),
            })
        }
        ColumnData::Datetime(_) => Ok(SemanticType::DatetimeEpoch {
            unit: options.datetime_unit,
        }),
        ColumnData::UInt64(_) | ColumnData::Object(_) => Err(Error::new(ErrorKind::UnsupportedType)
            .with_message(format!("cannot store {} columns", data.dtype_name()))),
    }
}

/// Encodes `frame` into `len * row_len` bytes in schema column order.
pub fn encode(frame: &Frame, schema: &TableSchema) -> Result<Vec<u8>, Error> {
    let rows = frame.len();
    let row_len = schema.row_len();
    let mut buf = vec![0u8; rows * row_len];
    let offsets = schema.offsets();

    for ((pos, descriptor), offset) in schema.columns().iter().enumerate().zip(offsets) {
        let column = if pos == 0 {
            frame.index()
        } else {
            frame.column(&descriptor.name).ok_or_else(|| {
                Error::new(ErrorKind::SchemaMismatch)
                    .with_message("frame is missing a schema column")
                    .with_column(&descriptor.name)
            })?
        };
        let strict = schema.frame_key() == Some(descriptor.name.as_str());
        encode_column(&mut buf, row_len, offset, descriptor.semantic_type, column, strict)?;
    }
    Ok(buf)
}

fn encode_column(
    buf: &mut [u8],
    row_len: usize,
    offset: usize,
    semantic_type: SemanticType,
    column: &Column,
    strict: bool,
) -> Result<(), Error> {
    let rows = buf.chunks_exact_mut(row_len);
    match (semantic_type, &column.data) {
        (SemanticType::Int64, ColumnData::Int64(values)) => {
            for (row, value) in rows.zip(values) {
                write_i64(row, offset, *value);
            }
        }
        (SemanticType::Float64, ColumnData::Float64(values)) => {
            for (row, value) in rows.zip(values) {
                row[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
            }
        }
        (SemanticType::Bool, ColumnData::Bool(values)) => {
            for (row, value) in rows.zip(values) {
                row[offset] = u8::from(*value);
            }
        }
        (SemanticType::FixedString { width }, ColumnData::Str(values)) => {
            let mut truncated = 0usize;
            for (row, value) in rows.zip(values) {
                let fitted = fit_str(value, width);
                if fitted.len() < value.len() {
                    if strict {
                        return Err(Error::new(ErrorKind::SchemaMismatch)
                            .with_message(format!(
                                "frame key `{value}` exceeds the stored width of {width} bytes"
                            ))
                            .with_column(&column.name));
                    }
                    truncated += 1;
                }
                // NUL is the padding byte, so a stored value may not end in one.
                if fitted.ends_with('\0') {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("string value {value:?} ends in a NUL byte"))
                        .with_column(&column.name)
                        .with_hint("Trailing NUL bytes cannot be told apart from fixed-width padding."));
                }
                row[offset..offset + fitted.len()].copy_from_slice(fitted.as_bytes());
            }
            if truncated > 0 {
                warn!(column = %column.name, width, truncated, "string values truncated to column width");
            }
        }
        (SemanticType::DatetimeEpoch { unit }, ColumnData::Datetime(values)) => {
            for (row, value) in rows.zip(values) {
                let epoch = datetime_to_epoch(*value, unit).map_err(|err| err.with_column(&column.name))?;
                write_i64(row, offset, epoch);
            }
        }
        (expected, data) => {
            return Err(Error::new(ErrorKind::SchemaMismatch)
                .with_message(format!(
                    "column holds {} values but the table stores {expected:?}",
                    data.dtype_name()
                ))
                .with_column(&column.name));
        }
    }
    Ok(())
}

/// Decodes whole rows back into a frame. `columns` limits which data columns are materialized;
/// the index is always decoded.
pub fn decode(raw: &[u8], schema: &TableSchema, columns: Option<&[&str]>) -> Result<Frame, Error> {
    check_rows(raw, schema)?;
    let offsets = schema.offsets();
    let index = schema.index();
    let index_data = decode_cells(raw, schema.row_len(), offsets[0], index.semantic_type)
        .map_err(|err| err.with_column(&index.name))?;

    let wanted: Vec<usize> = match columns {
        None => (1..schema.columns().len()).collect(),
        Some(names) => names
            .iter()
            .map(|name| match schema.position(name) {
                Some(pos) if pos > 0 => Ok(pos),
                _ => Err(Error::new(ErrorKind::Usage)
                    .with_message("unknown column")
                    .with_column(*name)),
            })
            .collect::<Result<_, _>>()?,
    };

    let mut out = Vec::with_capacity(wanted.len());
    for pos in wanted {
        let descriptor = &schema.columns()[pos];
        let data = decode_cells(raw, schema.row_len(), offsets[pos], descriptor.semantic_type)
            .map_err(|err| err.with_column(&descriptor.name))?;
        out.push(Column::new(descriptor.name.clone(), data));
    }
    Frame::new(Column::new(index.name.clone(), index_data), out)
}

/// Decodes a single column (index included) from whole rows.
pub fn decode_column(raw: &[u8], schema: &TableSchema, name: &str) -> Result<ColumnData, Error> {
    check_rows(raw, schema)?;
    let pos = schema.position(name).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("unknown column")
            .with_column(name)
    })?;
    let descriptor = &schema.columns()[pos];
    decode_cells(raw, schema.row_len(), schema.offsets()[pos], descriptor.semantic_type)
        .map_err(|err| err.with_column(name))
}

/// Physical cell values of one row, in schema order.
pub fn decode_physical<'a>(row: &'a [u8], schema: &TableSchema) -> Result<Vec<Physical<'a>>, Error> {
    if row.len() != schema.row_len() {
        return Err(Error::new(ErrorKind::Corrupt).with_message("row length does not match schema"));
    }
    schema
        .columns()
        .iter()
        .zip(schema.offsets())
        .map(|(descriptor, offset)| {
            let cell = &row[offset..offset + descriptor.atom().size()];
            Ok(match descriptor.semantic_type {
                SemanticType::Int64 | SemanticType::DatetimeEpoch { .. } => Physical::Int(read_i64(cell)),
                SemanticType::Float64 => Physical::Float(read_f64(cell)),
                SemanticType::Bool => Physical::Bool(cell[0] != 0),
                SemanticType::FixedString { .. } => {
                    Physical::Str(std::str::from_utf8(trim_padding(cell)).map_err(|err| {
                        Error::new(ErrorKind::Corrupt)
                            .with_message("stored string is not utf-8")
                            .with_column(&descriptor.name)
                            .with_source(err)
                    })?)
                }
            })
        })
        .collect()
}

/// Datetime as an integer count of `unit` since the epoch (floored).
pub fn datetime_to_epoch(value: OffsetDateTime, unit: TimeUnit) -> Result<i64, Error> {
    let ticks = value.unix_timestamp_nanos().div_euclid(unit.nanos());
    i64::try_from(ticks).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message(format!("datetime {value} does not fit an i64 epoch in {unit:?}"))
    })
}

pub fn epoch_to_datetime(value: i64, unit: TimeUnit) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value) * unit.nanos()).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("epoch value {value} is outside the datetime range"))
            .with_source(err)
    })
}

fn check_rows(raw: &[u8], schema: &TableSchema) -> Result<(), Error> {
    if raw.len() % schema.row_len() != 0 {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message("row region is not a whole number of rows")
            .with_offset(raw.len() as u64));
    }
    Ok(())
}

fn decode_cells(raw: &[u8], row_len: usize, offset: usize, semantic_type: SemanticType) -> Result<ColumnData, Error> {
    let size = semantic_type.atom().size();
    let cells = raw.chunks_exact(row_len).map(|row| &row[offset..offset + size]);
    Ok(match semantic_type {
        SemanticType::Int64 => ColumnData::Int64(cells.map(read_i64).collect()),
        SemanticType::Float64 => ColumnData::Float64(cells.map(read_f64).collect()),
        SemanticType::Bool => ColumnData::Bool(cells.map(|cell| cell[0] != 0).collect()),
        SemanticType::FixedString { .. } => ColumnData::Str(
            cells
                .map(|cell| {
                    String::from_utf8(trim_padding(cell).to_vec()).map_err(|err| {
                        Error::new(ErrorKind::Corrupt)
                            .with_message("stored string is not utf-8")
                            .with_source(err)
                    })
                })
                .collect::<Result<_, _>>()?,
        ),
        SemanticType::DatetimeEpoch { unit } => ColumnData::Datetime(
            cells
                .map(|cell| epoch_to_datetime(read_i64(cell), unit))
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn fit_str(value: &str, width: usize) -> &str {
    if value.len() <= width {
        return value;
    }
    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn trim_padding(cell: &[u8]) -> &[u8] {
    let end = cell.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
    &cell[..end]
}

fn read_i64(cell: &[u8]) -> i64 {
    i64::from_le_bytes(read_8(cell, 0))
}

fn read_f64(cell: &[u8]) -> f64 {
    f64::from_le_bytes(read_8(cell, 0))
}

fn read_8(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    out
}

fn write_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

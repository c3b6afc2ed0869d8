//! Purpose: Convert frames to and from JSON records (one object per row).
//! Exports: `frame_to_records`, `frame_from_records`, `parse_records`.
//! Role: Boundary used by the CLI for `load` input and `get`/`where` output.
//! Invariants: Datetimes are RFC 3339 strings on the JSON side.
//! Invariants: Every record must carry the same keys; columns come out in key order.
use serde_json::{Map, Number, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{Column, ColumnData, Frame};

pub fn frame_to_records(frame: &Frame) -> Result<Vec<Value>, Error> {
    let mut records = vec![Map::new(); frame.len()];
    for column in std::iter::once(frame.index()).chain(frame.columns()) {
        for (row, record) in records.iter_mut().enumerate() {
            record.insert(column.name.clone(), cell_json(&column.data, row).map_err(|err| err.with_column(&column.name))?);
        }
    }
    Ok(records.into_iter().map(Value::Object).collect())
}

fn cell_json(data: &ColumnData, row: usize) -> Result<Value, Error> {
    Ok(match data {
        ColumnData::Int64(values) => Value::from(values[row]),
        ColumnData::Float64(values) => Number::from_f64(values[row]).map_or(Value::Null, Value::Number),
        ColumnData::Bool(values) => Value::Bool(values[row]),
        ColumnData::Str(values) => Value::String(values[row].clone()),
        ColumnData::UInt64(values) => Value::from(values[row]),
        ColumnData::Object(values) => values[row].clone(),
        ColumnData::Datetime(values) => Value::String(values[row].format(&Rfc3339).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to format datetime")
                .with_source(err)
        })?),
    })
}

/// Accepts a JSON array of objects or newline-delimited objects.
pub fn parse_records(text: &str) -> Result<Vec<Map<String, Value>>, Error> {
    let trimmed = text.trim_start();
    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("input is not a JSON array")
                .with_source(err)
        })?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(lineno, line)| {
                serde_json::from_str(line).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message(format!("line {} is not valid JSON", lineno + 1))
                        .with_source(err)
                })
            })
            .collect::<Result<_, _>>()?
    };
    values
        .into_iter()
        .map(|value| match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("expected a JSON object per row, found {other}"))),
        })
        .collect()
}

/// Builds a frame from records. `datetime_columns` name string columns to parse as RFC 3339.
pub fn frame_from_records(
    records: &[Map<String, Value>],
    index: &str,
    datetime_columns: &[String],
) -> Result<Frame, Error> {
    let Some(first) = records.first() else {
        return Err(Error::new(ErrorKind::Usage).with_message("no records to load"));
    };
    if !first.contains_key(index) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("records do not carry the index column")
            .with_column(index));
    }
    for (row, record) in records.iter().enumerate() {
        if record.len() != first.len() || first.keys().any(|key| !record.contains_key(key)) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("record {row} has different keys than record 0")));
        }
    }

    let mut index_column = None;
    let mut columns = Vec::with_capacity(first.len().saturating_sub(1));
    for name in first.keys() {
        let cells: Vec<&Value> = records.iter().filter_map(|record| record.get(name)).collect();
        let as_datetime = datetime_columns.iter().any(|c| c == name);
        let data = column_from_json(&cells, as_datetime).map_err(|err| err.with_column(name))?;
        if name == index {
            index_column = Some(Column::new(name.clone(), data));
        } else {
            columns.push(Column::new(name.clone(), data));
        }
    }
    let index_column = index_column.ok_or_else(|| {
        Error::new(ErrorKind::Internal).with_message("index column vanished while building frame")
    })?;
    Frame::new(index_column, columns)
}

fn column_from_json(cells: &[&Value], as_datetime: bool) -> Result<ColumnData, Error> {
    let mismatch = |value: &Value| {
        Error::new(ErrorKind::Usage).with_message(format!("cannot mix {value} into this column"))
    };
    if as_datetime {
        return cells
            .iter()
            .map(|&value| {
                let text = value.as_str().ok_or_else(|| mismatch(value))?;
                OffsetDateTime::parse(text, &Rfc3339).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message(format!("{text:?} is not an RFC 3339 datetime"))
                        .with_source(err)
                })
            })
            .collect::<Result<_, _>>()
            .map(ColumnData::Datetime);
    }
    match cells.first() {
        Some(Value::Bool(_)) => cells
            .iter()
            .map(|&value| value.as_bool().ok_or_else(|| mismatch(value)))
            .collect::<Result<_, _>>()
            .map(ColumnData::Bool),
        Some(Value::String(_)) => cells
            .iter()
            .map(|&value| value.as_str().map(str::to_string).ok_or_else(|| mismatch(value)))
            .collect::<Result<_, _>>()
            .map(ColumnData::Str),
        Some(Value::Number(_)) if cells.iter().all(|value| value.is_i64()) => cells
            .iter()
            .map(|&value| value.as_i64().ok_or_else(|| mismatch(value)))
            .collect::<Result<_, _>>()
            .map(ColumnData::Int64),
        Some(Value::Number(_)) => cells
            .iter()
            .map(|&value| value.as_f64().ok_or_else(|| mismatch(value)))
            .collect::<Result<_, _>>()
            .map(ColumnData::Float64),
        Some(other) => Err(Error::new(ErrorKind::UnsupportedType)
            .with_message(format!("no column type for JSON value {other}"))),
        None => Err(Error::new(ErrorKind::Usage).with_message("empty column")),
    }
}

//! Ranged reader (C3): opens the file fresh, seeks once, and materializes `[row_lo, row_hi)`
//! into typed column arrays. The file handle never outlives this call; no long-lived
//! descriptors are kept by the engine.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use csv::ByteRecord;
use tracing::{trace, warn};

use crate::axis::parse_axis_value;
use crate::error::{Error, Result};
use crate::index::RowIndex;
use crate::schema::Schema;

use super::chunk::{ColumnData, ColumnarChunk};

/// Reads rows `[row_lo, row_hi)` for the axis plus every retained numeric column.
///
/// Rows are walked using the authoritative offsets already committed to the row index, rather
/// than re-splitting the buffer on newlines, so a stray `\n` inside a quoted field can never
/// desynchronize this read from the index that was built over the same file.
///
/// # Errors
///
/// Returns `FileGone` if the file no longer exists, `TruncatedRead` if the file shrank out
/// from under an in-flight read, or `Io` for any other I/O failure.
pub fn read_range(
    path: &Path,
    row_index: &RowIndex,
    schema: &Schema,
    row_lo: u64,
    row_hi: u64,
) -> Result<ColumnarChunk> {
    let row_hi = row_hi.min(row_index.total_rows());
    if row_lo >= row_hi {
        return Ok(empty_chunk(schema, row_lo, row_hi));
    }

    let mut file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::FileGone {
                path: path.display().to_string().into(),
            }
        } else {
            Error::Io(err)
        }
    })?;

    let first = row_index.entries[row_lo as usize];
    let last = row_index.entries[row_hi as usize - 1];
    let span = (last.offset + u64::from(last.len)) - first.offset;
    file.seek(SeekFrom::Start(first.offset))?;

    let mut buf = vec![0u8; span as usize];
    let read = read_best_effort(&mut file, &mut buf)?;
    if read < buf.len() {
        warn!(target: "reader", row_lo, row_hi, "file shrank mid-read");
        return Err(Error::TruncatedRead {
            details: format!("expected {} bytes, read {read}", buf.len()).into(),
        });
    }

    trace!(
        target: "reader",
        row_lo,
        row_hi,
        bytes = buf.len(),
        "ranged read complete"
    );

    let mut chunk = empty_chunk(schema, row_lo, row_hi);
    chunk.axis.reserve((row_hi - row_lo) as usize);
    for column in &mut chunk.columns {
        column.ys.reserve((row_hi - row_lo) as usize);
    }

    let header_count = schema.columns.len();
    let numeric_count = chunk.columns.len();
    let mut record = ByteRecord::new();

    for row in row_lo..row_hi {
        let entry = row_index.entries[row as usize];
        let rel_start = (entry.offset - first.offset) as usize;
        let rel_end = rel_start + entry.len as usize;
        let line = &buf[rel_start..rel_end];
        record.clear();
        let mut line_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(line);
        let parsed = line_reader.read_byte_record(&mut record).unwrap_or(false);
        if !parsed || record.len() != header_count {
            chunk.malformed_rows += 1;
            continue;
        }

        let axis_raw = String::from_utf8_lossy(record.get(0).unwrap_or(b""));
        let Some(axis_value) = parse_axis_value(schema.axis_kind, &axis_raw) else {
            chunk.malformed_rows += 1;
            continue;
        };

        let mut ys = Vec::with_capacity(numeric_count);
        let mut field_errors = 0u64;
        for col in schema.numeric_columns() {
            let raw = record.get(col.header_index).unwrap_or(b"");
            let text = String::from_utf8_lossy(raw);
            let value = parse_numeric(text.trim());
            if value.is_nan() && !text.trim().is_empty() {
                field_errors += 1;
            }
            ys.push(value);
        }
        chunk.malformed_fields += field_errors;

        chunk.axis.push(axis_value);
        for (data, y) in chunk.columns.iter_mut().zip(ys) {
            data.ys.push(y);
        }
    }

    Ok(chunk)
}

fn read_best_effort(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    }
    Ok(total)
}

fn parse_numeric(text: &str) -> f64 {
    if text.is_empty() {
        return f64::NAN;
    }
    text.parse::<f64>().unwrap_or(f64::NAN)
}

fn empty_chunk(schema: &Schema, row_lo: u64, row_hi: u64) -> ColumnarChunk {
    ColumnarChunk {
        row_lo,
        row_hi,
        axis: Vec::new(),
        columns: schema
            .numeric_columns()
            .map(|c| ColumnData {
                name: c.name.clone(),
                ys: Vec::new(),
            })
            .collect(),
        malformed_rows: 0,
        malformed_fields: 0,
    }
}

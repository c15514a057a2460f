//! Text adapter: line-oriented ingestion and result output.
//!
//! Input lines are either a header (no ASCII digit at all, skipped) or
//! `<entity_id>,<value>`. Any other line aborts the run.
//!
//! Error messages carry the line number only. Record content is private
//! data and never ends up in an error or a log line.

use std::io::BufRead;
use std::num::{ParseFloatError, ParseIntError};
use std::path::Path;

use crate::domain::Record;
use crate::PrivsumError;

/// Malformed input record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: expected 2 columns, got {found}")]
    ColumnCount { line: usize, found: usize },

    #[error("line {line}: entity id is not an integer: {source}")]
    EntityId {
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("line {line}: value is not a number: {source}")]
    Value {
        line: usize,
        #[source]
        source: ParseFloatError,
    },
}

/// Parse a single line. `line_no` is 1-based and only used for errors.
///
/// Returns `Ok(None)` for header lines.
///
/// # Errors
/// Returns `ParseError` for any non-header line that is not `<int>,<float>`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Record>, ParseError> {
    if !line.bytes().any(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let cols: Vec<&str> = line.split(',').collect();
    if cols.len() != 2 {
        return Err(ParseError::ColumnCount {
            line: line_no,
            found: cols.len(),
        });
    }

    let key = cols[0]
        .trim()
        .parse::<i64>()
        .map_err(|source| ParseError::EntityId { line: line_no, source })?;
    let value = cols[1]
        .trim()
        .parse::<f64>()
        .map_err(|source| ParseError::Value { line: line_no, source })?;

    Ok(Some(Record::new(key, value)))
}

/// Parse every record from in-memory text.
///
/// # Errors
/// Fails on the first malformed line.
pub fn parse_records(input: &str) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        if let Some(record) = parse_line(idx + 1, line)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Read and parse every record from a reader.
///
/// # Errors
/// Fails on I/O errors and on the first malformed line.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<Record>, PrivsumError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(record) = parse_line(idx + 1, &line)? {
            records.push(record);
        }
    }
    tracing::debug!("Parsed {} records", records.len());
    Ok(records)
}

/// Read and parse every record from a file.
///
/// # Errors
/// Fails if the file cannot be opened or any line is malformed.
pub fn read_records_from_path(path: &Path) -> Result<Vec<Record>, PrivsumError> {
    let file = std::fs::File::open(path)?;
    read_records(std::io::BufReader::new(file))
}

/// Write the rendered scalar, followed by a newline, to `path`.
///
/// Missing parent directories are created.
///
/// # Errors
/// Returns error if the file cannot be written.
pub fn write_output(path: &Path, rendered: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, format!("{rendered}\n"))
}
